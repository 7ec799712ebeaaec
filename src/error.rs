use thiserror::Error;

/// Convenience result type for pipeline operations.
pub type LotResult<T> = Result<T, LotError>;

/// Error type returned by every stage of a lots build.
///
/// Structural variants abort the build before any output is written. [`LotError::GeometryParse`]
/// and [`LotError::KeyMissing`] describe single records; the pipeline records them as
/// [`crate::report::RecordIssue`]s and keeps going.
#[derive(Debug, Error)]
pub enum LotError {
    /// Underlying I/O error (e.g. file not found, permission denied).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV ingestion or export error.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parquet ingestion error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// Output database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The build configuration could not be parsed.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    /// The input does not conform to the declared schema (missing required columns, etc.).
    #[error("schema mismatch: {message}")]
    SchemaMismatch { message: String },

    /// A value could not be parsed into the required [`crate::types::DataType`].
    #[error("failed to parse value at row {row} column '{column}': {message} (raw='{raw}')")]
    ParseError {
        row: usize,
        column: String,
        raw: String,
        message: String,
    },

    /// A single geometry could not be decoded.
    #[error("geometry parse error: {message}")]
    GeometryParse { message: String },

    /// A record has no usable entity key.
    #[error("record {row} of '{source_name}' has no usable key")]
    KeyMissing { source_name: String, row: usize },

    /// An attribute table holds more than one row for a key after deduplication.
    #[error("attribute source '{source_name}' has multiple rows for key '{key}'")]
    JoinAmbiguity { source_name: String, key: String },
}

impl LotError {
    pub(crate) fn geometry(message: impl Into<String>) -> Self {
        LotError::GeometryParse {
            message: message.into(),
        }
    }
}
