//! Source Loader: reads raw extracts into typed in-memory tables.
//!
//! Most callers should use [`load_from_path`] (from [`unified`]) which:
//!
//! - auto-detects format by file extension (or you can override via [`LoadOptions`])
//! - loads into an in-memory [`crate::types::DataSet`], typed by a declared schema
//! - optionally reports success/failure/alerts to a [`LoadObserver`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`] (including GeoJSON feature collections)
//! - [`parquet`]

pub mod csv;
pub mod json;
pub mod observability;
pub mod parquet;
pub mod unified;

pub use observability::{
    CompositeObserver, LoadContext, LoadLog, LoadObserver, LoadSeverity, LoadStats, TracingObserver,
    LOAD_LOG_HEADER,
};
pub use unified::{load_from_path, LoadOptions, SourceFormat};
