//! Output Materializer: writes the lots table to SQLite (and optionally CSV).
//!
//! The table is dropped and recreated inside a single transaction, so readers see either the
//! previous build or the new one. Every row starts with `posted = 0`; flipping the flag belongs to
//! the downstream consumer, which finds work through [`unposted_ids`] / [`next_unposted`].

use std::io::Write;
use std::path::Path;

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection};

use crate::error::{LotError, LotResult};
use crate::geometry::to_geojson;
use crate::types::{DataType, Lot, OutputField, Value};

/// Columns every lots table carries besides the attribute columns.
pub const RESERVED_COLUMNS: [&str; 5] = ["id", "lon", "lat", "geometry", "posted"];

/// Shape of the materialized table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table: String,
    /// Column indexed together with `posted` for the consumer's lookups.
    pub filter_column: String,
    /// Write the merged shape as GeoJSON text in a `geometry` column.
    pub include_geometry: bool,
}

impl TableSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter_column: "id".to_string(),
            include_geometry: false,
        }
    }

    fn validate(&self, fields: &[OutputField]) -> LotResult<()> {
        if self.table.trim().is_empty() {
            return Err(schema_mismatch("output table name is empty".to_string()));
        }
        if let Some(f) = fields.iter().find(|f| RESERVED_COLUMNS.contains(&f.name.as_str())) {
            return Err(schema_mismatch(format!("attribute column '{}' is reserved", f.name)));
        }
        let known = ["id", "lon", "lat", "posted"].contains(&self.filter_column.as_str())
            || fields.iter().any(|f| f.name == self.filter_column);
        if !known {
            return Err(schema_mismatch(format!(
                "filter column '{}' is not a column of '{}'",
                self.filter_column, self.table
            )));
        }
        Ok(())
    }
}

fn schema_mismatch(message: String) -> LotError {
    LotError::SchemaMismatch { message }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn sql_type(data_type: DataType) -> &'static str {
    match data_type {
        DataType::Int64 => "INTEGER",
        DataType::Float64 => "REAL",
        DataType::Bool => "BOOLEAN",
        DataType::Utf8 | DataType::Geometry => "TEXT",
    }
}

fn sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int64(v) => SqlValue::Integer(*v),
        Value::Float64(v) => SqlValue::Real(*v),
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Utf8(s) => SqlValue::Text(s.clone()),
        Value::Geometry(bytes) => SqlValue::Blob(bytes.clone()),
    }
}

/// `CREATE TABLE` statement for `spec` with attribute columns `fields`.
pub fn create_table_sql(spec: &TableSpec, fields: &[OutputField]) -> String {
    let mut columns = vec![
        "id TEXT PRIMARY KEY".to_string(),
        "lon REAL".to_string(),
        "lat REAL".to_string(),
    ];
    if spec.include_geometry {
        columns.push("geometry TEXT".to_string());
    }
    columns.extend(
        fields
            .iter()
            .map(|f| format!("{} {}", quote_ident(&f.name), sql_type(f.data_type))),
    );
    columns.push("posted BOOLEAN NOT NULL DEFAULT 0".to_string());
    format!("CREATE TABLE {} ({})", quote_ident(&spec.table), columns.join(", "))
}

/// Replace `spec.table` with `lots`. Returns the number of rows written.
pub fn materialize(
    conn: &mut Connection,
    spec: &TableSpec,
    fields: &[OutputField],
    lots: &[Lot],
) -> LotResult<usize> {
    spec.validate(fields)?;
    let table = quote_ident(&spec.table);

    let tx = conn.transaction()?;
    tx.execute_batch(&format!("DROP TABLE IF EXISTS {table}"))?;
    tx.execute_batch(&create_table_sql(spec, fields))?;

    let mut names = vec!["id", "lon", "lat"];
    if spec.include_geometry {
        names.push("geometry");
    }
    names.extend(fields.iter().map(|f| f.name.as_str()));
    names.push("posted");
    let insert = format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        names.iter().map(|n| quote_ident(n)).collect::<Vec<_>>().join(", "),
        (1..=names.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
    );

    {
        let mut stmt = tx.prepare(&insert)?;
        for lot in lots {
            if lot.attributes.len() != fields.len() {
                return Err(schema_mismatch(format!(
                    "lot '{}' has {} attributes, expected {}",
                    lot.id,
                    lot.attributes.len(),
                    fields.len()
                )));
            }
            let mut row = Vec::with_capacity(names.len());
            row.push(SqlValue::Text(lot.id.to_string()));
            row.push(lot.lon.map_or(SqlValue::Null, SqlValue::Real));
            row.push(lot.lat.map_or(SqlValue::Null, SqlValue::Real));
            if spec.include_geometry {
                row.push(
                    lot.geometry
                        .as_ref()
                        .map_or(SqlValue::Null, |g| SqlValue::Text(to_geojson(g).to_string())),
                );
            }
            row.extend(lot.attributes.iter().map(sql_value));
            row.push(SqlValue::Integer(i64::from(lot.posted)));
            stmt.execute(params_from_iter(row))?;
        }
    }

    let index = quote_ident(&format!("{}_{}_posted_idx", spec.table, spec.filter_column));
    tx.execute_batch(&format!(
        "CREATE INDEX {index} ON {table} ({}, posted)",
        quote_ident(&spec.filter_column)
    ))?;
    tx.commit()?;

    tracing::info!(table = %spec.table, rows = lots.len(), "lots table materialized");
    Ok(lots.len())
}

/// Open (or create) the database at `path` and [`materialize`] into it.
pub fn materialize_to_path(
    path: &Path,
    spec: &TableSpec,
    fields: &[OutputField],
    lots: &[Lot],
) -> LotResult<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut conn = Connection::open(path)?;
    materialize(&mut conn, spec, fields, lots)
}

/// Ids of rows not yet posted, in id order.
pub fn unposted_ids(conn: &Connection, table: &str, limit: usize) -> LotResult<Vec<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT id FROM {} WHERE NOT posted ORDER BY id LIMIT ?1",
        quote_ident(table)
    ))?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let ids = stmt
        .query_map(params![limit], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ids)
}

/// The next row a consumer would post, if any.
pub fn next_unposted(conn: &Connection, table: &str) -> LotResult<Option<String>> {
    Ok(unposted_ids(conn, table, 1)?.into_iter().next())
}

/// Write the lots with the same column contract as the SQLite table.
pub fn write_lots_csv<W: Write>(
    writer: W,
    fields: &[OutputField],
    lots: &[Lot],
    include_geometry: bool,
) -> LotResult<()> {
    let mut w = csv::Writer::from_writer(writer);

    let mut header = vec!["id", "lon", "lat"];
    if include_geometry {
        header.push("geometry");
    }
    header.extend(fields.iter().map(|f| f.name.as_str()));
    header.push("posted");
    w.write_record(&header)?;

    for lot in lots {
        let mut record = vec![
            lot.id.to_string(),
            lot.lon.map(|v| v.to_string()).unwrap_or_default(),
            lot.lat.map(|v| v.to_string()).unwrap_or_default(),
        ];
        if include_geometry {
            record.push(
                lot.geometry
                    .as_ref()
                    .map(|g| to_geojson(g).to_string())
                    .unwrap_or_default(),
            );
        }
        record.extend(fields.iter().zip(&lot.attributes).map(|(f, v)| f.render(v)));
        record.push(lot.posted.to_string());
        w.write_record(&record)?;
    }
    w.flush()?;
    Ok(())
}
