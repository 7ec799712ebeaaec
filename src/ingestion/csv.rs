//! CSV ingestion implementation.

use std::path::Path;

use crate::error::{LotError, LotResult};
use crate::types::{DataSet, DataType, Schema, Value};

/// Ingest a CSV file into an in-memory [`DataSet`].
///
/// Rules:
///
/// - CSV must have headers.
/// - Headers must contain all schema fields (order can differ, extra columns are ignored).
/// - Each value is parsed according to the schema field type. Geometry columns carry GeoJSON
///   text and are kept as raw bytes.
pub fn ingest_csv_from_path(path: impl AsRef<Path>, schema: &Schema) -> LotResult<DataSet> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)?;
    ingest_csv_from_reader(&mut rdr, schema)
}

/// Ingest CSV data from an existing CSV reader.
pub fn ingest_csv_from_reader<R: std::io::Read>(
    rdr: &mut csv::Reader<R>,
    schema: &Schema,
) -> LotResult<DataSet> {
    let headers = rdr.headers()?.clone();

    // Map schema fields -> CSV column indexes (allows re-ordered CSV columns).
    let mut col_idxs = Vec::with_capacity(schema.fields.len());
    for field in &schema.fields {
        match headers.iter().position(|h| h.trim() == field.name) {
            Some(idx) => col_idxs.push(idx),
            None => {
                return Err(LotError::SchemaMismatch {
                    message: format!(
                        "missing required column '{field}'. headers={:?}",
                        headers.iter().collect::<Vec<_>>(),
                        field = field.name
                    ),
                });
            }
        }
    }

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (row_idx0, result) in rdr.records().enumerate() {
        // 1-based, and the header is row 1.
        let user_row = row_idx0 + 2;
        let record = result?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for (field, &csv_idx) in schema.fields.iter().zip(col_idxs.iter()) {
            let raw = record.get(csv_idx).unwrap_or("");
            row.push(parse_typed_value(user_row, &field.name, field.data_type, raw)?);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

fn parse_typed_value(row: usize, column: &str, data_type: DataType, raw: &str) -> LotResult<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    let parse_err = |message: String| LotError::ParseError {
        row,
        column: column.to_owned(),
        raw: raw.to_owned(),
        message,
    };

    match data_type {
        DataType::Utf8 => Ok(Value::Utf8(trimmed.to_owned())),
        DataType::Geometry => Ok(Value::Geometry(trimmed.as_bytes().to_vec())),
        DataType::Int64 => trimmed
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|e| parse_err(e.to_string())),
        DataType::Float64 => trimmed
            .parse::<f64>()
            .map(Value::Float64)
            .map_err(|e| parse_err(e.to_string())),
        DataType::Bool => parse_bool(trimmed).map(Value::Bool).map_err(parse_err),
    }
}

fn parse_bool(s: &str) -> Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" | "y" => Ok(true),
        "false" | "f" | "0" | "no" | "n" => Ok(false),
        _ => Err("expected bool (true/false/1/0/yes/no)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::ingest_csv_from_reader;
    use crate::types::{DataType, Field, Schema, Value};

    #[test]
    fn geometry_column_is_kept_as_raw_bytes() {
        let schema = Schema::new(vec![
            Field::new("pin", DataType::Utf8),
            Field::new("shape", DataType::Geometry),
        ]);
        let input = "pin,shape\n001-02,\"{\"\"type\"\":\"\"Point\"\",\"\"coordinates\"\":[1,2]}\"\n";
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader(input.as_bytes());

        let ds = ingest_csv_from_reader(&mut rdr, &schema).unwrap();
        assert_eq!(
            ds.rows[0][1],
            Value::Geometry(br#"{"type":"Point","coordinates":[1,2]}"#.to_vec())
        );
    }

    #[test]
    fn empty_cells_become_null() {
        let schema = Schema::new(vec![
            Field::new("pin", DataType::Utf8),
            Field::new("acres", DataType::Float64),
        ]);
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .from_reader("pin,acres\n7,\n".as_bytes());

        let ds = ingest_csv_from_reader(&mut rdr, &schema).unwrap();
        assert_eq!(ds.rows[0], vec![Value::Utf8("7".to_string()), Value::Null]);
    }
}
