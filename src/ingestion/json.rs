//! JSON and GeoJSON ingestion implementation.
//!
//! Supported inputs:
//! - A JSON array of objects: `[{"a":1}, {"a":2}]`
//! - Newline-delimited JSON (NDJSON): `{"a":1}\n{"a":2}\n`
//! - A GeoJSON `FeatureCollection`: each feature becomes one row
//!
//! Nested fields are supported using dot paths in schema field names (e.g. `properties.PIN`).
//! Fields declared as [`DataType::Geometry`] capture the JSON value verbatim (re-serialized), so a
//! feature's `geometry` member travels to the aggregator as GeoJSON bytes.

use std::fs;
use std::path::Path;

use crate::error::{LotError, LotResult};
use crate::types::{DataSet, DataType, Schema, Value};

/// Ingest JSON into an in-memory `DataSet`.
pub fn ingest_json_from_path(path: impl AsRef<Path>, schema: &Schema) -> LotResult<DataSet> {
    let text = fs::read_to_string(path)?;
    ingest_json_from_str(&text, schema)
}

/// Ingest JSON from an in-memory string into a [`DataSet`].
pub fn ingest_json_from_str(input: &str, schema: &Schema) -> LotResult<DataSet> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LotError::SchemaMismatch {
            message: "json input is empty".to_string(),
        });
    }

    // First try parsing as a single JSON value (array or object).
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        match &v {
            serde_json::Value::Array(items) => ingest_json_values(items, schema),
            serde_json::Value::Object(obj) if is_feature_collection(obj) => {
                let features = obj
                    .get("features")
                    .and_then(|f| f.as_array())
                    .ok_or_else(|| LotError::SchemaMismatch {
                        message: "FeatureCollection has no 'features' array".to_string(),
                    })?;
                ingest_json_values(features, schema)
            }
            serde_json::Value::Object(_) => ingest_json_values(std::slice::from_ref(&v), schema),
            _ => Err(LotError::SchemaMismatch {
                message: "json must be an object, an array of objects, a FeatureCollection, or NDJSON"
                    .to_string(),
            }),
        }
    } else {
        // Fall back to NDJSON.
        let mut values = Vec::new();
        for (i, line) in trimmed.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let v = serde_json::from_str::<serde_json::Value>(line).map_err(|e| {
                LotError::SchemaMismatch {
                    message: format!("invalid ndjson at line {}: {}", i + 1, e),
                }
            })?;
            values.push(v);
        }
        ingest_json_values(&values, schema)
    }
}

fn is_feature_collection(obj: &serde_json::Map<String, serde_json::Value>) -> bool {
    obj.get("type").and_then(|t| t.as_str()) == Some("FeatureCollection")
}

fn ingest_json_values(values: &[serde_json::Value], schema: &Schema) -> LotResult<DataSet> {
    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(values.len());

    for (idx0, v) in values.iter().enumerate() {
        let row_num = idx0 + 1;
        let obj = v.as_object().ok_or_else(|| LotError::SchemaMismatch {
            message: format!("row {row_num} is not a json object"),
        })?;

        let mut row: Vec<Value> = Vec::with_capacity(schema.fields.len());
        for field in &schema.fields {
            let jv = get_by_dot_path(obj, &field.name).ok_or_else(|| LotError::SchemaMismatch {
                message: format!("row {row_num} missing required field '{}'", field.name),
            })?;
            row.push(convert_json_value(row_num, &field.name, field.data_type, jv)?);
        }
        rows.push(row);
    }

    Ok(DataSet::new(schema.clone(), rows))
}

fn get_by_dot_path<'a>(
    root: &'a serde_json::Map<String, serde_json::Value>,
    path: &str,
) -> Option<&'a serde_json::Value> {
    let mut segments = path.split('.');
    let mut current: &serde_json::Value = root.get(segments.next().unwrap_or(path))?;

    for segment in segments {
        match current {
            serde_json::Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

fn convert_json_value(
    row: usize,
    column: &str,
    data_type: DataType,
    v: &serde_json::Value,
) -> LotResult<Value> {
    if v.is_null() {
        return Ok(Value::Null);
    }

    let parse_err = |message: &str| LotError::ParseError {
        row,
        column: column.to_string(),
        raw: v.to_string(),
        message: message.to_string(),
    };

    match data_type {
        DataType::Utf8 => match v {
            serde_json::Value::String(s) => Ok(Value::Utf8(s.clone())),
            // Open-data exports often type identifiers as numbers in one layer and strings in
            // another; keep the textual form, with integral floats written as integers.
            serde_json::Value::Number(n) => Ok(Value::Utf8(match n.as_f64() {
                Some(f) if n.is_f64() => Value::Float64(f).to_text().unwrap_or_else(|| n.to_string()),
                _ => n.to_string(),
            })),
            _ => Err(parse_err("expected string")),
        },
        DataType::Geometry => match v {
            serde_json::Value::String(s) => Ok(Value::Geometry(s.as_bytes().to_vec())),
            _ => Ok(Value::Geometry(serde_json::to_vec(v)?)),
        },
        DataType::Bool => v.as_bool().map(Value::Bool).ok_or_else(|| parse_err("expected bool")),
        DataType::Int64 => {
            if let Some(n) = v.as_i64() {
                Ok(Value::Int64(n))
            } else if let Some(n) = v.as_u64() {
                i64::try_from(n)
                    .map(Value::Int64)
                    .map_err(|_| parse_err("u64 out of range for i64"))
            } else {
                Err(parse_err("expected integer number"))
            }
        }
        DataType::Float64 => v.as_f64().map(Value::Float64).ok_or_else(|| parse_err("expected number")),
    }
}

#[cfg(test)]
mod tests {
    use super::ingest_json_from_str;
    use crate::key::{derive_keys, EntityKey, KeyRule};
    use crate::types::{DataType, Field, Schema, Value};

    #[test]
    fn feature_collection_rows_capture_geometry() {
        let input = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature",
                 "properties": {"PIN": "001-02", "Acreage": 0.25},
                 "geometry": {"type": "Point", "coordinates": [-78.5, 38.0]}},
                {"type": "Feature",
                 "properties": {"PIN": "001-03", "Acreage": null},
                 "geometry": null}
            ]
        }"#;
        let schema = Schema::new(vec![
            Field::new("properties.PIN", DataType::Utf8),
            Field::new("properties.Acreage", DataType::Float64),
            Field::new("geometry", DataType::Geometry),
        ]);

        let ds = ingest_json_from_str(input, &schema).unwrap();
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[0][0], Value::Utf8("001-02".to_string()));
        assert_eq!(ds.rows[0][1], Value::Float64(0.25));
        match &ds.rows[0][2] {
            Value::Geometry(bytes) => {
                let back: serde_json::Value = serde_json::from_slice(bytes).unwrap();
                assert_eq!(back["type"], "Point");
            }
            other => panic!("expected geometry, got {other:?}"),
        }
        assert_eq!(ds.rows[1][1], Value::Null);
        assert_eq!(ds.rows[1][2], Value::Null);
    }

    #[test]
    fn numeric_identifiers_are_read_as_text() {
        let schema = Schema::new(vec![Field::new("GPIN", DataType::Utf8)]);
        let ds = ingest_json_from_str(r#"[{"GPIN": 12345}]"#, &schema).unwrap();
        assert_eq!(ds.rows[0][0], Value::Utf8("12345".to_string()));
    }

    #[test]
    fn integral_float_identifiers_match_integer_keys() {
        let schema = Schema::new(vec![Field::new("GPIN", DataType::Utf8)]);
        let ds = ingest_json_from_str(r#"[{"GPIN": 12345.0}, {"GPIN": 12.5}]"#, &schema).unwrap();
        assert_eq!(ds.rows[0][0], Value::Utf8("12345".to_string()));
        assert_eq!(ds.rows[1][0], Value::Utf8("12.5".to_string()));

        let keys = derive_keys(&ds, &KeyRule::Column("GPIN".to_string())).unwrap();
        assert_eq!(keys[0], Some(EntityKey::from("12345")));
    }
}
