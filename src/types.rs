//! Core data model types shared by every pipeline stage.
//!
//! Sources are loaded into an in-memory [`DataSet`] using a declared [`Schema`] (a list of typed
//! [`Field`]s). Later stages address columns by name through the schema.

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LotError, LotResult};
use crate::key::EntityKey;

/// Logical data type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// 64-bit signed integer.
    Int64,
    /// 64-bit floating point number.
    Float64,
    /// Boolean.
    Bool,
    /// UTF-8 string.
    Utf8,
    /// Raw geometry bytes (GeoJSON text or WKB).
    Geometry,
}

/// A single named, typed field in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// A list of fields describing the expected shape of incoming data.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the index of a field by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Like [`Self::index_of`], but a missing column is a [`LotError::SchemaMismatch`].
    pub fn require(&self, name: &str) -> LotResult<usize> {
        self.index_of(name).ok_or_else(|| LotError::SchemaMismatch {
            message: format!(
                "missing required column '{name}'. columns={:?}",
                self.field_names().collect::<Vec<_>>()
            ),
        })
    }
}

/// A single typed value in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Float64(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Utf8(String),
    /// Raw, not yet parsed geometry.
    Geometry(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int64(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    /// Textual rendering used for keys, concatenation and sentinel matching.
    ///
    /// Integer-valued floats render without a fractional part so that `12345.0` read from one
    /// source and `"12345"` read from another produce the same text. Returns `None` for nulls,
    /// blank strings and geometries.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Geometry(_) => None,
            Value::Int64(v) => Some(v.to_string()),
            Value::Float64(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 => {
                Some(format!("{}", *v as i64))
            }
            Value::Float64(v) => Some(v.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Utf8(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_owned())
                }
            }
        }
    }

    /// Total order used by sort-based tie-breaks.
    ///
    /// Numbers compare numerically (ints and floats together), text lexicographically, and
    /// nulls sort after everything else. Values of unrelated kinds order by kind.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Null, _) => Ordering::Greater,
            (_, Value::Null) => Ordering::Less,
            (Value::Int64(a), Value::Int64(b)) => a.cmp(b),
            (a, b) if a.as_f64().is_some() && b.as_f64().is_some() => {
                let (a, b) = (a.as_f64().unwrap_or_default(), b.as_f64().unwrap_or_default());
                a.total_cmp(&b)
            }
            (Value::Utf8(a), Value::Utf8(b)) => a.cmp(b),
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Geometry(a), Value::Geometry(b)) => a.cmp(b),
            (a, b) => a.kind_rank().cmp(&b.kind_rank()),
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Value::Int64(_) | Value::Float64(_) => 0,
            Value::Utf8(_) => 1,
            Value::Bool(_) => 2,
            Value::Geometry(_) => 3,
            Value::Null => 4,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Int64(v) => write!(f, "{v}"),
            Value::Float64(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Utf8(s) => f.write_str(s),
            Value::Geometry(bytes) => write!(f, "<geometry {} bytes>", bytes.len()),
        }
    }
}

/// In-memory tabular dataset.
///
/// Rows are stored as `Vec<Vec<Value>>` in the same order as the [`Schema`] fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Schema describing row shape.
    pub schema: Schema,
    /// Row-major value storage.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from schema and rows.
    pub fn new(schema: Schema, rows: Vec<Vec<Value>>) -> Self {
        Self { schema, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Create a new dataset containing only rows that match `predicate`.
    ///
    /// The returned dataset preserves the original schema.
    pub fn filter_rows<F>(&self, mut predicate: F) -> Self
    where
        F: FnMut(&[Value]) -> bool,
    {
        let rows = self
            .rows
            .iter()
            .filter(|row| predicate(row.as_slice()))
            .cloned()
            .collect();
        Self {
            schema: self.schema.clone(),
            rows,
        }
    }
}

/// Typed column of the materialized lots table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputField {
    pub name: String,
    pub data_type: DataType,
    /// Fixed number of decimals used when the value is rendered as text.
    pub decimals: Option<usize>,
}

impl OutputField {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            decimals: None,
        }
    }

    pub fn with_decimals(mut self, decimals: usize) -> Self {
        self.decimals = Some(decimals);
        self
    }

    /// Value used when a lot has no matching attribute row: `"?"` for text, null otherwise.
    pub fn sentinel(&self) -> Value {
        match self.data_type {
            DataType::Utf8 => Value::Utf8("?".to_string()),
            _ => Value::Null,
        }
    }

    /// Text rendering honouring [`Self::decimals`]; nulls render as an empty string.
    pub fn render(&self, value: &Value) -> String {
        match (self.decimals, value.as_f64()) {
            (Some(d), Some(v)) => format!("{v:.d$}"),
            _ => value.to_string(),
        }
    }
}

/// One row of the lots table.
#[derive(Debug, Clone, PartialEq)]
pub struct Lot {
    pub id: EntityKey,
    pub geometry: Option<geo::Geometry<f64>>,
    pub lon: Option<f64>,
    pub lat: Option<f64>,
    /// Aligned with the [`OutputField`]s of the build.
    pub attributes: Vec<Value>,
    /// Always `false` when built; flipped by the downstream consumer.
    pub posted: bool,
}

#[cfg(test)]
mod tests {
    use super::{DataType, Field, OutputField, Schema, Value};
    use std::cmp::Ordering;

    #[test]
    fn integer_valued_floats_render_like_integers() {
        assert_eq!(Value::Float64(12345.0).to_text(), Some("12345".to_string()));
        assert_eq!(Value::Int64(12345).to_text(), Some("12345".to_string()));
        assert_eq!(Value::Float64(1.5).to_text(), Some("1.5".to_string()));
    }

    #[test]
    fn blank_text_has_no_rendering() {
        assert_eq!(Value::Utf8("   ".to_string()).to_text(), None);
        assert_eq!(Value::Null.to_text(), None);
        assert_eq!(Value::Utf8(" 001-02 ".to_string()).to_text(), Some("001-02".to_string()));
    }

    #[test]
    fn sort_cmp_mixes_numbers_and_puts_nulls_last() {
        assert_eq!(Value::Int64(2).sort_cmp(&Value::Float64(10.0)), Ordering::Less);
        assert_eq!(Value::Null.sort_cmp(&Value::Int64(0)), Ordering::Greater);
        assert_eq!(
            Value::Utf8("Birch St".to_string()).sort_cmp(&Value::Utf8("Elm St".to_string())),
            Ordering::Less
        );
    }

    #[test]
    fn require_reports_schema_mismatch() {
        let schema = Schema::new(vec![Field::new("pin", DataType::Utf8)]);
        assert_eq!(schema.require("pin").unwrap(), 0);
        let err = schema.require("gpin").unwrap_err();
        assert!(err.to_string().contains("missing required column 'gpin'"));
    }

    #[test]
    fn output_fields_render_fixed_decimals_and_pick_sentinels() {
        let avg = OutputField::new("avg_riders", DataType::Float64).with_decimals(2);
        assert_eq!(avg.render(&Value::Float64(15.0)), "15.00");
        assert_eq!(avg.render(&Value::Null), "");
        assert_eq!(avg.sentinel(), Value::Null);
        assert_eq!(
            OutputField::new("address", DataType::Utf8).sentinel(),
            Value::Utf8("?".to_string())
        );
    }
}
