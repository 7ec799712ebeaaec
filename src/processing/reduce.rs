//! Keyed reductions (derived statistics) over grouped rows.

use serde::{Deserialize, Serialize};

use crate::error::LotResult;
use crate::types::{DataType, OutputField, Schema, Value};

/// Decimal places kept by [`Reduction::Average`].
pub const AVERAGE_DECIMALS: usize = 2;

/// Built-in reductions over the rows that share a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Reduction {
    /// Total of `value` divided by the number of distinct `bucket` values (e.g. days).
    Average { value: String, bucket: String },
    /// Sorted, deduplicated values of `column` joined with `", "`.
    DistinctCollect { column: String },
    /// Number of rows.
    Count,
}

impl Reduction {
    pub fn bind(&self, schema: &Schema) -> LotResult<BoundReduction> {
        Ok(match self {
            Reduction::Average { value, bucket } => BoundReduction::Average {
                value: schema.require(value)?,
                bucket: schema.require(bucket)?,
            },
            Reduction::DistinctCollect { column } => BoundReduction::DistinctCollect {
                column: schema.require(column)?,
            },
            Reduction::Count => BoundReduction::Count,
        })
    }

    /// Output column produced by this reduction.
    pub fn output_field(&self, name: &str) -> OutputField {
        match self {
            Reduction::Average { .. } => {
                OutputField::new(name, DataType::Float64).with_decimals(AVERAGE_DECIMALS)
            }
            Reduction::DistinctCollect { .. } => OutputField::new(name, DataType::Utf8),
            Reduction::Count => OutputField::new(name, DataType::Int64),
        }
    }
}

/// A [`Reduction`] resolved to column positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundReduction {
    Average { value: usize, bucket: usize },
    DistinctCollect { column: usize },
    Count,
}

/// Reduce the rows of one key.
///
/// - `Average` ignores rows with a null/non-numeric value or a null bucket, and returns
///   `Value::Null` if nothing remains.
/// - `DistinctCollect` returns `Value::Null` if no row has a value.
/// - `Count` always returns `Value::Int64(rows.len())`.
pub fn reduce(rows: &[&[Value]], op: BoundReduction) -> Value {
    match op {
        BoundReduction::Count => Value::Int64(rows.len() as i64),
        BoundReduction::Average { value, bucket } => {
            let mut total = 0.0;
            let mut buckets: Vec<&Value> = Vec::new();
            for row in rows {
                let (Some(v), Some(b)) = (row.get(value).and_then(numeric), row.get(bucket)) else {
                    continue;
                };
                if b.is_null() {
                    continue;
                }
                total += v;
                if !buckets.contains(&b) {
                    buckets.push(b);
                }
            }
            if buckets.is_empty() {
                Value::Null
            } else {
                Value::Float64(round_to(total / buckets.len() as f64, AVERAGE_DECIMALS))
            }
        }
        BoundReduction::DistinctCollect { column } => {
            let mut values: Vec<&Value> = rows
                .iter()
                .filter_map(|row| row.get(column))
                .filter(|v| v.to_text().is_some())
                .collect();
            values.sort_by(|a, b| a.sort_cmp(b));

            let mut out: Vec<String> = Vec::new();
            for text in values.into_iter().filter_map(Value::to_text) {
                if out.last() != Some(&text) {
                    out.push(text);
                }
            }
            if out.is_empty() { Value::Null } else { Value::Utf8(out.join(", ")) }
        }
    }
}

/// Numbers, or text that parses as one (counts are often published as text columns so that
/// placeholder strings survive loading).
fn numeric(v: &Value) -> Option<f64> {
    match v {
        Value::Utf8(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        other => other.as_f64(),
    }
}

fn round_to(v: f64, decimals: usize) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (v * factor).round() / factor
}
