//! Cross-Source Joiner: per-key attribute tables and the left outer join onto the primary keys.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{LotError, LotResult};
use crate::key::EntityKey;
use crate::types::{DataType, OutputField, Schema, Value};

use super::dedup::{concatenate, select_first, KeyedRows, SortOrder};
use super::redact::OwnerRedaction;
use super::reduce::{reduce, Reduction};

/// How one output column is drawn from the rows that share a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ColumnRule {
    /// The source holds exactly one row per key; a second row is a [`LotError::JoinAmbiguity`].
    Unique { column: String },
    /// Value of the first row in `order_by` order.
    First {
        column: String,
        #[serde(default)]
        order_by: Vec<String>,
    },
    /// Distinct values in `order_by` order (defaults to the column itself) joined with `", "`.
    Concat {
        column: String,
        #[serde(default)]
        order_by: Vec<String>,
    },
}

impl ColumnRule {
    pub fn column(&self) -> &str {
        match self {
            ColumnRule::Unique { column }
            | ColumnRule::First { column, .. }
            | ColumnRule::Concat { column, .. } => column,
        }
    }
}

/// A named output column taken from source rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(flatten)]
    pub rule: ColumnRule,
    /// Replace values that do not look like organisation names.
    #[serde(default)]
    pub redact: Option<OwnerRedaction>,
}

/// A named output column computed by a [`Reduction`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReduceSpec {
    pub name: String,
    #[serde(flatten)]
    pub op: Reduction,
}

/// One row per [`EntityKey`] with typed output columns.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeTable {
    name: String,
    fields: Vec<OutputField>,
    rows: BTreeMap<EntityKey, Vec<Value>>,
}

impl AttributeTable {
    pub fn new(name: impl Into<String>, fields: Vec<OutputField>) -> Self {
        Self {
            name: name.into(),
            fields,
            rows: BTreeMap::new(),
        }
    }

    /// Build the table from grouped source rows: `columns` first, then `reductions`.
    pub fn from_groups(
        name: &str,
        schema: &Schema,
        groups: &KeyedRows<'_>,
        columns: &[ColumnSpec],
        reductions: &[ReduceSpec],
    ) -> LotResult<Self> {
        let mut plans = Vec::with_capacity(columns.len() + reductions.len());
        let mut fields = Vec::with_capacity(plans.capacity());

        for spec in columns {
            let idx = schema.require(spec.rule.column())?;
            let source_type = schema.fields[idx].data_type;
            if source_type == DataType::Geometry {
                return Err(LotError::SchemaMismatch {
                    message: format!("column '{}' of '{name}' is a geometry", spec.name),
                });
            }
            let output_type = match (&spec.rule, &spec.redact) {
                (ColumnRule::Concat { .. }, _) | (_, Some(_)) => DataType::Utf8,
                _ => source_type,
            };
            let plan = match &spec.rule {
                ColumnRule::Unique { .. } => Plan::Unique(idx),
                ColumnRule::First { order_by, .. } => Plan::First(idx, SortOrder::bind(schema, order_by)?),
                ColumnRule::Concat { column, order_by } => {
                    let order = if order_by.is_empty() {
                        SortOrder::bind(schema, std::slice::from_ref(column))?
                    } else {
                        SortOrder::bind(schema, order_by)?
                    };
                    Plan::Concat(idx, order)
                }
            };
            plans.push((plan, spec.redact.as_ref()));
            fields.push(OutputField::new(&spec.name, output_type));
        }
        for spec in reductions {
            plans.push((Plan::Reduce(spec.op.bind(schema)?), None));
            fields.push(spec.op.output_field(&spec.name));
        }

        let mut table = Self::new(name, fields);
        for (key, rows) in groups {
            let mut out = Vec::with_capacity(plans.len());
            for (plan, redact) in &plans {
                let value = plan.evaluate(name, key, rows)?;
                out.push(match redact {
                    Some(r) => r.apply(value),
                    None => value,
                });
            }
            table.insert(key.clone(), out)?;
        }
        tracing::debug!(source = name, keys = table.len(), "attribute table built");
        Ok(table)
    }

    /// Add the row for `key`; a key can be inserted only once.
    pub fn insert(&mut self, key: EntityKey, row: Vec<Value>) -> LotResult<()> {
        if self.rows.contains_key(&key) {
            return Err(LotError::JoinAmbiguity {
                source_name: self.name.clone(),
                key: key.to_string(),
            });
        }
        self.rows.insert(key, row);
        Ok(())
    }

    pub fn get(&self, key: &EntityKey) -> Option<&[Value]> {
        self.rows.get(key).map(Vec::as_slice)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[OutputField] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

enum Plan {
    Unique(usize),
    First(usize, SortOrder),
    Concat(usize, SortOrder),
    Reduce(super::reduce::BoundReduction),
}

impl Plan {
    fn evaluate(&self, source_name: &str, key: &EntityKey, rows: &[&[Value]]) -> LotResult<Value> {
        Ok(match self {
            Plan::Unique(idx) => {
                if rows.len() > 1 {
                    return Err(LotError::JoinAmbiguity {
                        source_name: source_name.to_string(),
                        key: key.to_string(),
                    });
                }
                rows.first().and_then(|r| r.get(*idx)).cloned().unwrap_or(Value::Null)
            }
            Plan::First(idx, order) => select_first(rows, order)
                .and_then(|r| r.get(*idx))
                .cloned()
                .unwrap_or(Value::Null),
            Plan::Concat(idx, order) => concatenate(rows, *idx, order).map_or(Value::Null, Value::Utf8),
            Plan::Reduce(op) => reduce(rows, *op),
        })
    }
}

/// Output columns of a join, in table order. Names must be unique across tables.
pub fn joined_fields(tables: &[AttributeTable]) -> LotResult<Vec<OutputField>> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for table in tables {
        for field in table.fields() {
            if !seen.insert(field.name.clone()) {
                return Err(LotError::SchemaMismatch {
                    message: format!(
                        "output column '{}' of '{}' is already defined",
                        field.name,
                        table.name()
                    ),
                });
            }
            out.push(field.clone());
        }
    }
    Ok(out)
}

/// Left outer join: one output row per primary key, attribute values in table order.
///
/// Keys missing from a table take each field's [`OutputField::sentinel`]. Table rows whose key is
/// not a primary key contribute nothing.
pub fn left_join(primary: &[EntityKey], tables: &[AttributeTable]) -> Vec<Vec<Value>> {
    let width = tables.iter().map(|t| t.fields().len()).sum();
    let mut out = Vec::with_capacity(primary.len());
    let mut unmatched = vec![0usize; tables.len()];

    for key in primary {
        let mut row = Vec::with_capacity(width);
        for (t, table) in tables.iter().enumerate() {
            match table.get(key) {
                Some(values) => row.extend_from_slice(values),
                None => {
                    unmatched[t] += 1;
                    row.extend(table.fields().iter().map(OutputField::sentinel));
                }
            }
        }
        out.push(row);
    }

    for (table, n) in tables.iter().zip(unmatched) {
        tracing::debug!(source = table.name(), unmatched = n, "joined attribute table");
    }
    out
}
