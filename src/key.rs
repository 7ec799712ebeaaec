//! Key Normalizer: derives the [`EntityKey`] that correlates records describing one entity.
//!
//! Keys are a pure function of a record's fields. The same rule applied to two files that
//! describe the same parcel yields the same key, which is what lets the geometry, address and
//! tax-roll sources line up.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{LotError, LotResult};
use crate::types::{DataSet, Schema, Value};

/// Correlation key for a real-world entity (parcel pin, stop code, GIS pin...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Per-dataset rule for computing an [`EntityKey`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRule {
    /// Pass-through of a designated identifier column.
    Column(String),
    /// Several columns joined with `separator` (e.g. map, block and lot numbers).
    Composite {
        columns: Vec<String>,
        #[serde(default = "default_separator")]
        separator: String,
    },
}

fn default_separator() -> String {
    "-".to_string()
}

impl KeyRule {
    /// Columns the rule reads.
    pub fn columns(&self) -> Vec<&str> {
        match self {
            KeyRule::Column(c) => vec![c.as_str()],
            KeyRule::Composite { columns, .. } => columns.iter().map(String::as_str).collect(),
        }
    }

    /// Resolve the rule against a schema, failing with `SchemaMismatch` if a column is absent.
    pub fn bind(&self, schema: &Schema) -> LotResult<BoundKeyRule> {
        let idxs = self
            .columns()
            .into_iter()
            .map(|c| schema.require(c))
            .collect::<LotResult<Vec<_>>>()?;
        let separator = match self {
            KeyRule::Column(_) => String::new(),
            KeyRule::Composite { separator, .. } => separator.clone(),
        };
        Ok(BoundKeyRule { idxs, separator })
    }
}

/// A [`KeyRule`] resolved to column positions of one schema.
#[derive(Debug, Clone)]
pub struct BoundKeyRule {
    idxs: Vec<usize>,
    separator: String,
}

impl BoundKeyRule {
    /// Key for one row; `None` if any part is null or blank.
    pub fn key_for(&self, row: &[Value]) -> Option<EntityKey> {
        let mut parts = Vec::with_capacity(self.idxs.len());
        for &idx in &self.idxs {
            parts.push(row.get(idx)?.to_text()?);
        }
        Some(EntityKey(parts.join(&self.separator)))
    }
}

/// Keys for every row of `dataset`, aligned by row index.
///
/// Rows without a usable key get `None`; callers count and skip them.
pub fn derive_keys(dataset: &DataSet, rule: &KeyRule) -> LotResult<Vec<Option<EntityKey>>> {
    let bound = rule.bind(&dataset.schema)?;
    Ok(dataset.rows.iter().map(|row| bound.key_for(row)).collect())
}

/// Mapping from one key vocabulary into another.
#[derive(Debug, Clone, Default)]
pub struct KeyCrosswalk {
    map: HashMap<EntityKey, EntityKey>,
}

impl KeyCrosswalk {
    /// Build a crosswalk from two key rules over the same table.
    ///
    /// Rows missing either side are ignored. A `from` key that maps to two different `to`
    /// keys is a [`LotError::JoinAmbiguity`].
    pub fn from_dataset(
        source_name: &str,
        dataset: &DataSet,
        from: &KeyRule,
        to: &KeyRule,
    ) -> LotResult<Self> {
        let from_keys = derive_keys(dataset, from)?;
        let to_keys = derive_keys(dataset, to)?;
        let mut map = HashMap::new();
        for (f, t) in from_keys.into_iter().zip(to_keys) {
            let (Some(f), Some(t)) = (f, t) else { continue };
            match map.get(&f) {
                Some(existing) if existing != &t => {
                    return Err(LotError::JoinAmbiguity {
                        source_name: source_name.to_string(),
                        key: f.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    map.insert(f, t);
                }
            }
        }
        Ok(Self { map })
    }

    pub fn translate(&self, key: &EntityKey) -> Option<&EntityKey> {
        self.map.get(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::{derive_keys, EntityKey, KeyCrosswalk, KeyRule};
    use crate::types::{DataSet, DataType, Field, Schema, Value};

    fn parcels() -> DataSet {
        let schema = Schema::new(vec![
            Field::new("map", DataType::Utf8),
            Field::new("lot", DataType::Int64),
            Field::new("gpin", DataType::Float64),
        ]);
        DataSet::new(
            schema,
            vec![
                vec![Value::Utf8("001".to_string()), Value::Int64(2), Value::Float64(12345.0)],
                vec![Value::Utf8(" ".to_string()), Value::Int64(3), Value::Null],
            ],
        )
    }

    #[test]
    fn composite_keys_join_parts_and_skip_blank_rows() {
        let rule = KeyRule::Composite {
            columns: vec!["map".to_string(), "lot".to_string()],
            separator: "-".to_string(),
        };
        let keys = derive_keys(&parcels(), &rule).unwrap();
        assert_eq!(keys, vec![Some(EntityKey::from("001-2")), None]);
    }

    #[test]
    fn numeric_keys_are_canonicalized() {
        let keys = derive_keys(&parcels(), &KeyRule::Column("gpin".to_string())).unwrap();
        assert_eq!(keys[0], Some(EntityKey::from("12345")));
        assert_eq!(keys[1], None);
    }

    #[test]
    fn derivation_is_deterministic() {
        let rule = KeyRule::Column("map".to_string());
        assert_eq!(derive_keys(&parcels(), &rule).unwrap(), derive_keys(&parcels(), &rule).unwrap());
    }

    #[test]
    fn unknown_key_column_is_a_schema_mismatch() {
        let err = derive_keys(&parcels(), &KeyRule::Column("pin".to_string())).unwrap_err();
        assert!(err.to_string().contains("schema mismatch"));
    }

    #[test]
    fn crosswalk_translates_and_rejects_conflicts() {
        let schema = Schema::new(vec![
            Field::new("camapin", DataType::Utf8),
            Field::new("pin", DataType::Utf8),
        ]);
        let row = |a: &str, b: &str| vec![Value::Utf8(a.to_string()), Value::Utf8(b.to_string())];
        let ds = DataSet::new(schema.clone(), vec![row("A1", "001-02"), row("A1", "001-02")]);
        let cw = KeyCrosswalk::from_dataset(
            "xwalk",
            &ds,
            &KeyRule::Column("camapin".to_string()),
            &KeyRule::Column("pin".to_string()),
        )
        .unwrap();
        assert_eq!(cw.translate(&EntityKey::from("A1")), Some(&EntityKey::from("001-02")));
        assert_eq!(cw.len(), 1);

        let conflicting = DataSet::new(schema, vec![row("A1", "001-02"), row("A1", "001-03")]);
        let err = KeyCrosswalk::from_dataset(
            "xwalk",
            &conflicting,
            &KeyRule::Column("camapin".to_string()),
            &KeyRule::Column("pin".to_string()),
        )
        .unwrap_err();
        assert!(err.to_string().contains("multiple rows for key 'A1'"));
    }
}
