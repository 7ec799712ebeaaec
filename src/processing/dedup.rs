//! Deduplication of attribute rows that share an [`EntityKey`].
//!
//! Candidates are ordered with [`SortOrder`]: declared `order_by` columns first, then the whole
//! row. The resulting order is total, so the representative row and the concatenation order never
//! depend on the order rows arrived in.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::LotResult;
use crate::key::EntityKey;
use crate::report::RecordIssue;
use crate::types::{DataSet, Schema, Value};

/// Rows of one dataset grouped by key, in key order.
pub type KeyedRows<'a> = BTreeMap<EntityKey, Vec<&'a [Value]>>;

/// Group `dataset` rows by the aligned `keys`, reporting rows whose key is `None`.
pub fn group_by_key<'a>(
    source_name: &str,
    dataset: &'a DataSet,
    keys: &[Option<EntityKey>],
) -> (KeyedRows<'a>, Vec<RecordIssue>) {
    let mut groups: KeyedRows<'a> = BTreeMap::new();
    let mut issues = Vec::new();
    for (idx0, (row, key)) in dataset.rows.iter().zip(keys).enumerate() {
        match key {
            Some(k) => groups.entry(k.clone()).or_default().push(row.as_slice()),
            None => issues.push(RecordIssue::key_missing(source_name, idx0 + 1)),
        }
    }
    if !issues.is_empty() {
        tracing::warn!(source = source_name, skipped = issues.len(), "skipping records without key");
    }
    (groups, issues)
}

/// Ordering of candidate rows, bound to one schema.
#[derive(Debug, Clone, Default)]
pub struct SortOrder {
    idxs: Vec<usize>,
}

impl SortOrder {
    pub fn bind(schema: &Schema, order_by: &[String]) -> LotResult<Self> {
        let idxs = order_by
            .iter()
            .map(|c| schema.require(c))
            .collect::<LotResult<Vec<_>>>()?;
        Ok(Self { idxs })
    }

    pub fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        self.idxs
            .iter()
            .map(|&i| cmp_at(a, b, i))
            .chain(a.iter().zip(b).map(|(x, y)| x.sort_cmp(y)))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.len().cmp(&b.len()))
    }

    /// Sort candidates in place, ascending.
    pub fn sort(&self, rows: &mut [&[Value]]) {
        rows.sort_by(|a, b| self.compare(a, b));
    }
}

fn cmp_at(a: &[Value], b: &[Value], idx: usize) -> Ordering {
    match (a.get(idx), b.get(idx)) {
        (Some(x), Some(y)) => x.sort_cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// The first row of `rows` under `order`.
pub fn select_first<'a>(rows: &[&'a [Value]], order: &SortOrder) -> Option<&'a [Value]> {
    rows.iter().copied().min_by(|a, b| order.compare(a, b))
}

/// Distinct non-blank values of `column`, in `order`, joined with `", "`.
///
/// Returns `None` when no candidate has a value.
pub fn concatenate(rows: &[&[Value]], column: usize, order: &SortOrder) -> Option<String> {
    let mut sorted = rows.to_vec();
    order.sort(&mut sorted);

    let mut seen: Vec<String> = Vec::new();
    for row in sorted {
        if let Some(text) = row.get(column).and_then(Value::to_text) {
            if !seen.contains(&text) {
                seen.push(text);
            }
        }
    }
    if seen.is_empty() { None } else { Some(seen.join(", ")) }
}
