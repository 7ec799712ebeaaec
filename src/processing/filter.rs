//! Row filtering for [`crate::types::DataSet`].

use serde::{Deserialize, Serialize};

use crate::error::LotResult;
use crate::types::{DataSet, Value};

/// Returns a new [`DataSet`] containing only rows for which `predicate` returns `true`.
///
/// This is a convenience wrapper around [`DataSet::filter_rows`].
pub fn filter<F>(dataset: &DataSet, predicate: F) -> DataSet
where
    F: FnMut(&[Value]) -> bool,
{
    dataset.filter_rows(predicate)
}

/// Placeholder values of one column that mark a record as unusable (e.g. a
/// "location suppressed" marker in a ridership extract).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exclusion {
    pub column: String,
    pub values: Vec<String>,
}

/// Drop every row whose value in an excluded column matches one of its sentinels.
///
/// Values are compared by their trimmed text rendering. Returns the kept rows and the number of
/// rows dropped.
pub fn exclude_sentinels(dataset: &DataSet, exclusions: &[Exclusion]) -> LotResult<(DataSet, usize)> {
    let bound = exclusions
        .iter()
        .map(|e| -> LotResult<(usize, Vec<String>)> {
            let idx = dataset.schema.require(&e.column)?;
            let values = e.values.iter().map(|v| v.trim().to_string()).collect::<Vec<_>>();
            Ok((idx, values))
        })
        .collect::<LotResult<Vec<_>>>()?;

    let kept = filter(dataset, |row| {
        !bound.iter().any(|(idx, sentinels)| {
            row.get(*idx)
                .and_then(Value::to_text)
                .is_some_and(|text| sentinels.contains(&text))
        })
    });
    let dropped = dataset.row_count() - kept.row_count();
    Ok((kept, dropped))
}
