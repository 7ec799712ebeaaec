//! Per-record issues and the end-of-build summary.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::LotError;

/// Kind of a non-fatal, per-record problem.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IssueKind {
    /// The record had no usable entity key and was skipped.
    KeyMissing,
    /// The record's geometry could not be decoded and was dropped from its group.
    GeometryParse,
}

/// One non-fatal problem with a single input record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordIssue {
    pub source_name: String,
    /// 1-based row number within the source.
    pub row: usize,
    pub kind: IssueKind,
    pub message: String,
}

impl RecordIssue {
    pub fn key_missing(source_name: &str, row: usize) -> Self {
        let message = LotError::KeyMissing {
            source_name: source_name.to_string(),
            row,
        }
        .to_string();
        Self {
            source_name: source_name.to_string(),
            row,
            kind: IssueKind::KeyMissing,
            message,
        }
    }

    pub fn geometry(source_name: &str, row: usize, error: &LotError) -> Self {
        Self {
            source_name: source_name.to_string(),
            row,
            kind: IssueKind::GeometryParse,
            message: error.to_string(),
        }
    }
}

/// Summary of a successful build.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildReport {
    /// Rows written to the lots table.
    pub lots: usize,
    /// Rows loaded per source.
    pub rows_loaded: BTreeMap<String, usize>,
    /// Rows excluded per source because a column held a declared sentinel.
    pub rows_excluded: BTreeMap<String, usize>,
    /// Every per-record issue, in source then row order.
    pub issues: Vec<RecordIssue>,
}

impl BuildReport {
    pub fn count(&self, kind: &IssueKind) -> usize {
        self.issues.iter().filter(|i| &i.kind == kind).count()
    }

    /// Issue counts keyed by `(source, kind)`.
    pub fn counts_by_source(&self) -> BTreeMap<(String, IssueKind), usize> {
        let mut out = BTreeMap::new();
        for issue in &self.issues {
            *out.entry((issue.source_name.clone(), issue.kind.clone())).or_insert(0) += 1;
        }
        out
    }
}

impl fmt::Display for BuildReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "lots={}, skipped_missing_key={}, dropped_geometries={}",
            self.lots,
            self.count(&IssueKind::KeyMissing),
            self.count(&IssueKind::GeometryParse)
        )?;
        for ((source, kind), n) in self.counts_by_source() {
            write!(f, ", {source}.{kind:?}={n}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{BuildReport, IssueKind, RecordIssue};
    use crate::error::LotError;

    #[test]
    fn display_summarizes_counts_per_source() {
        let report = BuildReport {
            lots: 2,
            issues: vec![
                RecordIssue::key_missing("parcels", 3),
                RecordIssue::geometry("parcels", 4, &LotError::geometry("bad ring")),
                RecordIssue::key_missing("addresses", 9),
            ],
            ..Default::default()
        };
        assert_eq!(report.count(&IssueKind::KeyMissing), 2);
        let text = report.to_string();
        assert!(text.starts_with("lots=2, skipped_missing_key=2, dropped_geometries=1"));
        assert!(text.contains("parcels.GeometryParse=1"));
        assert!(text.contains("addresses.KeyMissing=1"));
    }
}
