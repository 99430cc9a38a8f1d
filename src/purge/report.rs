use serde::Serialize;

use crate::error::{RecordedFailure, RetentionError, RetentionResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    /// The partition was switched out and the staging table truncated.
    Switched,
    /// The partition held no rows.
    NotSwitched,
    /// Dry run: the partition holds rows that would be switched out.
    WouldSwitch,
    Failed,
}

/// Outcome of one table within a purge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableOutcome {
    pub table: String,
    pub staging: String,
    pub status: TableStatus,
    pub rows_observed: u64,
    pub rows_switched: u64,
    pub rows_truncated: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedFailure>,
}

impl TableOutcome {
    pub(super) fn new(table: &str, staging: &str) -> Self {
        Self {
            table: table.to_string(),
            staging: staging.to_string(),
            status: TableStatus::NotSwitched,
            rows_observed: 0,
            rows_switched: 0,
            rows_truncated: 0,
            error: None,
        }
    }

    pub(super) fn failed(mut self, err: &RetentionError) -> Self {
        self.status = TableStatus::Failed;
        self.error = Some(err.into());
        self
    }

    pub fn is_failed(&self) -> bool {
        self.status == TableStatus::Failed
    }
}

/// Result of purging one year across every managed table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub year: i32,
    pub ordinal: u32,
    pub dry_run: bool,
    /// In discovery order.
    pub tables: Vec<TableOutcome>,
}

impl PurgeReport {
    pub fn rows_observed(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_observed).sum()
    }

    pub fn rows_switched(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_switched).sum()
    }

    pub fn rows_truncated(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_truncated).sum()
    }

    /// Rows observed in tables whose partition was switched out.
    pub fn rows_purged(&self) -> u64 {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Switched)
            .map(|t| t.rows_observed)
            .sum()
    }

    pub fn has_deletions(&self) -> bool {
        self.rows_purged() > 0
    }

    pub fn failed_tables(&self) -> Vec<String> {
        self.tables
            .iter()
            .filter(|t| t.is_failed())
            .map(|t| t.table.clone())
            .collect()
    }

    pub fn is_partial(&self) -> bool {
        self.tables.iter().any(TableOutcome::is_failed)
    }

    /// Turn table failures into [`RetentionError::PartialPurge`] when `strict`.
    /// Otherwise failures stay in the report as warnings.
    pub fn into_result(self, strict: bool) -> RetentionResult<Self> {
        if !self.is_partial() {
            return Ok(self);
        }
        let failed = self.failed_tables();
        if strict {
            return Err(RetentionError::PartialPurge {
                year: self.year,
                failed,
            });
        }
        tracing::warn!(
            year = self.year,
            failed = ?failed,
            "Purge completed with table failures"
        );
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(table: &str, status: TableStatus, rows: u64) -> TableOutcome {
        TableOutcome {
            status,
            rows_observed: rows,
            rows_switched: if status == TableStatus::Switched { rows } else { 0 },
            rows_truncated: if status == TableStatus::Switched { rows } else { 0 },
            ..TableOutcome::new(table, &format!("temp_{table}"))
        }
    }

    fn report() -> PurgeReport {
        PurgeReport {
            year: 2022,
            ordinal: 2,
            dry_run: false,
            tables: vec![
                outcome("main_a", TableStatus::Switched, 10),
                outcome("a", TableStatus::NotSwitched, 0),
                outcome("main_b", TableStatus::Switched, 4),
            ],
        }
    }

    #[test]
    fn test_totals() {
        let report = report();
        assert_eq!(report.rows_observed(), 14);
        assert_eq!(report.rows_truncated(), 14);
        assert_eq!(report.rows_purged(), 14);
        assert!(report.has_deletions());
        assert!(!report.is_partial());
    }

    #[test]
    fn test_partial_purge_is_error_only_when_strict() {
        let mut report = report();
        report.tables[1] = outcome("a", TableStatus::Failed, 3).failed(
            &RetentionError::StructuralPrecondition("staging not empty".into()),
        );

        assert!(report.clone().into_result(false).is_ok());
        match report.into_result(true) {
            Err(RetentionError::PartialPurge { year, failed }) => {
                assert_eq!(year, 2022);
                assert_eq!(failed, vec!["a".to_string()]);
            }
            other => panic!("expected partial purge, got {other:?}"),
        }
    }

    #[test]
    fn test_rows_purged_counts_only_switched_tables() {
        let mut report = report();
        report.tables[2] = outcome("main_b", TableStatus::Failed, 4).failed(
            &RetentionError::StructuralPrecondition("staging not empty".into()),
        );
        report.tables[0].rows_truncated = 11;

        assert_eq!(report.rows_observed(), 14);
        assert_eq!(report.rows_purged(), 10);
    }

    #[test]
    fn test_error_omitted_from_json_when_absent() {
        let json = serde_json::to_value(report()).unwrap();
        assert!(json["tables"][0].get("error").is_none());
        assert_eq!(json["tables"][1]["status"], "not_switched");
    }
}
