//! Switch-out purge of whole years.
//!
//! A year is purged by switching its partition out of every managed table into the
//! table's staging twin and truncating the twin. Each table is an independent unit:
//! a failure is recorded in the report and the remaining tables still run.

mod report;

use std::sync::Arc;

use futures::{StreamExt, stream};

pub use report::{PurgeReport, TableOutcome, TableStatus};

use crate::{
    config::{PartitioningConfig, PurgeConfig, TablesConfig},
    engine::EngineGateway,
    error::{RetentionError, RetentionResult},
    observability::metrics,
    resolver::ManagedTable,
    topology::{RetentionBoundarySet, year_start},
};

pub struct PurgeEngine {
    engine: Arc<dyn EngineGateway>,
    tables: TablesConfig,
    partitioning: PartitioningConfig,
    purge: PurgeConfig,
    boundaries: RetentionBoundarySet,
}

impl PurgeEngine {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        tables: TablesConfig,
        partitioning: PartitioningConfig,
        purge: PurgeConfig,
        boundaries: RetentionBoundarySet,
    ) -> Self {
        Self {
            engine,
            tables,
            partitioning,
            purge,
            boundaries,
        }
    }

    /// Switch out and truncate the partition starting at `year` in every table.
    ///
    /// The ordinal is resolved once through the engine and must agree with the
    /// configured boundaries; otherwise nothing is touched. Table outcomes come back
    /// in the order of `tables` regardless of concurrency.
    pub async fn purge_year(
        &self,
        year: i32,
        tables: &[ManagedTable],
    ) -> RetentionResult<PurgeReport> {
        let ordinal = self.resolve_ordinal(year).await?;
        let dry_run = self.purge.dry_run;
        let dry_run_msg = if dry_run { " (DRY RUN)" } else { "" };

        tracing::info!(
            year,
            ordinal,
            tables = tables.len(),
            concurrency = self.purge.concurrency,
            dry_run,
            "Purging year{}",
            dry_run_msg
        );

        let outcomes: Vec<TableOutcome> = stream::iter(tables)
            .map(|table| self.purge_table(table, ordinal))
            .buffered(self.purge.concurrency.max(1))
            .collect()
            .await;

        let report = PurgeReport {
            year,
            ordinal,
            dry_run,
            tables: outcomes,
        };

        tracing::info!(
            year,
            rows_observed = report.rows_observed(),
            rows_purged = report.rows_purged(),
            rows_switched = report.rows_switched(),
            rows_truncated = report.rows_truncated(),
            failed = report.failed_tables().len(),
            dry_run,
            "Purge complete{}",
            dry_run_msg
        );
        Ok(report)
    }

    /// Purge `years` in ascending order, appending each report to `reports`.
    ///
    /// With `fail_on_partial`, the first partial year stops the run; its report is
    /// still appended.
    pub async fn purge_years(
        &self,
        years: &[i32],
        tables: &[ManagedTable],
        reports: &mut Vec<PurgeReport>,
    ) -> RetentionResult<()> {
        let mut years = years.to_vec();
        years.sort_unstable();

        for year in years {
            let report = self.purge_year(year, tables).await?;
            reports.push(report.clone());
            report.into_result(self.purge.fail_on_partial)?;
        }
        Ok(())
    }

    async fn resolve_ordinal(&self, year: i32) -> RetentionResult<u32> {
        let expected = self.boundaries.ordinal_for_year(year).ok_or_else(|| {
            RetentionError::StructuralPrecondition(format!(
                "{year} is not a partition boundary year"
            ))
        })?;
        let start = year_start(year).ok_or_else(|| {
            RetentionError::StructuralPrecondition(format!("year {year} is out of range"))
        })?;

        let resolved = self
            .engine
            .resolve_partition_ordinal(&self.partitioning.function_name, start)
            .await?;
        if resolved != expected {
            return Err(RetentionError::StructuralPrecondition(format!(
                "partition function {} maps {year} to partition {resolved}, \
                 configured boundaries expect {expected}",
                self.partitioning.function_name
            )));
        }
        Ok(resolved)
    }

    async fn purge_table(&self, table: &ManagedTable, ordinal: u32) -> TableOutcome {
        let live = &table.table;
        let staging = live.sibling(self.tables.staging_name(&live.name));
        let mut outcome = TableOutcome::new(&live.name, &staging.name);

        let observed = match self
            .engine
            .count_partition_rows(
                live,
                &self.partitioning.function_name,
                &self.partitioning.timestamp_column,
                ordinal,
            )
            .await
        {
            Ok(count) => count,
            Err(e) => return self.fail(outcome, RetentionError::from(e)),
        };
        outcome.rows_observed = observed;

        if observed == 0 {
            tracing::debug!(table = %live, ordinal, "Partition empty, nothing to switch");
            return outcome;
        }
        match self.engine.count_rows(&staging).await {
            Ok(0) => {}
            Ok(rows) => {
                let err = RetentionError::StructuralPrecondition(format!(
                    "staging table {staging} holds {rows} rows, it must be empty before a switch"
                ));
                return self.fail(outcome, err);
            }
            Err(e) => return self.fail(outcome, RetentionError::from(e)),
        }
        if self.purge.dry_run {
            tracing::info!(table = %live, ordinal, rows = observed, "Would switch out partition (DRY RUN)");
            outcome.status = TableStatus::WouldSwitch;
            return outcome;
        }

        match self.engine.switch_partition(live, &staging, ordinal).await {
            Ok(switched) => outcome.rows_switched = switched,
            Err(e) => return self.fail(outcome, RetentionError::from(e)),
        }
        match self.engine.truncate(&staging).await {
            Ok(truncated) => outcome.rows_truncated = truncated,
            Err(e) => return self.fail(outcome, RetentionError::from(e)),
        }

        outcome.status = TableStatus::Switched;
        metrics::record_rows_purged(&live.name, outcome.rows_observed);
        tracing::info!(
            table = %live,
            staging = %staging,
            ordinal,
            rows = outcome.rows_observed,
            "Partition switched out and truncated"
        );
        outcome
    }

    fn fail(&self, outcome: TableOutcome, err: RetentionError) -> TableOutcome {
        tracing::error!(table = %outcome.table, error = %err, "Failed to purge table");
        metrics::record_purge_failure(&outcome.table);
        outcome.failed(&err)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, NaiveDateTime};

    use super::*;
    use crate::{
        engine::{TableName, memory::MemoryEngine},
        resolver::resolve_catalog,
        staging::StagingProvisioner,
        topology::TopologyManager,
    };

    fn ts(year: i32, month: u32) -> NaiveDateTime {
        year_start(year)
            .and_then(|t| t.with_month(month))
            .unwrap()
    }

    async fn managed(engine: &MemoryEngine) -> Vec<ManagedTable> {
        let catalog = engine.list_tables("dbo").await.unwrap();
        resolve_catalog(&catalog, &TablesConfig::default(), "PS_LOGTIME_YEARLY").tables
    }

    struct Setup {
        engine: Arc<MemoryEngine>,
        tables: Vec<ManagedTable>,
        purge: PurgeEngine,
    }

    async fn setup(purge: PurgeConfig) -> Setup {
        let engine = Arc::new(MemoryEngine::new("db"));
        let partitioning = PartitioningConfig::new(vec![2022, 2023, 2024], vec![2024]);
        let boundaries = RetentionBoundarySet::from_years(&partitioning.boundary_years).unwrap();

        let a = TableName::new("dbo", "main_a");
        let b = TableName::new("dbo", "main_b");
        for table in [&a, &b] {
            engine.create_table(table.clone(), ["logtime", "value"]).unwrap();
        }
        engine
            .insert_rows(&a, (1..=10).map(|m| ts(2022, m)))
            .unwrap();
        engine.insert_rows(&a, (1..=5).map(|m| ts(2023, m))).unwrap();
        engine.insert_rows(&b, [ts(2023, 6)]).unwrap();

        let manager = TopologyManager::new(engine.clone(), "dbo", partitioning.clone());
        manager.rebuild_topology(&boundaries).await.unwrap();
        manager
            .ensure_partitioned_indexes(&managed(&engine).await)
            .await
            .unwrap();
        let tables = managed(&engine).await;
        StagingProvisioner::new(engine.clone(), TablesConfig::default(), partitioning.clone())
            .provision(&tables)
            .await
            .unwrap();

        let purge = PurgeEngine::new(
            engine.clone(),
            TablesConfig::default(),
            partitioning,
            purge,
            boundaries,
        );
        Setup {
            engine,
            tables,
            purge,
        }
    }

    #[tokio::test]
    async fn test_purge_removes_only_target_year() {
        let s = setup(PurgeConfig::default()).await;

        let report = s.purge.purge_year(2022, &s.tables).await.unwrap();

        assert_eq!(report.ordinal, 2);
        assert_eq!(report.tables[0].rows_observed, 10);
        assert_eq!(report.tables[0].status, TableStatus::Switched);
        assert_eq!(report.tables[1].status, TableStatus::NotSwitched);
        let remaining = s.engine.rows(&TableName::new("dbo", "main_a")).unwrap();
        assert_eq!(remaining.len(), 5);
        assert!(remaining.iter().all(|t| t.year() == 2023));
        assert!(s
            .engine
            .rows(&TableName::new("dbo", "temp_main_a"))
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_second_purge_is_noop() {
        let s = setup(PurgeConfig::default()).await;
        s.purge.purge_year(2022, &s.tables).await.unwrap();

        let again = s.purge.purge_year(2022, &s.tables).await.unwrap();

        assert_eq!(again.rows_observed(), 0);
        assert!(again
            .tables
            .iter()
            .all(|t| t.status == TableStatus::NotSwitched));
    }

    #[tokio::test]
    async fn test_occupied_staging_fails_only_that_table() {
        let s = setup(PurgeConfig::default()).await;
        s.engine
            .insert_rows(&TableName::new("dbo", "temp_main_a"), [ts(2023, 2)])
            .unwrap();

        let report = s.purge.purge_year(2023, &s.tables).await.unwrap();

        let a = &report.tables[0];
        assert_eq!(a.status, TableStatus::Failed);
        assert_eq!(
            a.error.as_ref().unwrap().kind,
            crate::error::ErrorKind::StructuralPrecondition
        );
        assert_eq!(report.tables[1].status, TableStatus::Switched);
        assert_eq!(
            s.engine.rows(&TableName::new("dbo", "main_a")).unwrap().len(),
            15
        );
    }

    #[tokio::test]
    async fn test_staging_rows_in_other_year_block_switch() {
        let s = setup(PurgeConfig::default()).await;
        let staging = TableName::new("dbo", "temp_main_a");
        s.engine.insert_rows(&staging, [ts(2023, 7)]).unwrap();

        let report = s.purge.purge_year(2022, &s.tables).await.unwrap();

        let a = &report.tables[0];
        assert_eq!(a.status, TableStatus::Failed);
        assert_eq!(
            a.error.as_ref().unwrap().kind,
            crate::error::ErrorKind::StructuralPrecondition
        );
        assert_eq!(a.rows_switched, 0);
        assert_eq!(report.rows_purged(), 0);
        assert_eq!(s.engine.rows(&staging).unwrap().len(), 1);
        assert_eq!(
            s.engine.rows(&TableName::new("dbo", "main_a")).unwrap().len(),
            15
        );
    }

    #[tokio::test]
    async fn test_dry_run_counts_without_switching() {
        let s = setup(PurgeConfig {
            dry_run: true,
            ..Default::default()
        })
        .await;

        let report = s.purge.purge_year(2022, &s.tables).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.tables[0].status, TableStatus::WouldSwitch);
        assert_eq!(report.rows_observed(), 10);
        assert_eq!(report.rows_purged(), 0);
        assert_eq!(report.rows_truncated(), 0);
        assert_eq!(
            s.engine.rows(&TableName::new("dbo", "main_a")).unwrap().len(),
            15
        );
    }

    #[tokio::test]
    async fn test_concurrent_purge_keeps_discovery_order() {
        let s = setup(PurgeConfig {
            concurrency: 4,
            ..Default::default()
        })
        .await;

        let report = s.purge.purge_year(2023, &s.tables).await.unwrap();

        let order: Vec<_> = report.tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(order, ["main_a", "main_b"]);
        assert_eq!(report.rows_truncated(), 6);
    }

    #[tokio::test]
    async fn test_non_boundary_year_rejected_before_mutation() {
        let s = setup(PurgeConfig::default()).await;
        let journal = s.engine.journal().len();

        let err = s.purge.purge_year(2019, &s.tables).await.unwrap_err();

        assert!(matches!(err, RetentionError::StructuralPrecondition(_)));
        assert_eq!(s.engine.journal().len(), journal);
    }

    #[tokio::test]
    async fn test_strict_purge_years_stops_on_partial() {
        let s = setup(PurgeConfig {
            fail_on_partial: true,
            ..Default::default()
        })
        .await;
        s.engine
            .inject_fault(crate::engine::memory::FaultOp::Truncate, Some("temp_main_a"));

        let mut reports = Vec::new();
        let err = s
            .purge
            .purge_years(&[2023, 2022], &s.tables, &mut reports)
            .await
            .unwrap_err();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].year, 2022);
        match err {
            RetentionError::PartialPurge { year, failed } => {
                assert_eq!(year, 2022);
                assert_eq!(failed, vec!["main_a".to_string()]);
            }
            other => panic!("expected partial purge, got {other:?}"),
        }
    }
}
