use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use super::{CurrentTopology, DesiredTopology, RetentionBoundarySet, TopologyPlan, TopologyStep};
use crate::{
    config::PartitioningConfig,
    engine::{EngineGateway, IndexInfo, TableName},
    error::{RetentionError, RetentionResult, TableFailure},
    resolver::ManagedTable,
};

/// Kind of work an index pass performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexAction {
    Dropped,
    Created,
    Rebuilt,
}

/// Per-table outcome of an index pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexReport {
    pub action: IndexAction,
    /// Tables the action was applied to.
    pub applied: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<TableFailure>,
}

impl IndexReport {
    fn new(action: IndexAction) -> Self {
        Self {
            action,
            applied: Vec::new(),
            skipped: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, table: &TableName, err: &RetentionError) {
        tracing::error!(table = %table, action = ?self.action, error = %err, "Index operation failed");
        self.failed.push(TableFailure::new(&table.name, err));
    }
}

/// Result of a topology rebuild.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopologyReport {
    pub years: Vec<i32>,
    pub plan: TopologyPlan,
    /// The catalog already held an identical function and scheme.
    pub unchanged: bool,
}

/// Owns the partition function, the partition scheme and the clustered indexes
/// placed on it.
pub struct TopologyManager {
    engine: Arc<dyn EngineGateway>,
    schema: String,
    partitioning: PartitioningConfig,
}

impl TopologyManager {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        schema: impl Into<String>,
        partitioning: PartitioningConfig,
    ) -> Self {
        Self {
            engine,
            schema: schema.into(),
            partitioning,
        }
    }

    /// Name of the clustered index placed on `table`.
    pub fn index_name(table: &str) -> String {
        format!("CIX_{table}")
    }

    pub async fn current_topology(&self) -> RetentionResult<CurrentTopology> {
        Ok(CurrentTopology {
            function: self
                .engine
                .partition_function(&self.partitioning.function_name)
                .await?,
            scheme: self
                .engine
                .partition_scheme(&self.partitioning.scheme_name)
                .await?,
        })
    }

    pub fn desired_topology(&self, boundaries: &RetentionBoundarySet) -> DesiredTopology {
        DesiredTopology {
            function_name: self.partitioning.function_name.clone(),
            scheme_name: self.partitioning.scheme_name.clone(),
            placement: self.partitioning.placement.clone(),
            boundaries: boundaries.boundaries().to_vec(),
        }
    }

    /// Drop and recreate the partition scheme and function for `boundaries`.
    ///
    /// Fails before touching the catalog while any index is still placed on the
    /// existing scheme.
    pub async fn rebuild_topology(
        &self,
        boundaries: &RetentionBoundarySet,
    ) -> RetentionResult<TopologyReport> {
        let current = self.current_topology().await?;
        let desired = self.desired_topology(boundaries);

        if let Some(scheme) = &current.scheme {
            let dependents: Vec<String> = self
                .engine
                .list_tables(&self.schema)
                .await?
                .into_iter()
                .filter(|t| {
                    t.clustered_index
                        .as_ref()
                        .and_then(|i| i.scheme.as_deref())
                        == Some(scheme.name.as_str())
                })
                .map(|t| t.name.name)
                .collect();
            if !dependents.is_empty() {
                return Err(RetentionError::StructuralPrecondition(format!(
                    "partition scheme {} is still used by the clustered indexes of {}",
                    scheme.name,
                    dependents.join(", ")
                )));
            }
        }

        let unchanged = TopologyPlan::is_noop_rebuild(&current, &desired);
        let plan = TopologyPlan::between(&current, &desired);
        self.execute(&plan).await?;

        tracing::info!(
            function = %self.partitioning.function_name,
            scheme = %self.partitioning.scheme_name,
            boundaries = boundaries.years().len(),
            partitions = boundaries.partition_count(),
            unchanged,
            "Partition topology rebuilt"
        );

        Ok(TopologyReport {
            years: boundaries.years().to_vec(),
            plan,
            unchanged,
        })
    }

    async fn execute(&self, plan: &TopologyPlan) -> RetentionResult<()> {
        for step in plan.steps() {
            tracing::debug!(?step, "Applying topology step");
            match step {
                TopologyStep::DropScheme { name } => {
                    self.engine.drop_partition_scheme(name).await?;
                }
                TopologyStep::DropFunction { name } => {
                    self.engine.drop_partition_function(name).await?;
                }
                TopologyStep::CreateFunction { name, boundaries } => {
                    self.engine
                        .create_partition_function(name, boundaries)
                        .await?;
                }
                TopologyStep::CreateScheme {
                    name,
                    function,
                    placement,
                } => {
                    self.engine
                        .create_partition_scheme(name, function, placement)
                        .await?;
                }
            }
        }
        Ok(())
    }

    /// Drop every clustered index that does not back a primary key.
    pub async fn drop_clustered_indexes(
        &self,
        tables: &[ManagedTable],
    ) -> RetentionResult<IndexReport> {
        let indexes = self.current_indexes().await?;
        let mut report = IndexReport::new(IndexAction::Dropped);

        for table in tables {
            match indexes.get(&table.table).and_then(Option::as_ref) {
                Some(index) if !index.is_primary_key => {
                    match self.engine.drop_index(&table.table, &index.name).await {
                        Ok(()) => report.applied.push(table.name().to_string()),
                        Err(e) => report.fail(&table.table, &RetentionError::from(e)),
                    }
                }
                _ => report.skipped.push(table.name().to_string()),
            }
        }

        tracing::info!(
            dropped = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Clustered indexes dropped"
        );
        Ok(report)
    }

    /// Create `CIX_<table>` on the partition scheme for every table without a
    /// clustered index. Tables that already have one are skipped.
    pub async fn ensure_partitioned_indexes(
        &self,
        tables: &[ManagedTable],
    ) -> RetentionResult<IndexReport> {
        let scheme = &self.partitioning.scheme_name;
        if self.engine.partition_scheme(scheme).await?.is_none() {
            return Err(RetentionError::StructuralPrecondition(format!(
                "partition scheme {scheme} does not exist"
            )));
        }

        let indexes = self.current_indexes().await?;
        let mut report = IndexReport::new(IndexAction::Created);

        for table in tables {
            if indexes.get(&table.table).is_some_and(Option::is_some) {
                report.skipped.push(table.name().to_string());
                continue;
            }
            let result = self
                .engine
                .create_clustered_index(
                    &table.table,
                    &Self::index_name(table.name()),
                    &self.partitioning.timestamp_column,
                    scheme,
                )
                .await;
            match result {
                Ok(()) => report.applied.push(table.name().to_string()),
                Err(e) => report.fail(&table.table, &RetentionError::from(e)),
            }
        }

        tracing::info!(
            created = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Partition-aligned indexes ensured"
        );
        Ok(report)
    }

    /// Rebuild every existing clustered index in place.
    ///
    /// With a positive `fragmentation_threshold`, indexes at or below it are skipped.
    pub async fn rebuild_indexes(
        &self,
        tables: &[ManagedTable],
        fragmentation_threshold: f64,
    ) -> RetentionResult<IndexReport> {
        let indexes = self.current_indexes().await?;
        let mut report = IndexReport::new(IndexAction::Rebuilt);

        for table in tables {
            let Some(index) = indexes.get(&table.table).and_then(Option::as_ref) else {
                report.skipped.push(table.name().to_string());
                continue;
            };

            if fragmentation_threshold > 0.0 {
                match self
                    .engine
                    .index_fragmentation(&table.table, &index.name)
                    .await
                {
                    Ok(fragmentation) if fragmentation <= fragmentation_threshold => {
                        tracing::debug!(table = %table.table, fragmentation, "Index below rebuild threshold");
                        report.skipped.push(table.name().to_string());
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        report.fail(&table.table, &RetentionError::from(e));
                        continue;
                    }
                }
            }

            match self.engine.rebuild_index(&table.table, &index.name).await {
                Ok(()) => report.applied.push(table.name().to_string()),
                Err(e) => report.fail(&table.table, &RetentionError::from(e)),
            }
        }

        tracing::info!(
            rebuilt = report.applied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Clustered indexes rebuilt"
        );
        Ok(report)
    }

    async fn current_indexes(&self) -> RetentionResult<HashMap<TableName, Option<IndexInfo>>> {
        Ok(self
            .engine
            .list_tables(&self.schema)
            .await?
            .into_iter()
            .map(|t| (t.name, t.clustered_index))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::TablesConfig, engine::memory::MemoryEngine, resolver::resolve_catalog};

    struct Fixture {
        engine: Arc<MemoryEngine>,
        manager: TopologyManager,
        boundaries: RetentionBoundarySet,
    }

    fn fixture() -> Fixture {
        let engine = Arc::new(MemoryEngine::new("db"));
        for name in ["main_a", "a", "main_b"] {
            engine
                .create_table(TableName::new("dbo", name), ["logtime", "value"])
                .unwrap();
        }
        let partitioning = PartitioningConfig::new(vec![2022, 2023, 2024], vec![2024]);
        let boundaries = RetentionBoundarySet::from_years(&partitioning.boundary_years).unwrap();
        let manager = TopologyManager::new(engine.clone(), "dbo", partitioning);
        Fixture {
            engine,
            manager,
            boundaries,
        }
    }

    async fn managed(engine: &MemoryEngine) -> Vec<ManagedTable> {
        let catalog = engine.list_tables("dbo").await.unwrap();
        resolve_catalog(&catalog, &TablesConfig::default(), "PS_LOGTIME_YEARLY").tables
    }

    #[tokio::test]
    async fn test_rebuild_twice_equals_once() {
        let f = fixture();
        let first = f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        let after_first = f.manager.current_topology().await.unwrap();

        let second = f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        let after_second = f.manager.current_topology().await.unwrap();

        assert!(!first.unchanged);
        assert!(second.unchanged);
        assert_eq!(after_first, after_second);
        assert_eq!(
            after_second.function.unwrap().boundaries,
            f.boundaries.boundaries()
        );
    }

    #[tokio::test]
    async fn test_rebuild_refused_while_indexes_use_scheme() {
        let f = fixture();
        f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        let tables = managed(&f.engine).await;
        f.manager.ensure_partitioned_indexes(&tables).await.unwrap();
        let journal_len = f.engine.journal().len();

        let err = f.manager.rebuild_topology(&f.boundaries).await.unwrap_err();

        assert!(matches!(err, RetentionError::StructuralPrecondition(_)));
        assert_eq!(f.engine.journal().len(), journal_len);
    }

    #[tokio::test]
    async fn test_ensure_then_rebuild_leaves_one_index_per_table() {
        let f = fixture();
        f.engine
            .insert_rows(
                &TableName::new("dbo", "main_a"),
                f.boundaries.boundaries().iter().copied(),
            )
            .unwrap();
        f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        let tables = managed(&f.engine).await;

        let created = f.manager.ensure_partitioned_indexes(&tables).await.unwrap();
        let again = f.manager.ensure_partitioned_indexes(&tables).await.unwrap();
        let rebuilt = f.manager.rebuild_indexes(&tables, 0.0).await.unwrap();

        assert_eq!(created.applied, ["main_a", "a", "main_b"]);
        assert_eq!(again.skipped.len(), 3);
        assert_eq!(rebuilt.applied.len(), 3);
        for table in &tables {
            let index = f.engine.clustered_index(&table.table).unwrap();
            assert_eq!(index.name, TopologyManager::index_name(table.name()));
        }
        assert_eq!(
            f.engine
                .count_rows(&TableName::new("dbo", "main_a"))
                .await
                .unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_ensure_requires_scheme() {
        let f = fixture();
        let tables = managed(&f.engine).await;
        let err = f
            .manager
            .ensure_partitioned_indexes(&tables)
            .await
            .unwrap_err();
        assert!(matches!(err, RetentionError::StructuralPrecondition(_)));
    }

    #[tokio::test]
    async fn test_ensure_records_per_table_failures() {
        let f = fixture();
        f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        f.engine
            .inject_fault(crate::engine::memory::FaultOp::CreateClusteredIndex, Some("a"));
        let tables = managed(&f.engine).await;

        let report = f.manager.ensure_partitioned_indexes(&tables).await.unwrap();

        assert_eq!(report.applied, ["main_a", "main_b"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].table, "a");
        assert!(!report.is_clean());
    }

    #[tokio::test]
    async fn test_drop_keeps_primary_keys() {
        let f = fixture();
        let pk = TableName::new("dbo", "main_b");
        f.engine
            .seed_clustered_index(
                &pk,
                IndexInfo {
                    name: "PK_main_b".into(),
                    column: "logtime".into(),
                    scheme: None,
                    is_primary_key: true,
                },
            )
            .unwrap();
        f.engine
            .seed_clustered_index(
                &TableName::new("dbo", "main_a"),
                IndexInfo {
                    name: "IX_old".into(),
                    column: "logtime".into(),
                    scheme: None,
                    is_primary_key: false,
                },
            )
            .unwrap();
        let tables = managed(&f.engine).await;

        let report = f.manager.drop_clustered_indexes(&tables).await.unwrap();

        assert_eq!(report.applied, ["main_a"]);
        assert_eq!(report.skipped, ["a", "main_b"]);
        assert!(f.engine.clustered_index(&pk).is_some());
    }

    #[tokio::test]
    async fn test_rebuild_with_zero_indexes_is_noop() {
        let f = fixture();
        let tables = managed(&f.engine).await;
        let report = f.manager.rebuild_indexes(&tables, 0.0).await.unwrap();
        assert!(report.applied.is_empty());
        assert_eq!(report.skipped.len(), 3);
    }

    #[tokio::test]
    async fn test_rebuild_threshold_skips_healthy_indexes() {
        let f = fixture();
        f.manager.rebuild_topology(&f.boundaries).await.unwrap();
        let tables = managed(&f.engine).await;
        f.manager.ensure_partitioned_indexes(&tables).await.unwrap();

        let report = f.manager.rebuild_indexes(&tables, 30.0).await.unwrap();
        assert_eq!(report.skipped.len(), 3);

        f.engine.shrink_database(10).await.unwrap();
        let report = f.manager.rebuild_indexes(&tables, 30.0).await.unwrap();
        assert_eq!(report.applied.len(), 3);
    }
}
