//! Staging twins: empty copies of the managed tables, clustered on the same
//! partition scheme, that receive switched-out partitions.

use std::sync::Arc;

use serde::Serialize;

use crate::{
    config::{PartitioningConfig, TablesConfig},
    engine::{EngineGateway, TableName},
    error::{RetentionError, RetentionResult, TableFailure},
    resolver::ManagedTable,
    topology::TopologyManager,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedTable {
    pub live: String,
    pub staging: String,
    /// A previous staging table was dropped first.
    pub replaced: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StagingReport {
    pub created: Vec<StagedTable>,
    pub failed: Vec<TableFailure>,
}

impl StagingReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct StagingProvisioner {
    engine: Arc<dyn EngineGateway>,
    tables: TablesConfig,
    partitioning: PartitioningConfig,
}

impl StagingProvisioner {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        tables: TablesConfig,
        partitioning: PartitioningConfig,
    ) -> Self {
        Self {
            engine,
            tables,
            partitioning,
        }
    }

    pub fn staging_table(&self, live: &TableName) -> TableName {
        live.sibling(self.tables.staging_name(&live.name))
    }

    /// Recreate the staging twin of every managed table.
    ///
    /// Existing staging tables are dropped unconditionally. A live table that is not
    /// clustered on the configured scheme fails for that table only.
    pub async fn provision(&self, tables: &[ManagedTable]) -> RetentionResult<StagingReport> {
        let mut report = StagingReport::default();

        for table in tables {
            match self.provision_one(table).await {
                Ok(staged) => report.created.push(staged),
                Err(e) => {
                    tracing::error!(table = %table.table, error = %e, "Failed to provision staging table");
                    report.failed.push(TableFailure::new(table.name(), &e));
                }
            }
        }

        tracing::info!(
            created = report.created.len(),
            failed = report.failed.len(),
            "Staging tables provisioned"
        );
        Ok(report)
    }

    async fn provision_one(&self, table: &ManagedTable) -> RetentionResult<StagedTable> {
        let staging = self.staging_table(&table.table);
        let replaced = self.engine.table_exists(&staging).await?;
        if replaced {
            self.engine.drop_table(&staging).await?;
        }

        if !table.aligned {
            return Err(RetentionError::StructuralPrecondition(format!(
                "{} is not clustered on partition scheme {}",
                table.table, self.partitioning.scheme_name
            )));
        }

        self.engine.create_empty_copy(&table.table, &staging).await?;
        self.engine
            .create_clustered_index(
                &staging,
                &TopologyManager::index_name(&staging.name),
                &self.partitioning.timestamp_column,
                &self.partitioning.scheme_name,
            )
            .await?;

        tracing::debug!(live = %table.table, staging = %staging, replaced, "Staging table created");
        Ok(StagedTable {
            live: table.name().to_string(),
            staging: staging.name,
            replaced,
        })
    }
}
