//! Gateways to the database engine and its backup subsystem.
//!
//! The orchestrator never talks to a driver directly. Everything it needs from the
//! engine is expressed by [`EngineGateway`] and [`BackupGateway`]; the in-memory
//! implementation in [`memory`] backs the simulator and the test-suite.

mod error;
pub mod fixture;
pub mod memory;
mod types;

use async_trait::async_trait;
use chrono::NaiveDateTime;

pub use error::{EngineError, EngineResult};
pub use types::*;

/// Structural and data operations against one database.
///
/// Implementations are bound to a single database; statements run to completion or
/// fail, there is no cancellation.
#[async_trait]
pub trait EngineGateway: Send + Sync {
    /// List every table in a schema, in catalog order.
    async fn list_tables(&self, schema: &str) -> EngineResult<Vec<TableInfo>>;

    async fn table_exists(&self, table: &TableName) -> EngineResult<bool>;

    async fn count_rows(&self, table: &TableName) -> EngineResult<u64>;

    /// Count rows whose `column` value maps to `ordinal` under `function`.
    async fn count_partition_rows(
        &self,
        table: &TableName,
        function: &str,
        column: &str,
        ordinal: u32,
    ) -> EngineResult<u64>;

    // ==================== Partition topology ====================

    async fn partition_function(&self, name: &str) -> EngineResult<Option<PartitionFunctionDef>>;

    /// Create a RANGE RIGHT partition function over the given boundaries.
    async fn create_partition_function(
        &self,
        name: &str,
        boundaries: &[NaiveDateTime],
    ) -> EngineResult<()>;

    /// Fails with [`EngineError::DependencyConflict`] while a scheme uses the function.
    async fn drop_partition_function(&self, name: &str) -> EngineResult<()>;

    async fn partition_scheme(&self, name: &str) -> EngineResult<Option<PartitionSchemeDef>>;

    async fn create_partition_scheme(
        &self,
        name: &str,
        function: &str,
        placement: &str,
    ) -> EngineResult<()>;

    /// Fails with [`EngineError::DependencyConflict`] while an index is placed on the scheme.
    async fn drop_partition_scheme(&self, name: &str) -> EngineResult<()>;

    /// Evaluate a partition function for a single value.
    async fn resolve_partition_ordinal(
        &self,
        function: &str,
        value: NaiveDateTime,
    ) -> EngineResult<u32>;

    // ==================== Indexes ====================

    async fn create_clustered_index(
        &self,
        table: &TableName,
        index_name: &str,
        column: &str,
        scheme: &str,
    ) -> EngineResult<()>;

    async fn drop_index(&self, table: &TableName, index_name: &str) -> EngineResult<()>;

    async fn rebuild_index(&self, table: &TableName, index_name: &str) -> EngineResult<()>;

    /// Average fragmentation of an index, in percent.
    async fn index_fragmentation(&self, table: &TableName, index_name: &str) -> EngineResult<f64>;

    // ==================== Tables ====================

    /// Create `dest` with the columns of `source` and no rows or indexes.
    async fn create_empty_copy(&self, source: &TableName, dest: &TableName) -> EngineResult<()>;

    async fn drop_table(&self, table: &TableName) -> EngineResult<()>;

    /// Remove every row; returns the number of rows removed.
    async fn truncate(&self, table: &TableName) -> EngineResult<u64>;

    /// Move partition `ordinal` of `source` into the same partition of `dest` as a
    /// metadata operation. Rejected when the destination partition holds rows or the
    /// two tables are not aligned. Returns the number of rows moved.
    async fn switch_partition(
        &self,
        source: &TableName,
        dest: &TableName,
        ordinal: u32,
    ) -> EngineResult<u64>;

    // ==================== Database ====================

    async fn set_recovery_model(&self, model: RecoveryModel) -> EngineResult<()>;

    async fn shrink_database(&self, target_free_percent: u8) -> EngineResult<()>;

    /// `None` when the database does not exist.
    async fn database_info(&self) -> EngineResult<Option<DatabaseInfo>>;

    /// Disconnect every other session from the database.
    async fn terminate_connections(&self) -> EngineResult<()>;
}

/// Full backups and restores of the database the engine gateway is bound to.
#[async_trait]
pub trait BackupGateway: Send + Sync {
    async fn full_backup(&self, request: &BackupRequest) -> EngineResult<BackupOutcome>;

    /// Read the headers of every backup medium found at `location`.
    async fn read_headers(&self, location: &str) -> EngineResult<Vec<BackupHeader>>;

    async fn restore_full(
        &self,
        source: &str,
        targets: &[DataFileTarget],
        recovery: RecoveryMode,
        progress: &ProgressCallback,
    ) -> EngineResult<()>;

    async fn restore_log(&self, source: &str, recovery: RecoveryMode) -> EngineResult<()>;
}
