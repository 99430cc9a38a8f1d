//! In-memory engine used by the simulator and the test-suite.
//!
//! Models the parts of a partitioning storage engine the orchestrator relies on:
//! a catalog of tables holding timestamped rows, RANGE RIGHT partition functions,
//! schemes that depend on them, clustered indexes that depend on schemes, metadata
//! partition switches with the engine's alignment checks, and full/log backups kept
//! as catalog snapshots.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, MutexGuard};

use super::{
    BackupGateway, BackupHeader, BackupKind, BackupOutcome, BackupRequest, DataFileTarget,
    DatabaseInfo, DatabaseState, EngineError, EngineGateway, EngineResult, IndexInfo,
    PartitionFunctionDef, PartitionSchemeDef, ProgressCallback, RecoveryMode, RecoveryModel,
    RestoreProgress, TableInfo, TableName,
};
use crate::topology::range_right_ordinal;

/// Fragmentation an index picks up from a shrink.
const SHRINK_FRAGMENTATION: f64 = 40.0;

/// Operations that can be made to fail on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultOp {
    SwitchPartition,
    Truncate,
    CreateClusteredIndex,
    DropIndex,
    RebuildIndex,
    CreateEmptyCopy,
    CreatePartitionFunction,
    ShrinkDatabase,
    SetRecoveryModel,
    FullBackup,
}

#[derive(Debug, Clone)]
struct Fault {
    op: FaultOp,
    table: Option<String>,
}

#[derive(Debug, Clone)]
struct MemoryIndex {
    info: IndexInfo,
    fragmentation: f64,
}

#[derive(Debug, Clone)]
struct MemoryTable {
    name: TableName,
    columns: Vec<String>,
    rows: Vec<NaiveDateTime>,
    clustered: Option<MemoryIndex>,
}

#[derive(Debug, Clone, Default)]
struct Catalog {
    tables: Vec<MemoryTable>,
    functions: BTreeMap<String, Vec<NaiveDateTime>>,
    schemes: BTreeMap<String, PartitionSchemeDef>,
    recovery_model: RecoveryModel,
}

impl Catalog {
    fn table(&self, name: &TableName) -> EngineResult<&MemoryTable> {
        self.tables
            .iter()
            .find(|t| &t.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("table {name}")))
    }

    fn table_mut(&mut self, name: &TableName) -> EngineResult<&mut MemoryTable> {
        self.tables
            .iter_mut()
            .find(|t| &t.name == name)
            .ok_or_else(|| EngineError::NotFound(format!("table {name}")))
    }

    fn boundaries(&self, function: &str) -> EngineResult<&[NaiveDateTime]> {
        self.functions
            .get(function)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::NotFound(format!("partition function {function}")))
    }

    /// The partition function a table is aligned to through its clustered index.
    fn aligned_function(&self, table: &MemoryTable) -> Option<String> {
        let scheme = table.clustered.as_ref()?.info.scheme.as_ref()?;
        self.schemes.get(scheme).map(|s| s.function.clone())
    }
}

#[derive(Debug)]
struct DatabaseSlot {
    catalog: Catalog,
    exists: bool,
    state: DatabaseState,
    restored_files: Vec<DataFileTarget>,
    terminated_sessions: u32,
}

struct StoredBackup {
    header: BackupHeader,
    catalog: Catalog,
}

#[derive(Default)]
struct BackupStore {
    media: Vec<StoredBackup>,
    last_lsn: u64,
}

impl BackupStore {
    fn next_lsn(&mut self) -> u64 {
        self.last_lsn += 1;
        self.last_lsn
    }
}

/// Engine and backup gateway over process memory.
pub struct MemoryEngine {
    database: String,
    slot: Mutex<DatabaseSlot>,
    backups: Mutex<BackupStore>,
    faults: Mutex<Vec<Fault>>,
    journal: Mutex<Vec<String>>,
}

impl MemoryEngine {
    /// An online, empty database.
    pub fn new(database: impl Into<String>) -> Self {
        Self::build(database.into(), true)
    }

    /// A database that does not exist yet; only a restore brings it into being.
    pub fn missing(database: impl Into<String>) -> Self {
        Self::build(database.into(), false)
    }

    fn build(database: String, exists: bool) -> Self {
        Self {
            database,
            slot: Mutex::new(DatabaseSlot {
                catalog: Catalog::default(),
                exists,
                state: DatabaseState::Online,
                restored_files: Vec::new(),
                terminated_sessions: 0,
            }),
            backups: Mutex::new(BackupStore::default()),
            faults: Mutex::new(Vec::new()),
            journal: Mutex::new(Vec::new()),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    // ==================== Seeding ====================

    pub fn create_table<I, S>(&self, table: TableName, columns: I) -> EngineResult<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut slot = self.online()?;
        if slot.catalog.table(&table).is_ok() {
            return Err(EngineError::AlreadyExists(format!("table {table}")));
        }
        slot.catalog.tables.push(MemoryTable {
            name: table,
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
            clustered: None,
        });
        Ok(())
    }

    pub fn insert_rows(
        &self,
        table: &TableName,
        rows: impl IntoIterator<Item = NaiveDateTime>,
    ) -> EngineResult<()> {
        let mut slot = self.online()?;
        slot.catalog.table_mut(table)?.rows.extend(rows);
        Ok(())
    }

    /// Attach a clustered index without any of the DDL checks, e.g. a primary key
    /// that predates partitioning.
    pub fn seed_clustered_index(&self, table: &TableName, info: IndexInfo) -> EngineResult<()> {
        let mut slot = self.online()?;
        slot.catalog.table_mut(table)?.clustered = Some(MemoryIndex {
            info,
            fragmentation: 0.0,
        });
        Ok(())
    }

    // ==================== Inspection ====================

    pub fn rows(&self, table: &TableName) -> Option<Vec<NaiveDateTime>> {
        let slot = self.slot.lock();
        slot.catalog.table(table).ok().map(|t| t.rows.clone())
    }

    pub fn clustered_index(&self, table: &TableName) -> Option<IndexInfo> {
        let slot = self.slot.lock();
        slot.catalog
            .table(table)
            .ok()
            .and_then(|t| t.clustered.as_ref().map(|i| i.info.clone()))
    }

    pub fn recovery_model(&self) -> RecoveryModel {
        self.slot.lock().catalog.recovery_model
    }

    pub fn state(&self) -> DatabaseState {
        self.slot.lock().state
    }

    pub fn restored_files(&self) -> Vec<DataFileTarget> {
        self.slot.lock().restored_files.clone()
    }

    pub fn terminated_sessions(&self) -> u32 {
        self.slot.lock().terminated_sessions
    }

    pub fn backup_headers(&self) -> Vec<BackupHeader> {
        self.backups
            .lock()
            .media
            .iter()
            .map(|b| b.header.clone())
            .collect()
    }

    /// Mutating operations in the order they were applied.
    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    // ==================== Fault injection ====================

    /// Make `op` fail with a lock timeout, either for one table or for every target.
    pub fn inject_fault(&self, op: FaultOp, table: Option<&str>) {
        self.faults.lock().push(Fault {
            op,
            table: table.map(str::to_string),
        });
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Capture the current catalog as a log backup under `location`.
    pub fn record_log_backup(&self, location: &str) -> EngineResult<BackupHeader> {
        let catalog = self.online()?.catalog.clone();
        let mut store = self.backups.lock();
        let lsn = store.next_lsn();
        let header = BackupHeader {
            source: format!("{location}/log-{lsn}"),
            database: self.database.clone(),
            kind: BackupKind::Log,
            first_lsn: lsn,
            last_lsn: lsn,
            checkpoint_lsn: lsn,
        };
        store.media.push(StoredBackup {
            header: header.clone(),
            catalog,
        });
        Ok(header)
    }

    // ==================== Internals ====================

    fn online(&self) -> EngineResult<MutexGuard<'_, DatabaseSlot>> {
        let slot = self.slot.lock();
        if !slot.exists {
            return Err(EngineError::NotFound(format!("database {}", self.database)));
        }
        if slot.state == DatabaseState::Restoring {
            return Err(EngineError::Internal(format!(
                "database {} is restoring",
                self.database
            )));
        }
        Ok(slot)
    }

    fn check_fault(&self, op: FaultOp, table: Option<&TableName>) -> EngineResult<()> {
        let faults = self.faults.lock();
        let hit = faults.iter().any(|f| {
            f.op == op
                && match (&f.table, table) {
                    (None, _) => true,
                    (Some(wanted), Some(t)) => wanted == &t.name,
                    (Some(_), None) => false,
                }
        });
        if hit {
            let target = table.map_or_else(|| self.database.clone(), ToString::to_string);
            return Err(EngineError::Timeout(target));
        }
        Ok(())
    }

    fn record(&self, entry: String) {
        self.journal.lock().push(entry);
    }
}

#[async_trait]
impl EngineGateway for MemoryEngine {
    async fn list_tables(&self, schema: &str) -> EngineResult<Vec<TableInfo>> {
        let slot = self.online()?;
        Ok(slot
            .catalog
            .tables
            .iter()
            .filter(|t| t.name.schema == schema)
            .map(|t| TableInfo {
                name: t.name.clone(),
                clustered_index: t.clustered.as_ref().map(|i| i.info.clone()),
            })
            .collect())
    }

    async fn table_exists(&self, table: &TableName) -> EngineResult<bool> {
        Ok(self.online()?.catalog.table(table).is_ok())
    }

    async fn count_rows(&self, table: &TableName) -> EngineResult<u64> {
        Ok(self.online()?.catalog.table(table)?.rows.len() as u64)
    }

    async fn count_partition_rows(
        &self,
        table: &TableName,
        function: &str,
        column: &str,
        ordinal: u32,
    ) -> EngineResult<u64> {
        let slot = self.online()?;
        let boundaries = slot.catalog.boundaries(function)?;
        let t = slot.catalog.table(table)?;
        if !t.columns.iter().any(|c| c == column) {
            return Err(EngineError::NotFound(format!("column {column} on {table}")));
        }
        Ok(t.rows
            .iter()
            .filter(|ts| range_right_ordinal(boundaries, **ts) == ordinal)
            .count() as u64)
    }

    async fn partition_function(&self, name: &str) -> EngineResult<Option<PartitionFunctionDef>> {
        let slot = self.online()?;
        Ok(slot
            .catalog
            .functions
            .get(name)
            .map(|boundaries| PartitionFunctionDef {
                name: name.to_string(),
                boundaries: boundaries.clone(),
            }))
    }

    async fn create_partition_function(
        &self,
        name: &str,
        boundaries: &[NaiveDateTime],
    ) -> EngineResult<()> {
        self.check_fault(FaultOp::CreatePartitionFunction, None)?;
        let mut slot = self.online()?;
        if slot.catalog.functions.contains_key(name) {
            return Err(EngineError::AlreadyExists(format!("partition function {name}")));
        }
        if boundaries.windows(2).any(|w| w[0] >= w[1]) {
            return Err(EngineError::InvalidArgument(format!(
                "boundary values of {name} must be strictly ascending"
            )));
        }
        slot.catalog
            .functions
            .insert(name.to_string(), boundaries.to_vec());
        drop(slot);
        self.record(format!("create_partition_function {name}"));
        Ok(())
    }

    async fn drop_partition_function(&self, name: &str) -> EngineResult<()> {
        let mut slot = self.online()?;
        if !slot.catalog.functions.contains_key(name) {
            return Err(EngineError::NotFound(format!("partition function {name}")));
        }
        if let Some(scheme) = slot.catalog.schemes.values().find(|s| s.function == name) {
            return Err(EngineError::DependencyConflict(format!(
                "partition function {name} is used by scheme {}",
                scheme.name
            )));
        }
        slot.catalog.functions.remove(name);
        drop(slot);
        self.record(format!("drop_partition_function {name}"));
        Ok(())
    }

    async fn partition_scheme(&self, name: &str) -> EngineResult<Option<PartitionSchemeDef>> {
        Ok(self.online()?.catalog.schemes.get(name).cloned())
    }

    async fn create_partition_scheme(
        &self,
        name: &str,
        function: &str,
        placement: &str,
    ) -> EngineResult<()> {
        let mut slot = self.online()?;
        if slot.catalog.schemes.contains_key(name) {
            return Err(EngineError::AlreadyExists(format!("partition scheme {name}")));
        }
        slot.catalog.boundaries(function)?;
        slot.catalog.schemes.insert(
            name.to_string(),
            PartitionSchemeDef {
                name: name.to_string(),
                function: function.to_string(),
                placement: placement.to_string(),
            },
        );
        drop(slot);
        self.record(format!("create_partition_scheme {name}"));
        Ok(())
    }

    async fn drop_partition_scheme(&self, name: &str) -> EngineResult<()> {
        let mut slot = self.online()?;
        if !slot.catalog.schemes.contains_key(name) {
            return Err(EngineError::NotFound(format!("partition scheme {name}")));
        }
        let dependent = slot.catalog.tables.iter().find(|t| {
            t.clustered
                .as_ref()
                .and_then(|i| i.info.scheme.as_deref())
                == Some(name)
        });
        if let Some(table) = dependent {
            return Err(EngineError::DependencyConflict(format!(
                "partition scheme {name} is used by the clustered index on {}",
                table.name
            )));
        }
        slot.catalog.schemes.remove(name);
        drop(slot);
        self.record(format!("drop_partition_scheme {name}"));
        Ok(())
    }

    async fn resolve_partition_ordinal(
        &self,
        function: &str,
        value: NaiveDateTime,
    ) -> EngineResult<u32> {
        let slot = self.online()?;
        Ok(range_right_ordinal(slot.catalog.boundaries(function)?, value))
    }

    async fn create_clustered_index(
        &self,
        table: &TableName,
        index_name: &str,
        column: &str,
        scheme: &str,
    ) -> EngineResult<()> {
        self.check_fault(FaultOp::CreateClusteredIndex, Some(table))?;
        let mut slot = self.online()?;
        if !slot.catalog.schemes.contains_key(scheme) {
            return Err(EngineError::NotFound(format!("partition scheme {scheme}")));
        }
        let t = slot.catalog.table_mut(table)?;
        if let Some(existing) = &t.clustered {
            return Err(EngineError::AlreadyExists(format!(
                "clustered index {} on {table}",
                existing.info.name
            )));
        }
        if !t.columns.iter().any(|c| c == column) {
            return Err(EngineError::NotFound(format!("column {column} on {table}")));
        }
        t.clustered = Some(MemoryIndex {
            info: IndexInfo {
                name: index_name.to_string(),
                column: column.to_string(),
                scheme: Some(scheme.to_string()),
                is_primary_key: false,
            },
            fragmentation: 0.0,
        });
        drop(slot);
        self.record(format!("create_clustered_index {table} {index_name}"));
        Ok(())
    }

    async fn drop_index(&self, table: &TableName, index_name: &str) -> EngineResult<()> {
        self.check_fault(FaultOp::DropIndex, Some(table))?;
        let mut slot = self.online()?;
        let t = slot.catalog.table_mut(table)?;
        match &t.clustered {
            Some(index) if index.info.name == index_name => t.clustered = None,
            _ => {
                return Err(EngineError::NotFound(format!("index {index_name} on {table}")));
            }
        }
        drop(slot);
        self.record(format!("drop_index {table} {index_name}"));
        Ok(())
    }

    async fn rebuild_index(&self, table: &TableName, index_name: &str) -> EngineResult<()> {
        self.check_fault(FaultOp::RebuildIndex, Some(table))?;
        let mut slot = self.online()?;
        let t = slot.catalog.table_mut(table)?;
        match t.clustered.as_mut() {
            Some(index) if index.info.name == index_name => index.fragmentation = 0.0,
            _ => {
                return Err(EngineError::NotFound(format!("index {index_name} on {table}")));
            }
        }
        drop(slot);
        self.record(format!("rebuild_index {table} {index_name}"));
        Ok(())
    }

    async fn index_fragmentation(&self, table: &TableName, index_name: &str) -> EngineResult<f64> {
        let slot = self.online()?;
        match &slot.catalog.table(table)?.clustered {
            Some(index) if index.info.name == index_name => Ok(index.fragmentation),
            _ => Err(EngineError::NotFound(format!("index {index_name} on {table}"))),
        }
    }

    async fn create_empty_copy(&self, source: &TableName, dest: &TableName) -> EngineResult<()> {
        self.check_fault(FaultOp::CreateEmptyCopy, Some(source))?;
        let mut slot = self.online()?;
        if slot.catalog.table(dest).is_ok() {
            return Err(EngineError::AlreadyExists(format!("table {dest}")));
        }
        let columns = slot.catalog.table(source)?.columns.clone();
        slot.catalog.tables.push(MemoryTable {
            name: dest.clone(),
            columns,
            rows: Vec::new(),
            clustered: None,
        });
        drop(slot);
        self.record(format!("create_empty_copy {source} {dest}"));
        Ok(())
    }

    async fn drop_table(&self, table: &TableName) -> EngineResult<()> {
        let mut slot = self.online()?;
        let before = slot.catalog.tables.len();
        slot.catalog.tables.retain(|t| &t.name != table);
        if slot.catalog.tables.len() == before {
            return Err(EngineError::NotFound(format!("table {table}")));
        }
        drop(slot);
        self.record(format!("drop_table {table}"));
        Ok(())
    }

    async fn truncate(&self, table: &TableName) -> EngineResult<u64> {
        self.check_fault(FaultOp::Truncate, Some(table))?;
        let mut slot = self.online()?;
        let t = slot.catalog.table_mut(table)?;
        let removed = t.rows.len() as u64;
        t.rows.clear();
        drop(slot);
        self.record(format!("truncate {table}"));
        Ok(removed)
    }

    async fn switch_partition(
        &self,
        source: &TableName,
        dest: &TableName,
        ordinal: u32,
    ) -> EngineResult<u64> {
        self.check_fault(FaultOp::SwitchPartition, Some(source))?;
        if source == dest {
            return Err(EngineError::InvalidArgument(format!(
                "cannot switch {source} into itself"
            )));
        }
        let mut slot = self.online()?;
        let catalog = &mut slot.catalog;

        let src = catalog.table(source)?;
        let dst = catalog.table(dest)?;
        if src.columns != dst.columns {
            return Err(EngineError::SwitchRejected(format!(
                "{source} and {dest} do not have the same columns"
            )));
        }
        let src_function = catalog
            .aligned_function(src)
            .ok_or_else(|| EngineError::SwitchRejected(format!("{source} is not partitioned")))?;
        let dst_function = catalog
            .aligned_function(dst)
            .ok_or_else(|| EngineError::SwitchRejected(format!("{dest} is not partitioned")))?;
        if src_function != dst_function {
            return Err(EngineError::SwitchRejected(format!(
                "{source} is partitioned by {src_function} but {dest} by {dst_function}"
            )));
        }
        let src_key = src.clustered.as_ref().map(|i| i.info.column.as_str());
        let dst_key = dst.clustered.as_ref().map(|i| i.info.column.as_str());
        if src_key != dst_key {
            return Err(EngineError::SwitchRejected(format!(
                "{source} and {dest} are clustered on different columns"
            )));
        }

        let boundaries = catalog.boundaries(&src_function)?.to_vec();
        let partitions = boundaries.len() as u32 + 1;
        if ordinal == 0 || ordinal > partitions {
            return Err(EngineError::InvalidArgument(format!(
                "partition {ordinal} does not exist in {src_function} ({partitions} partitions)"
            )));
        }
        let occupied = dst
            .rows
            .iter()
            .filter(|ts| range_right_ordinal(&boundaries, **ts) == ordinal)
            .count();
        if occupied > 0 {
            return Err(EngineError::SwitchRejected(format!(
                "partition {ordinal} of {dest} already holds {occupied} rows"
            )));
        }

        let src = catalog.table_mut(source)?;
        let (moved, kept): (Vec<_>, Vec<_>) = src
            .rows
            .iter()
            .partition(|ts| range_right_ordinal(&boundaries, **ts) == ordinal);
        src.rows = kept;
        let count = moved.len() as u64;
        catalog.table_mut(dest)?.rows.extend(moved);
        drop(slot);

        self.record(format!("switch_partition {source} {dest} {ordinal}"));
        Ok(count)
    }

    async fn set_recovery_model(&self, model: RecoveryModel) -> EngineResult<()> {
        self.check_fault(FaultOp::SetRecoveryModel, None)?;
        self.online()?.catalog.recovery_model = model;
        self.record(format!("set_recovery_model {model}"));
        Ok(())
    }

    async fn shrink_database(&self, target_free_percent: u8) -> EngineResult<()> {
        self.check_fault(FaultOp::ShrinkDatabase, None)?;
        if target_free_percent > 100 {
            return Err(EngineError::InvalidArgument(format!(
                "target free percent {target_free_percent} exceeds 100"
            )));
        }
        let mut slot = self.online()?;
        for index in slot
            .catalog
            .tables
            .iter_mut()
            .filter_map(|t| t.clustered.as_mut())
        {
            index.fragmentation = (index.fragmentation + SHRINK_FRAGMENTATION).min(99.0);
        }
        drop(slot);
        self.record(format!("shrink_database {target_free_percent}"));
        Ok(())
    }

    async fn database_info(&self) -> EngineResult<Option<DatabaseInfo>> {
        let slot = self.slot.lock();
        if !slot.exists {
            return Ok(None);
        }
        Ok(Some(DatabaseInfo {
            name: self.database.clone(),
            state: slot.state,
            recovery_model: slot.catalog.recovery_model,
        }))
    }

    async fn terminate_connections(&self) -> EngineResult<()> {
        let mut slot = self.slot.lock();
        if !slot.exists {
            return Err(EngineError::NotFound(format!("database {}", self.database)));
        }
        slot.terminated_sessions += 1;
        drop(slot);
        self.record("terminate_connections".to_string());
        Ok(())
    }
}

#[async_trait]
impl BackupGateway for MemoryEngine {
    async fn full_backup(&self, request: &BackupRequest) -> EngineResult<BackupOutcome> {
        self.check_fault(FaultOp::FullBackup, None)?;
        if request.database != self.database {
            return Err(EngineError::Backup(format!(
                "backup requested for {} on engine bound to {}",
                request.database, self.database
            )));
        }
        let catalog = self.online()?.catalog.clone();
        let rows: usize = catalog.tables.iter().map(|t| t.rows.len()).sum();

        let mut store = self.backups.lock();
        let lsn = store.next_lsn();
        let location = format!("memory://{}/{}/{lsn}", self.database, request.checkpoint);
        store.media.push(StoredBackup {
            header: BackupHeader {
                source: location.clone(),
                database: self.database.clone(),
                kind: BackupKind::Full,
                first_lsn: lsn,
                last_lsn: lsn,
                checkpoint_lsn: lsn,
            },
            catalog,
        });
        drop(store);

        self.record(format!("full_backup {}", request.checkpoint));
        Ok(BackupOutcome {
            location,
            size_bytes: Some(rows as u64 * 8),
        })
    }

    async fn read_headers(&self, location: &str) -> EngineResult<Vec<BackupHeader>> {
        Ok(self
            .backups
            .lock()
            .media
            .iter()
            .filter(|b| b.header.source.starts_with(location))
            .map(|b| b.header.clone())
            .collect())
    }

    async fn restore_full(
        &self,
        source: &str,
        targets: &[DataFileTarget],
        recovery: RecoveryMode,
        progress: &ProgressCallback,
    ) -> EngineResult<()> {
        let catalog = {
            let store = self.backups.lock();
            store
                .media
                .iter()
                .find(|b| b.header.source == source && b.header.kind == BackupKind::Full)
                .map(|b| b.catalog.clone())
                .ok_or_else(|| EngineError::NotFound(format!("full backup {source}")))?
        };

        for percent in [0.0, 50.0, 100.0] {
            progress(RestoreProgress {
                source: source.to_string(),
                percent_complete: percent,
            });
        }

        let mut slot = self.slot.lock();
        slot.catalog = catalog;
        slot.exists = true;
        slot.restored_files = targets.to_vec();
        slot.state = match recovery {
            RecoveryMode::Recovery => DatabaseState::Online,
            RecoveryMode::NoRecovery => DatabaseState::Restoring,
        };
        drop(slot);

        self.record(format!("restore_full {source}"));
        Ok(())
    }

    async fn restore_log(&self, source: &str, recovery: RecoveryMode) -> EngineResult<()> {
        let catalog = {
            let store = self.backups.lock();
            store
                .media
                .iter()
                .find(|b| b.header.source == source && b.header.kind == BackupKind::Log)
                .map(|b| b.catalog.clone())
                .ok_or_else(|| EngineError::NotFound(format!("log backup {source}")))?
        };

        let mut slot = self.slot.lock();
        if !slot.exists || slot.state != DatabaseState::Restoring {
            return Err(EngineError::Backup(format!(
                "database {} is not waiting for log restores",
                self.database
            )));
        }
        slot.catalog = catalog;
        slot.state = match recovery {
            RecoveryMode::Recovery => DatabaseState::Online,
            RecoveryMode::NoRecovery => DatabaseState::Restoring,
        };
        drop(slot);

        self.record(format!("restore_log {source}"));
        Ok(())
    }
}
