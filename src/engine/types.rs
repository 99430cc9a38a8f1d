use std::{fmt, sync::Arc};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableName {
    pub schema: String,
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Same schema, different table name.
    pub fn sibling(&self, name: impl Into<String>) -> Self {
        Self::new(self.schema.clone(), name)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}].[{}]", self.schema, self.name)
    }
}

/// Clustered index metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    /// Key column.
    pub column: String,
    /// Partition scheme the index is placed on, if any.
    pub scheme: Option<String>,
    pub is_primary_key: bool,
}

/// A table entry from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub name: TableName,
    pub clustered_index: Option<IndexInfo>,
}

impl TableInfo {
    pub fn has_clustered_index(&self) -> bool {
        self.clustered_index.is_some()
    }
}

/// A RANGE RIGHT partition function definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionFunctionDef {
    pub name: String,
    pub boundaries: Vec<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSchemeDef {
    pub name: String,
    pub function: String,
    /// Storage location every partition maps to.
    pub placement: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum RecoveryModel {
    Simple,
    #[default]
    Full,
    BulkLogged,
}

impl fmt::Display for RecoveryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryModel::Simple => f.write_str("SIMPLE"),
            RecoveryModel::Full => f.write_str("FULL"),
            RecoveryModel::BulkLogged => f.write_str("BULK_LOGGED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseState {
    Online,
    Restoring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub state: DatabaseState,
    pub recovery_model: RecoveryModel,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backup / restore
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupKind {
    Full,
    Log,
}

/// Header of one backup medium, as read back from the backup subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHeader {
    /// Where the backup lives; passed back to the restore calls.
    pub source: String,
    pub database: String,
    pub kind: BackupKind,
    pub first_lsn: u64,
    pub last_lsn: u64,
    pub checkpoint_lsn: u64,
}

/// Lifecycle points at which a full backup may be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "snake_case")]
pub enum Checkpoint {
    PostRestore,
    PostPartitionBuild,
    PostIndexBuild,
    /// Pre-purge backup holding every year.
    Baseline,
    /// Post-purge backup holding only the retained years.
    Retained,
}

impl Checkpoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Checkpoint::PostRestore => "post_restore",
            Checkpoint::PostPartitionBuild => "post_partition_build",
            Checkpoint::PostIndexBuild => "post_index_build",
            Checkpoint::Baseline => "baseline",
            Checkpoint::Retained => "retained",
        }
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupRequest {
    pub database: String,
    pub checkpoint: Checkpoint,
    /// Free-form label the backup subsystem may use when naming the medium
    /// (e.g. the retained years).
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupOutcome {
    pub location: String,
    pub size_bytes: Option<u64>,
}

/// Relocation of one logical data file during a full restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DataFileTarget {
    pub logical_name: String,
    pub path: String,
}

/// Whether a restore brings the database online or leaves it waiting for more logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    Recovery,
    NoRecovery,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreProgress {
    pub source: String,
    pub percent_complete: f64,
}

pub type ProgressCallback = Arc<dyn Fn(RestoreProgress) + Send + Sync>;
