use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    backup::RestoreReport,
    engine::{BackupOutcome, Checkpoint},
    error::{RecordedFailure, RetentionError},
    purge::PurgeReport,
    resolver::ManagedTable,
    staging::StagingReport,
    topology::{IndexReport, TopologyReport},
};

/// Which lifecycle to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleMode {
    /// Restore, partition, index, stage, back up, purge, maintain, back up.
    FromScratch,
    /// Start from an already partitioned baseline backup.
    FromBaseline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStep {
    Restore,
    WorkingRecoveryModel,
    DropIndexes,
    RebuildTopology,
    BuildIndexes,
    ProvisionStaging,
    Backup(Checkpoint),
    Purge,
    Shrink,
    RebuildIndexes,
    FinalRecoveryModel,
}

impl LifecycleStep {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleStep::Restore => "restore",
            LifecycleStep::WorkingRecoveryModel => "working_recovery_model",
            LifecycleStep::DropIndexes => "drop_indexes",
            LifecycleStep::RebuildTopology => "rebuild_topology",
            LifecycleStep::BuildIndexes => "build_indexes",
            LifecycleStep::ProvisionStaging => "provision_staging",
            LifecycleStep::Backup(_) => "backup",
            LifecycleStep::Purge => "purge",
            LifecycleStep::Shrink => "shrink",
            LifecycleStep::RebuildIndexes => "rebuild_indexes",
            LifecycleStep::FinalRecoveryModel => "final_recovery_model",
        }
    }
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleStep::Backup(checkpoint) => write!(f, "backup({checkpoint})"),
            step => f.write_str(step.name()),
        }
    }
}

/// A step as planned before the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub step: LifecycleStep,
    /// Why the step will not run, if it will not.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub step: LifecycleStep,
    pub status: StepStatus,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RecordedFailure>,
}

impl StepRecord {
    pub(super) fn completed(step: LifecycleStep, elapsed: Duration) -> Self {
        Self {
            step,
            status: StepStatus::Completed,
            duration_ms: elapsed.as_millis() as u64,
            note: None,
            error: None,
        }
    }

    pub(super) fn skipped(step: LifecycleStep, reason: &str) -> Self {
        Self {
            step,
            status: StepStatus::Skipped,
            duration_ms: 0,
            note: Some(reason.to_string()),
            error: None,
        }
    }

    pub(super) fn failed(step: LifecycleStep, elapsed: Duration, err: &RetentionError) -> Self {
        Self {
            step,
            status: StepStatus::Failed,
            duration_ms: elapsed.as_millis() as u64,
            note: None,
            error: Some(err.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckpointRecord {
    pub checkpoint: Checkpoint,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

impl CheckpointRecord {
    pub(super) fn new(checkpoint: Checkpoint, outcome: BackupOutcome) -> Self {
        Self {
            checkpoint,
            location: outcome.location,
            size_bytes: outcome.size_bytes,
        }
    }
}

/// Everything a lifecycle run did, in the order it happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleReport {
    pub run_id: Uuid,
    pub database: String,
    pub mode: LifecycleMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepRecord>,
    /// Managed tables as last resolved.
    pub managed_tables: Vec<ManagedTable>,
    pub missing_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restore: Option<RestoreReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dropped_indexes: Option<IndexReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topology: Option<TopologyReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_indexes: Option<IndexReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staging: Option<StagingReport>,
    pub purges: Vec<PurgeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rebuilt_indexes: Option<IndexReport>,
    pub backups: Vec<CheckpointRecord>,
}

impl LifecycleReport {
    pub(super) fn new(database: &str, mode: LifecycleMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            database: database.to_string(),
            mode,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
            managed_tables: Vec::new(),
            missing_tables: Vec::new(),
            restore: None,
            dropped_indexes: None,
            topology: None,
            created_indexes: None,
            staging: None,
            purges: Vec::new(),
            rebuilt_indexes: None,
            backups: Vec::new(),
        }
    }

    pub fn step(&self, step: LifecycleStep) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.step == step)
    }

    pub fn rows_purged(&self) -> u64 {
        self.purges.iter().map(PurgeReport::rows_purged).sum()
    }

    /// Tables that failed in any purge, in first-failure order.
    pub fn failed_purge_tables(&self) -> Vec<String> {
        let mut failed: Vec<String> = Vec::new();
        for table in self.purges.iter().flat_map(PurgeReport::failed_tables) {
            if !failed.contains(&table) {
                failed.push(table);
            }
        }
        failed
    }
}

/// A lifecycle run that stopped at a failing step.
#[derive(Debug, Error)]
#[error("Lifecycle step {step} failed: {source}")]
pub struct LifecycleError {
    pub step: LifecycleStep,
    #[source]
    pub source: RetentionError,
    /// Everything done before the failure.
    pub report: Box<LifecycleReport>,
}
