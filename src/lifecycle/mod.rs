//! The retention lifecycle.
//!
//! A run is a fixed sequence of steps executed one after another. There are no
//! retries: the first failing step ends the run with a [`LifecycleError`] naming the
//! step and carrying the report accumulated so far. Steps whose inputs are not
//! configured are recorded as skipped.
//!
//! Index and staging passes work table by table. A table that fails in one of them
//! does not fail the step; it is listed in the step's note and in its pass report, and
//! it surfaces again as a failed table in the purge.

mod report;

use std::{sync::Arc, time::Instant};

use chrono::Utc;
use tracing::Instrument;

pub use report::{
    CheckpointRecord, LifecycleError, LifecycleMode, LifecycleReport, LifecycleStep,
    PlannedStep, StepRecord, StepStatus,
};

use crate::{
    backup::BackupCoordinator,
    config::{ConfigError, PartkeeperConfig},
    engine::{BackupGateway, Checkpoint, EngineGateway, RecoveryModel},
    error::{RetentionError, RetentionResult, TableFailure},
    observability::metrics,
    purge::PurgeEngine,
    resolver::{ManagedTable, TableGroupResolver},
    staging::StagingProvisioner,
    topology::{RetentionBoundarySet, TopologyManager},
};

/// Runs the retention lifecycle against one database.
pub struct LifecycleCoordinator {
    config: PartkeeperConfig,
    boundaries: RetentionBoundarySet,
    engine: Arc<dyn EngineGateway>,
    resolver: TableGroupResolver,
    topology: TopologyManager,
    staging: StagingProvisioner,
    purge: PurgeEngine,
    backups: BackupCoordinator,
}

impl LifecycleCoordinator {
    pub fn new(
        config: PartkeeperConfig,
        engine: Arc<dyn EngineGateway>,
        backups: Arc<dyn BackupGateway>,
    ) -> RetentionResult<Self> {
        config.validate()?;
        let boundaries = RetentionBoundarySet::from_years(&config.partitioning.boundary_years)?;
        let schema = config.database.schema.clone();

        Ok(Self {
            resolver: TableGroupResolver::new(
                engine.clone(),
                schema.clone(),
                config.tables.clone(),
                config.partitioning.scheme_name.clone(),
            ),
            topology: TopologyManager::new(engine.clone(), schema, config.partitioning.clone()),
            staging: StagingProvisioner::new(
                engine.clone(),
                config.tables.clone(),
                config.partitioning.clone(),
            ),
            purge: PurgeEngine::new(
                engine.clone(),
                config.tables.clone(),
                config.partitioning.clone(),
                config.purge.clone(),
                boundaries.clone(),
            ),
            backups: BackupCoordinator::new(
                engine.clone(),
                backups,
                config.database.name.clone(),
                config.backup.clone(),
            ),
            engine,
            boundaries,
            config,
        })
    }

    pub fn topology(&self) -> &TopologyManager {
        &self.topology
    }

    pub fn boundaries(&self) -> &RetentionBoundarySet {
        &self.boundaries
    }

    /// The steps a run in `mode` would execute, with the reason for each skip.
    pub fn plan(&self, mode: LifecycleMode) -> Vec<PlannedStep> {
        use LifecycleStep::*;

        let steps: &[LifecycleStep] = match mode {
            LifecycleMode::FromScratch => &[
                Restore,
                Backup(Checkpoint::PostRestore),
                WorkingRecoveryModel,
                DropIndexes,
                RebuildTopology,
                Backup(Checkpoint::PostPartitionBuild),
                BuildIndexes,
                Backup(Checkpoint::PostIndexBuild),
                ProvisionStaging,
                Backup(Checkpoint::Baseline),
                Purge,
                Shrink,
                RebuildIndexes,
                FinalRecoveryModel,
                Backup(Checkpoint::Retained),
            ],
            LifecycleMode::FromBaseline => &[
                Restore,
                WorkingRecoveryModel,
                ProvisionStaging,
                Purge,
                Shrink,
                RebuildIndexes,
                FinalRecoveryModel,
                Backup(Checkpoint::Retained),
            ],
        };

        steps
            .iter()
            .map(|&step| PlannedStep {
                step,
                skip_reason: self.skip_reason(mode, step),
            })
            .collect()
    }

    fn skip_reason(&self, mode: LifecycleMode, step: LifecycleStep) -> Option<String> {
        match step {
            LifecycleStep::Restore
                if mode == LifecycleMode::FromScratch
                    && self.config.backup.source_location.is_none() =>
            {
                Some("no backup.source_location configured".into())
            }
            LifecycleStep::Backup(checkpoint) if !self.config.backup.is_enabled(checkpoint) => {
                Some(format!("checkpoint {checkpoint} is not enabled"))
            }
            LifecycleStep::Purge if self.config.partitioning.purge_years().is_empty() => {
                Some("every boundary year is retained".into())
            }
            _ => None,
        }
    }

    /// Run the lifecycle to completion or to its first failing step.
    ///
    /// Takes `&mut self` so that one coordinator never runs two lifecycles at once.
    pub async fn run(&mut self, mode: LifecycleMode) -> Result<LifecycleReport, LifecycleError> {
        let mut report = LifecycleReport::new(&self.config.database.name, mode);
        let span = tracing::info_span!(
            "lifecycle",
            run_id = %report.run_id,
            database = %report.database,
            mode = ?mode,
        );

        let outcome = self.execute(mode, &mut report).instrument(span.clone()).await;
        report.finished_at = Some(Utc::now());

        let _guard = span.enter();
        match outcome {
            Ok(()) => {
                tracing::info!(
                    steps = report.steps.len(),
                    rows_purged = report.rows_purged(),
                    failed_tables = report.failed_purge_tables().len(),
                    "Lifecycle complete"
                );
                Ok(report)
            }
            Err((step, source)) => {
                tracing::error!(step = %step, error = %source, "Lifecycle aborted");
                Err(LifecycleError {
                    step,
                    source,
                    report: Box::new(report),
                })
            }
        }
    }

    async fn execute(
        &self,
        mode: LifecycleMode,
        report: &mut LifecycleReport,
    ) -> Result<(), (LifecycleStep, RetentionError)> {
        for planned in self.plan(mode) {
            let step = planned.step;
            if let Some(reason) = &planned.skip_reason {
                tracing::info!(step = %step, reason = %reason, "Lifecycle step skipped");
                metrics::record_lifecycle_step(step.name(), "skipped");
                report.steps.push(StepRecord::skipped(step, reason));
                continue;
            }

            tracing::info!(step = %step, "Lifecycle step started");
            let started = Instant::now();
            let result = self.execute_step(mode, step, report).await;
            let elapsed = started.elapsed();

            match result {
                Ok(note) => {
                    tracing::info!(step = %step, duration_ms = elapsed.as_millis() as u64, "Lifecycle step completed");
                    metrics::record_lifecycle_step(step.name(), "completed");
                    let mut record = StepRecord::completed(step, elapsed);
                    record.note = note;
                    report.steps.push(record);
                }
                Err(e) => {
                    metrics::record_lifecycle_step(step.name(), "failed");
                    report.steps.push(StepRecord::failed(step, elapsed, &e));
                    return Err((step, e));
                }
            }
        }
        Ok(())
    }

    async fn execute_step(
        &self,
        mode: LifecycleMode,
        step: LifecycleStep,
        report: &mut LifecycleReport,
    ) -> RetentionResult<Option<String>> {
        let maintenance = &self.config.maintenance;
        match step {
            LifecycleStep::Restore => {
                self.restore(mode, report).await?;
                Ok(None)
            }
            LifecycleStep::WorkingRecoveryModel => {
                self.set_recovery_model(maintenance.working_recovery_model)
                    .await?;
                Ok(None)
            }
            LifecycleStep::DropIndexes => {
                let tables = self.resolve(report).await?;
                let dropped = self.topology.drop_clustered_indexes(&tables).await?;
                let note = failure_note(&dropped.failed);
                report.dropped_indexes = Some(dropped);
                Ok(note)
            }
            LifecycleStep::RebuildTopology => {
                report.topology = Some(self.topology.rebuild_topology(&self.boundaries).await?);
                Ok(None)
            }
            LifecycleStep::BuildIndexes => {
                let tables = self.resolve(report).await?;
                let created = self.topology.ensure_partitioned_indexes(&tables).await?;
                let note = failure_note(&created.failed);
                report.created_indexes = Some(created);
                Ok(note)
            }
            LifecycleStep::ProvisionStaging => {
                let tables = self.resolve(report).await?;
                let staging = self.staging.provision(&tables).await?;
                let note = failure_note(&staging.failed);
                report.staging = Some(staging);
                Ok(note)
            }
            LifecycleStep::Backup(checkpoint) => {
                let outcome = self
                    .backups
                    .checkpoint(checkpoint, self.backup_label(checkpoint))
                    .await?;
                report
                    .backups
                    .push(CheckpointRecord::new(checkpoint, outcome));
                Ok(None)
            }
            LifecycleStep::Purge => {
                let tables = self.resolve(report).await?;
                let years = self.config.partitioning.purge_years();
                self.purge
                    .purge_years(&years, &tables, &mut report.purges)
                    .await?;
                let failed = report.failed_purge_tables();
                Ok((!failed.is_empty())
                    .then(|| format!("partial purge, failed tables: {}", failed.join(", "))))
            }
            LifecycleStep::Shrink => {
                self.engine
                    .shrink_database(maintenance.shrink_target_free_percent)
                    .await?;
                tracing::info!(
                    target_free_percent = maintenance.shrink_target_free_percent,
                    "Database shrunk"
                );
                Ok(None)
            }
            LifecycleStep::RebuildIndexes => {
                let tables = self.resolve(report).await?;
                let rebuilt = self
                    .topology
                    .rebuild_indexes(&tables, maintenance.rebuild_fragmentation_threshold)
                    .await?;
                let note = failure_note(&rebuilt.failed);
                report.rebuilt_indexes = Some(rebuilt);
                Ok(note)
            }
            LifecycleStep::FinalRecoveryModel => {
                self.set_recovery_model(maintenance.final_recovery_model)
                    .await?;
                Ok(None)
            }
        }
    }

    async fn restore(
        &self,
        mode: LifecycleMode,
        report: &mut LifecycleReport,
    ) -> RetentionResult<()> {
        let restored = match mode {
            LifecycleMode::FromScratch => {
                let Some(location) = &self.config.backup.source_location else {
                    return Ok(());
                };
                self.backups.restore_chain(location).await?
            }
            LifecycleMode::FromBaseline => {
                let source = self.config.backup.baseline_source.as_ref().ok_or_else(|| {
                    RetentionError::Configuration(ConfigError::Validation(
                        "backup.baseline_source is required to start from a baseline".into(),
                    ))
                })?;
                self.backups.restore_full(source).await?
            }
        };
        report.restore = Some(restored);
        Ok(())
    }

    async fn set_recovery_model(&self, model: RecoveryModel) -> RetentionResult<()> {
        self.engine.set_recovery_model(model).await?;
        tracing::info!(recovery_model = %model, "Recovery model set");
        Ok(())
    }

    /// Re-read the catalog so each structural step sees the tables as they are now.
    async fn resolve(&self, report: &mut LifecycleReport) -> RetentionResult<Vec<ManagedTable>> {
        let resolution = self.resolver.resolve().await?;
        if resolution.tables.is_empty() {
            tracing::warn!(schema = %self.config.database.schema, "No managed tables found");
        }
        report.managed_tables = resolution.tables.clone();
        report.missing_tables = resolution.missing;
        Ok(resolution.tables)
    }

    fn backup_label(&self, checkpoint: Checkpoint) -> String {
        let join = |years: &[i32]| {
            years
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join("_")
        };
        match checkpoint {
            Checkpoint::Baseline => join(self.boundaries.years()),
            Checkpoint::Retained => join(&self.config.partitioning.retained_years),
            other => other.as_str().to_string(),
        }
    }
}

fn failure_note(failed: &[TableFailure]) -> Option<String> {
    if failed.is_empty() {
        return None;
    }
    let tables: Vec<&str> = failed.iter().map(|f| f.table.as_str()).collect();
    Some(format!("failed tables: {}", tables.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DatabaseConfig, PartitioningConfig};
    use crate::engine::memory::MemoryEngine;

    fn config() -> PartkeeperConfig {
        PartkeeperConfig::new(
            DatabaseConfig::new("db"),
            PartitioningConfig::new(vec![2022, 2023, 2024], vec![2024]),
        )
    }

    fn coordinator(config: PartkeeperConfig) -> LifecycleCoordinator {
        let engine = Arc::new(MemoryEngine::new("db"));
        LifecycleCoordinator::new(config, engine.clone(), engine).unwrap()
    }

    fn skipped(plan: &[PlannedStep]) -> Vec<LifecycleStep> {
        plan.iter()
            .filter(|p| p.skip_reason.is_some())
            .map(|p| p.step)
            .collect()
    }

    #[test]
    fn test_from_scratch_plan_order() {
        let plan = coordinator(config()).plan(LifecycleMode::FromScratch);
        let steps: Vec<String> = plan.iter().map(|p| p.step.to_string()).collect();
        assert_eq!(
            steps,
            [
                "restore",
                "backup(post_restore)",
                "working_recovery_model",
                "drop_indexes",
                "rebuild_topology",
                "backup(post_partition_build)",
                "build_indexes",
                "backup(post_index_build)",
                "provision_staging",
                "backup(baseline)",
                "purge",
                "shrink",
                "rebuild_indexes",
                "final_recovery_model",
                "backup(retained)",
            ]
        );
    }

    #[test]
    fn test_default_plan_skips_restore_and_intermediate_checkpoints() {
        let plan = coordinator(config()).plan(LifecycleMode::FromScratch);
        assert_eq!(
            skipped(&plan),
            [
                LifecycleStep::Restore,
                LifecycleStep::Backup(Checkpoint::PostRestore),
                LifecycleStep::Backup(Checkpoint::PostPartitionBuild),
                LifecycleStep::Backup(Checkpoint::PostIndexBuild),
            ]
        );
    }

    #[test]
    fn test_from_baseline_never_skips_restore() {
        let plan = coordinator(config()).plan(LifecycleMode::FromBaseline);
        assert_eq!(plan[0].step, LifecycleStep::Restore);
        assert!(plan[0].skip_reason.is_none());
        assert!(!plan.iter().any(|p| p.step == LifecycleStep::RebuildTopology));
    }

    #[test]
    fn test_purge_skipped_when_everything_retained() {
        let mut config = config();
        config.partitioning.retained_years = vec![2022, 2023, 2024];
        let plan = coordinator(config).plan(LifecycleMode::FromScratch);
        assert!(skipped(&plan).contains(&LifecycleStep::Purge));
    }

    #[test]
    fn test_backup_labels() {
        let mut config = config();
        config.partitioning.retained_years = vec![2023, 2024];
        let coordinator = coordinator(config);
        assert_eq!(
            coordinator.backup_label(Checkpoint::Baseline),
            "2022_2023_2024"
        );
        assert_eq!(coordinator.backup_label(Checkpoint::Retained), "2023_2024");
        assert_eq!(
            coordinator.backup_label(Checkpoint::PostRestore),
            "post_restore"
        );
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.partitioning.retained_years = vec![2019];
        let engine = Arc::new(MemoryEngine::new("db"));
        let err = LifecycleCoordinator::new(config, engine.clone(), engine)
            .err()
            .unwrap();
        assert!(matches!(err, RetentionError::Configuration(_)));
    }

    #[test]
    fn test_out_of_range_boundary_year_is_configuration_error() {
        let mut config = config();
        config.partitioning.boundary_years = vec![2022, 300000];
        config.partitioning.retained_years = vec![2022];
        let engine = Arc::new(MemoryEngine::new("db"));
        let err = LifecycleCoordinator::new(config, engine.clone(), engine)
            .err()
            .unwrap();
        assert!(matches!(err, RetentionError::Configuration(_)));
        assert!(err.to_string().contains("300000"));
    }

    #[test]
    fn test_failure_note_lists_tables() {
        let failed = vec![
            TableFailure::new("a", &RetentionError::StructuralPrecondition("x".into())),
            TableFailure::new("b", &RetentionError::StructuralPrecondition("y".into())),
        ];
        assert_eq!(failure_note(&failed).unwrap(), "failed tables: a, b");
        assert!(failure_note(&[]).is_none());
    }
}
