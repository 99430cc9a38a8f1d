//! Checkpoint backups and restores.
//!
//! A restore from a backup location picks the most recent full backup (highest
//! checkpoint LSN) and replays every later log backup in LSN order. Every medium but
//! the last is restored without recovery so the database keeps accepting logs.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::{
    config::BackupConfig,
    engine::{
        BackupGateway, BackupHeader, BackupKind, BackupOutcome, BackupRequest, Checkpoint,
        EngineGateway, ProgressCallback, RecoveryMode, RestoreProgress,
    },
    error::{RetentionError, RetentionResult},
    observability::metrics,
};

/// The backups to restore, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreChain {
    pub full: BackupHeader,
    pub logs: Vec<BackupHeader>,
}

impl RestoreChain {
    /// Build the chain from every header found at a backup location.
    pub fn select(headers: &[BackupHeader]) -> RetentionResult<Self> {
        let full = headers
            .iter()
            .filter(|h| h.kind == BackupKind::Full)
            .max_by_key(|h| h.checkpoint_lsn)
            .cloned()
            .ok_or_else(|| {
                RetentionError::StructuralPrecondition("no full backup found".into())
            })?;

        let mut logs: Vec<BackupHeader> = headers
            .iter()
            .filter(|h| h.kind == BackupKind::Log && h.last_lsn > full.checkpoint_lsn)
            .cloned()
            .collect();
        logs.sort_by_key(|h| h.first_lsn);

        Ok(Self { full, logs })
    }

    /// Recovery mode for the full backup.
    pub fn full_recovery(&self) -> RecoveryMode {
        if self.logs.is_empty() {
            RecoveryMode::Recovery
        } else {
            RecoveryMode::NoRecovery
        }
    }

    /// Recovery mode for the log at `index`.
    pub fn log_recovery(&self, index: usize) -> RecoveryMode {
        if index + 1 == self.logs.len() {
            RecoveryMode::Recovery
        } else {
            RecoveryMode::NoRecovery
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreReport {
    pub full: String,
    pub logs: Vec<String>,
    pub connections_terminated: bool,
}

/// Takes checkpoint backups and restores the database.
pub struct BackupCoordinator {
    engine: Arc<dyn EngineGateway>,
    backups: Arc<dyn BackupGateway>,
    database: String,
    config: BackupConfig,
}

impl BackupCoordinator {
    pub fn new(
        engine: Arc<dyn EngineGateway>,
        backups: Arc<dyn BackupGateway>,
        database: impl Into<String>,
        config: BackupConfig,
    ) -> Self {
        Self {
            engine,
            backups,
            database: database.into(),
            config,
        }
    }

    /// Take a full backup at `checkpoint`.
    pub async fn checkpoint(
        &self,
        checkpoint: Checkpoint,
        label: impl Into<String>,
    ) -> RetentionResult<BackupOutcome> {
        let request = BackupRequest {
            database: self.database.clone(),
            checkpoint,
            label: label.into(),
        };
        let outcome = self.backups.full_backup(&request).await?;

        metrics::record_backup(checkpoint.as_str());
        tracing::info!(
            database = %self.database,
            checkpoint = %checkpoint,
            label = %request.label,
            location = %outcome.location,
            size_bytes = outcome.size_bytes,
            "Backup taken"
        );
        Ok(outcome)
    }

    /// Restore the newest full backup at `location` and every log after it.
    pub async fn restore_chain(&self, location: &str) -> RetentionResult<RestoreReport> {
        let headers = self.backups.read_headers(location).await?;
        let chain = RestoreChain::select(&headers)?;
        tracing::info!(
            location,
            full = %chain.full.source,
            logs = chain.logs.len(),
            "Restoring backup chain"
        );

        let connections_terminated = self.prepare().await?;
        let progress = self.progress_logger();

        self.backups
            .restore_full(
                &chain.full.source,
                &self.config.data_files,
                chain.full_recovery(),
                &progress,
            )
            .await?;
        for (index, log) in chain.logs.iter().enumerate() {
            tracing::info!(source = %log.source, first_lsn = log.first_lsn, "Restoring log backup");
            self.backups
                .restore_log(&log.source, chain.log_recovery(index))
                .await?;
        }

        tracing::info!(database = %self.database, "Restore complete");
        Ok(RestoreReport {
            full: chain.full.source,
            logs: chain.logs.into_iter().map(|l| l.source).collect(),
            connections_terminated,
        })
    }

    /// Restore a single full backup and bring the database online.
    pub async fn restore_full(&self, source: &str) -> RetentionResult<RestoreReport> {
        tracing::info!(source, "Restoring full backup");
        let connections_terminated = self.prepare().await?;
        let progress = self.progress_logger();

        self.backups
            .restore_full(
                source,
                &self.config.data_files,
                RecoveryMode::Recovery,
                &progress,
            )
            .await?;

        tracing::info!(database = %self.database, "Restore complete");
        Ok(RestoreReport {
            full: source.to_string(),
            logs: Vec::new(),
            connections_terminated,
        })
    }

    /// Disconnect other sessions from an existing database when configured.
    async fn prepare(&self) -> RetentionResult<bool> {
        if !self.config.terminate_connections || self.engine.database_info().await?.is_none() {
            return Ok(false);
        }
        self.engine.terminate_connections().await?;
        tracing::debug!(database = %self.database, "Terminated existing connections");
        Ok(true)
    }

    /// Log restore progress each time it crosses a multiple of the configured interval.
    fn progress_logger(&self) -> ProgressCallback {
        let interval = f64::from(self.config.progress_interval_percent.max(1));
        let last_step = Mutex::new(None::<u32>);

        Arc::new(move |progress: RestoreProgress| {
            let step = (progress.percent_complete / interval).floor() as u32;
            let mut last = last_step.lock();
            if last.is_some_and(|l| l >= step) {
                return;
            }
            *last = Some(step);
            tracing::info!(
                source = %progress.source,
                percent = progress.percent_complete,
                "Restore progress"
            );
        })
    }
}
