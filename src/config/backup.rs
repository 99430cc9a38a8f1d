//! Backup checkpoints and restore sources.
//!
//! # Example
//!
//! ```toml
//! [backup]
//! checkpoints = ["post_restore", "baseline", "retained"]
//! source_location = "/var/backups/telemetry"
//! progress_interval_percent = 10
//!
//! [[backup.data_files]]
//! logical_name = "telemetry"
//! path = "/var/opt/data/telemetry.mdf"
//!
//! [[backup.data_files]]
//! logical_name = "telemetry_log"
//! path = "/var/opt/data/telemetry_log.ldf"
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::engine::{Checkpoint, DataFileTarget};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    /// Lifecycle points at which a full backup is taken.
    /// Default: baseline and retained
    #[serde(default = "default_checkpoints")]
    pub checkpoints: Vec<Checkpoint>,

    /// Location scanned for the full + log chain restored at the start of a
    /// from-scratch run. No restore happens when unset.
    #[serde(default)]
    pub source_location: Option<String>,

    /// Baseline full backup a from-baseline run starts from.
    #[serde(default)]
    pub baseline_source: Option<String>,

    /// Where each logical data file is placed on restore.
    #[serde(default)]
    pub data_files: Vec<DataFileTarget>,

    /// Restore progress is logged every this many percent.
    /// Default: 10
    #[serde(default = "default_progress_interval_percent")]
    pub progress_interval_percent: u8,

    /// Disconnect other sessions before restoring over an existing database.
    /// Default: true
    #[serde(default = "default_true")]
    pub terminate_connections: bool,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            checkpoints: default_checkpoints(),
            source_location: None,
            baseline_source: None,
            data_files: Vec::new(),
            progress_interval_percent: default_progress_interval_percent(),
            terminate_connections: true,
        }
    }
}

fn default_checkpoints() -> Vec<Checkpoint> {
    vec![Checkpoint::Baseline, Checkpoint::Retained]
}

fn default_progress_interval_percent() -> u8 {
    10
}

fn default_true() -> bool {
    true
}

impl BackupConfig {
    pub fn is_enabled(&self, checkpoint: Checkpoint) -> bool {
        self.checkpoints.contains(&checkpoint)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.progress_interval_percent) {
            return Err(ConfigError::Validation(format!(
                "backup.progress_interval_percent must be between 1 and 100, got {}",
                self.progress_interval_percent
            )));
        }
        for (i, checkpoint) in self.checkpoints.iter().enumerate() {
            if self.checkpoints[..i].contains(checkpoint) {
                return Err(ConfigError::Validation(format!(
                    "backup checkpoint '{checkpoint}' is listed twice"
                )));
            }
        }
        for target in &self.data_files {
            if target.logical_name.trim().is_empty() || target.path.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "backup.data_files entries need a logical_name and a path".into(),
                ));
            }
        }
        if matches!(&self.source_location, Some(s) if s.trim().is_empty())
            || matches!(&self.baseline_source, Some(s) if s.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "backup sources cannot be empty strings".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_checkpoints() {
        let config = BackupConfig::default();
        assert!(config.is_enabled(Checkpoint::Baseline));
        assert!(config.is_enabled(Checkpoint::Retained));
        assert!(!config.is_enabled(Checkpoint::PostRestore));
    }

    #[test]
    fn test_parse_checkpoints_and_data_files() {
        let config: BackupConfig = toml::from_str(
            r#"
            checkpoints = ["post_restore", "post_index_build"]
            source_location = "/backups"

            [[data_files]]
            logical_name = "db"
            path = "/data/db.mdf"
        "#,
        )
        .unwrap();

        assert_eq!(
            config.checkpoints,
            vec![Checkpoint::PostRestore, Checkpoint::PostIndexBuild]
        );
        assert_eq!(config.data_files.len(), 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_checkpoint_rejected() {
        let config = BackupConfig {
            checkpoints: vec![Checkpoint::Baseline, Checkpoint::Baseline],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_progress_interval_rejected() {
        let config = BackupConfig {
            progress_interval_percent: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
