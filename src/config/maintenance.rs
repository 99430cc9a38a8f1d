use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::engine::RecoveryModel;

/// Maintenance settings around the purge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct MaintenanceConfig {
    /// Free space, in percent, left behind by the post-purge shrink.
    /// Default: 10
    #[serde(default = "default_shrink_target_free_percent")]
    pub shrink_target_free_percent: u8,

    /// Rebuild only indexes more fragmented than this (percent).
    /// Default: 0.0 (always rebuild)
    #[serde(default)]
    pub rebuild_fragmentation_threshold: f64,

    /// Recovery model while structural work runs.
    #[serde(default = "default_working_recovery_model")]
    pub working_recovery_model: RecoveryModel,

    /// Recovery model restored before the final backup.
    #[serde(default)]
    pub final_recovery_model: RecoveryModel,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            shrink_target_free_percent: default_shrink_target_free_percent(),
            rebuild_fragmentation_threshold: 0.0,
            working_recovery_model: default_working_recovery_model(),
            final_recovery_model: RecoveryModel::Full,
        }
    }
}

fn default_shrink_target_free_percent() -> u8 {
    10
}

fn default_working_recovery_model() -> RecoveryModel {
    RecoveryModel::Simple
}

impl MaintenanceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shrink_target_free_percent > 100 {
            return Err(ConfigError::Validation(format!(
                "maintenance.shrink_target_free_percent must be at most 100, got {}",
                self.shrink_target_free_percent
            )));
        }
        if !(0.0..=100.0).contains(&self.rebuild_fragmentation_threshold) {
            return Err(ConfigError::Validation(
                "maintenance.rebuild_fragmentation_threshold must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}
