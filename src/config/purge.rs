use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Purge execution settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PurgeConfig {
    /// Tables switched out at the same time.
    /// Default: 1
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Count what would be switched out without switching.
    #[serde(default)]
    pub dry_run: bool,

    /// Fail the run when any table could not be purged.
    #[serde(default)]
    pub fail_on_partial: bool,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            dry_run: false,
            fail_on_partial: false,
        }
    }
}

fn default_concurrency() -> usize {
    1
}

impl PurgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(
                "purge.concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
