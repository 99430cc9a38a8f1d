//! Configuration module for partkeeper.
//!
//! Partkeeper is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [database]
//! name = "telemetry"
//!
//! [partitioning]
//! boundary_years = [2022, 2023, 2024, 2025, 2026]
//! retained_years = [2025]
//!
//! [backup]
//! source_location = "${BACKUP_ROOT}/telemetry"
//! ```

mod backup;
mod database;
mod maintenance;
mod observability;
mod partitioning;
mod purge;
mod tables;

use std::path::Path;

pub use backup::*;
pub use database::*;
pub use maintenance::*;
pub use observability::*;
pub use partitioning::*;
pub use purge::*;
use serde::{Deserialize, Serialize};
pub use tables::*;

/// Configuration written by `partkeeper init`.
pub const EXAMPLE_CONFIG: &str = r#"# partkeeper configuration

[database]
name = "telemetry"
schema = "dbo"

[partitioning]
# January 1st of every listed year starts a partition.
boundary_years = [2022, 2023, 2024, 2025, 2026]
# Every other boundary year is switched out and truncated.
retained_years = [2025]
function_name = "PF_LOGTIME_YEARLY"
scheme_name = "PS_LOGTIME_YEARLY"
timestamp_column = "logtime"
placement = "PRIMARY"

[tables]
marker_prefix = "main_"
staging_prefix = "temp_"

[maintenance]
shrink_target_free_percent = 10
rebuild_fragmentation_threshold = 0.0
working_recovery_model = "simple"
final_recovery_model = "full"

[purge]
concurrency = 1
dry_run = false
fail_on_partial = false

[backup]
checkpoints = ["baseline", "retained"]
# source_location = "${BACKUP_ROOT}/telemetry"
progress_interval_percent = 10
terminate_connections = true

[observability.logging]
level = "info"
format = "compact"
"#;

/// Root configuration.
///
/// `[database]` and `[partitioning]` are required; every other section has
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PartkeeperConfig {
    /// The managed database.
    pub database: DatabaseConfig,

    /// Partition boundaries and retained years.
    pub partitioning: PartitioningConfig,

    /// Table discovery and staging naming.
    #[serde(default)]
    pub tables: TablesConfig,

    /// Shrink, index rebuild and recovery model settings.
    #[serde(default)]
    pub maintenance: MaintenanceConfig,

    /// Purge execution settings.
    #[serde(default)]
    pub purge: PurgeConfig,

    /// Backup checkpoints and restore sources.
    #[serde(default)]
    pub backup: BackupConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl PartkeeperConfig {
    /// A configuration with defaults for every optional section.
    pub fn new(database: DatabaseConfig, partitioning: PartitioningConfig) -> Self {
        Self {
            database,
            partitioning,
            tables: TablesConfig::default(),
            maintenance: MaintenanceConfig::default(),
            purge: PurgeConfig::default(),
            backup: BackupConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }

    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;
        let config: PartkeeperConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.partitioning.validate()?;
        self.tables.validate()?;
        self.maintenance.validate()?;
        self.purge.validate()?;
        self.backup.validate()?;
        Ok(())
    }

    /// Generate the JSON schema for the configuration.
    #[cfg(feature = "json-schema")]
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(PartkeeperConfig)
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Variables after a `#` on the same line are left alone.
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| ConfigError::Validation(format!("invalid variable pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');
        let mut last_end = 0;

        for cap in re.captures_iter(line) {
            let (Some(whole), Some(name)) = (cap.get(0), cap.get(1)) else {
                continue;
            };
            if comment_pos.is_some_and(|pos| whole.start() >= pos) {
                continue;
            }

            result.push_str(&line[last_end..whole.start()]);
            let value = std::env::var(name.as_str())
                .map_err(|_| ConfigError::EnvVarNotFound(name.as_str().to_string()))?;
            result.push_str(&value);
            last_end = whole.end();
        }

        result.push_str(&line[last_end..]);
        result.push('\n');
    }

    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const MINIMAL: &str = r#"
        [database]
        name = "telemetry"

        [partitioning]
        boundary_years = [2022, 2023, 2024]
        retained_years = [2024]
    "#;

    #[test]
    fn test_minimal_config() {
        let config = PartkeeperConfig::from_str(MINIMAL).unwrap();

        assert_eq!(config.database.schema, "dbo");
        assert_eq!(config.tables.marker_prefix, "main_");
        assert_eq!(config.purge.concurrency, 1);
        assert_eq!(config.partitioning.purge_years(), vec![2022, 2023]);
    }

    #[test]
    fn test_example_config_parses() {
        temp_env::with_var("BACKUP_ROOT", None::<&str>, || {
            let config = PartkeeperConfig::from_str(EXAMPLE_CONFIG).unwrap();
            assert_eq!(config.partitioning.retained_years, vec![2025]);
            assert!(config.backup.source_location.is_none());
        });
    }

    #[test]
    fn test_missing_partitioning_rejected() {
        let err = PartkeeperConfig::from_str("[database]\nname = \"x\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let input = format!("{MINIMAL}\n[server]\nport = 8080\n");
        assert!(matches!(
            PartkeeperConfig::from_str(&input),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_validation_runs_on_load() {
        let input = MINIMAL.replace("retained_years = [2024]", "retained_years = [2030]");
        let err = PartkeeperConfig::from_str(&input).unwrap_err();
        assert!(err.to_string().contains("2030"), "{err}");
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = PartkeeperConfig::from_file(file.path()).unwrap();
        assert_eq!(config.database.name, "telemetry");
    }

    #[test]
    fn test_from_missing_file() {
        let err = PartkeeperConfig::from_file("/nonexistent/partkeeper.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_, _)));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_BACKUP_ROOT", Some("/mnt/backups"), || {
            let result = expand_env_vars("source_location = \"${TEST_BACKUP_ROOT}\"").unwrap();
            assert_eq!(result, "source_location = \"/mnt/backups\"");
        });
    }

    #[test]
    fn test_missing_env_var_errors() {
        temp_env::with_var("TEST_UNSET_VAR", None::<&str>, || {
            let err = expand_env_vars("name = \"${TEST_UNSET_VAR}\"").unwrap_err();
            assert!(matches!(err, ConfigError::EnvVarNotFound(v) if v == "TEST_UNSET_VAR"));
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# source = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# source = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_before_comment_expanded() {
        temp_env::with_var("TEST_BEFORE_COMMENT", Some("expanded"), || {
            let result =
                expand_env_vars("key = \"${TEST_BEFORE_COMMENT}\" # ${NONEXISTENT}").unwrap();
            assert_eq!(result, "key = \"expanded\" # ${NONEXISTENT}");
        });
    }

    #[test]
    fn test_multiline_with_comments() {
        temp_env::with_var("TEST_MULTI", Some("value1"), || {
            let input = r#"key1 = "${TEST_MULTI}"
# key2 = "${NONEXISTENT}"
key3 = "literal""#;
            let result = expand_env_vars(input).unwrap();
            assert_eq!(
                result,
                r#"key1 = "value1"
# key2 = "${NONEXISTENT}"
key3 = "literal""#
            );
        });
    }
}
