//! Which tables are managed, and how staging twins are named.
//!
//! Without `[[tables.groups]]` the naming convention applies: every table carrying
//! `marker_prefix` is managed together with its unprefixed base table. With groups,
//! only the listed tables are managed.
//!
//! ```toml
//! [tables]
//! marker_prefix = "main_"
//! staging_prefix = "temp_"
//!
//! [[tables.groups]]
//! id = "events"
//! primary = "main_events"
//! base = "events"
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TablesConfig {
    /// Prefix marking a table as the primary member of a group.
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,

    /// Prefix of staging tables; prefixed tables are never managed.
    #[serde(default = "default_staging_prefix")]
    pub staging_prefix: String,

    /// Explicit group registry. Replaces the naming convention when non-empty.
    #[serde(default)]
    pub groups: Vec<TableGroupConfig>,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            marker_prefix: default_marker_prefix(),
            staging_prefix: default_staging_prefix(),
            groups: Vec::new(),
        }
    }
}

fn default_marker_prefix() -> String {
    "main_".to_string()
}

fn default_staging_prefix() -> String {
    "temp_".to_string()
}

/// One logical table group.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TableGroupConfig {
    pub id: String,
    pub primary: String,
    /// Unmarked companion table, if the group has one.
    #[serde(default)]
    pub base: Option<String>,
}

impl TablesConfig {
    pub fn uses_registry(&self) -> bool {
        !self.groups.is_empty()
    }

    /// Name of the staging twin of `table`.
    pub fn staging_name(&self, table: &str) -> String {
        format!("{}{}", self.staging_prefix, table)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.staging_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "tables.staging_prefix cannot be empty".into(),
            ));
        }
        if !self.uses_registry() && self.marker_prefix.is_empty() {
            return Err(ConfigError::Validation(
                "tables.marker_prefix cannot be empty without tables.groups".into(),
            ));
        }
        if !self.marker_prefix.is_empty() && self.marker_prefix == self.staging_prefix {
            return Err(ConfigError::Validation(
                "tables.marker_prefix and tables.staging_prefix must differ".into(),
            ));
        }

        let mut ids = HashSet::new();
        let mut members = HashSet::new();
        for group in &self.groups {
            if group.id.trim().is_empty() || group.primary.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "table groups need a non-empty id and primary table".into(),
                ));
            }
            if !ids.insert(group.id.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "duplicate table group id '{}'",
                    group.id
                )));
            }
            for table in std::iter::once(&group.primary).chain(group.base.as_ref()) {
                if table.starts_with(&self.staging_prefix) {
                    return Err(ConfigError::Validation(format!(
                        "table '{table}' in group '{}' carries the staging prefix",
                        group.id
                    )));
                }
                if !members.insert(table.as_str()) {
                    return Err(ConfigError::Validation(format!(
                        "table '{table}' belongs to more than one group"
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(id: &str, primary: &str, base: Option<&str>) -> TableGroupConfig {
        TableGroupConfig {
            id: id.into(),
            primary: primary.into(),
            base: base.map(Into::into),
        }
    }

    #[test]
    fn test_default_prefixes() {
        let config = TablesConfig::default();
        assert!(!config.uses_registry());
        assert_eq!(config.staging_name("main_events"), "temp_main_events");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_group_ids_rejected() {
        let config = TablesConfig {
            groups: vec![group("a", "main_a", None), group("a", "main_b", None)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_table_in_two_groups_rejected() {
        let config = TablesConfig {
            groups: vec![
                group("a", "main_a", Some("shared")),
                group("b", "main_b", Some("shared")),
            ],
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("shared"));
    }

    #[test]
    fn test_staging_table_in_group_rejected() {
        let config = TablesConfig {
            groups: vec![group("a", "temp_a", None)],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
