use serde::{Deserialize, Serialize};

use super::ConfigError;

/// The database whose tables are managed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Database name, used for backups and restores.
    pub name: String,

    /// Schema holding the managed tables.
    #[serde(default = "default_schema")]
    pub schema: String,
}

fn default_schema() -> String {
    "dbo".to_string()
}

impl DatabaseConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: default_schema(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.name cannot be empty".into(),
            ));
        }
        if self.schema.trim().is_empty() {
            return Err(ConfigError::Validation(
                "database.schema cannot be empty".into(),
            ));
        }
        Ok(())
    }
}
