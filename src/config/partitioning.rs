//! Partition boundaries and the objects that carry them.
//!
//! # Example
//!
//! ```toml
//! [partitioning]
//! boundary_years = [2022, 2023, 2024, 2025, 2026]
//! retained_years = [2025]
//! function_name = "PF_LOGTIME_YEARLY"
//! scheme_name = "PS_LOGTIME_YEARLY"
//! timestamp_column = "logtime"
//! placement = "PRIMARY"
//! ```

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Years a boundary may fall in.
pub const BOUNDARY_YEAR_RANGE: RangeInclusive<i32> = 1..=9999;

/// Yearly RANGE RIGHT partitioning shared by every managed table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct PartitioningConfig {
    /// Years whose January 1st starts a partition. Strictly ascending.
    pub boundary_years: Vec<i32>,

    /// Boundary years to keep. Every other boundary year is purged.
    pub retained_years: Vec<i32>,

    /// Name of the partition function.
    #[serde(default = "default_function_name")]
    pub function_name: String,

    /// Name of the partition scheme.
    #[serde(default = "default_scheme_name")]
    pub scheme_name: String,

    /// Column every managed table is partitioned on.
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,

    /// Storage location every partition is mapped to.
    #[serde(default = "default_placement")]
    pub placement: String,
}

fn default_function_name() -> String {
    "PF_LOGTIME_YEARLY".to_string()
}

fn default_scheme_name() -> String {
    "PS_LOGTIME_YEARLY".to_string()
}

fn default_timestamp_column() -> String {
    "logtime".to_string()
}

fn default_placement() -> String {
    "PRIMARY".to_string()
}

impl PartitioningConfig {
    pub fn new(boundary_years: Vec<i32>, retained_years: Vec<i32>) -> Self {
        Self {
            boundary_years,
            retained_years,
            function_name: default_function_name(),
            scheme_name: default_scheme_name(),
            timestamp_column: default_timestamp_column(),
            placement: default_placement(),
        }
    }

    /// Boundary years outside the retained set, ascending.
    pub fn purge_years(&self) -> Vec<i32> {
        self.boundary_years
            .iter()
            .copied()
            .filter(|year| !self.retained_years.contains(year))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.boundary_years.is_empty() {
            return Err(ConfigError::Validation(
                "partitioning.boundary_years cannot be empty".into(),
            ));
        }
        if let Some(pair) = self.boundary_years.windows(2).find(|w| w[0] >= w[1]) {
            return Err(ConfigError::Validation(format!(
                "partitioning.boundary_years must be strictly ascending ({} is followed by {})",
                pair[0], pair[1]
            )));
        }
        if let Some(year) = self
            .boundary_years
            .iter()
            .find(|year| !BOUNDARY_YEAR_RANGE.contains(year))
        {
            return Err(ConfigError::Validation(format!(
                "partitioning.boundary_years: {year} is outside {}..={}",
                BOUNDARY_YEAR_RANGE.start(),
                BOUNDARY_YEAR_RANGE.end()
            )));
        }
        if self.retained_years.is_empty() {
            return Err(ConfigError::Validation(
                "partitioning.retained_years cannot be empty".into(),
            ));
        }
        if let Some(year) = self
            .retained_years
            .iter()
            .find(|year| !self.boundary_years.contains(year))
        {
            return Err(ConfigError::Validation(format!(
                "retained year {year} is not a partition boundary"
            )));
        }

        for (field, value) in [
            ("function_name", &self.function_name),
            ("scheme_name", &self.scheme_name),
            ("timestamp_column", &self.timestamp_column),
            ("placement", &self.placement),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "partitioning.{field} cannot be empty"
                )));
            }
        }
        Ok(())
    }
}
