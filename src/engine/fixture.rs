//! TOML fixtures describing a database to seed into [`MemoryEngine`].
//!
//! ```toml
//! database = "telemetry"
//!
//! [[tables]]
//! name = "main_events"
//! rows = [{ year = 2022, count = 10 }, { year = 2023, count = 5 }]
//!
//! [[tables]]
//! name = "events"
//! rows = [{ year = 2024, count = 3 }]
//! clustered_index = { name = "PK_events", primary_key = true }
//! ```

use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::Deserialize;

use super::{EngineError, EngineResult, IndexInfo, TableName, memory::MemoryEngine};
use crate::config::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineFixture {
    pub database: String,

    #[serde(default = "default_schema")]
    pub schema: String,

    #[serde(default)]
    pub tables: Vec<FixtureTable>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureTable {
    pub name: String,

    #[serde(default = "default_columns")]
    pub columns: Vec<String>,

    #[serde(default)]
    pub rows: Vec<YearRows>,

    /// Pre-existing clustered index, keyed on the first column.
    #[serde(default)]
    pub clustered_index: Option<FixtureIndex>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct YearRows {
    pub year: i32,
    pub count: u32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FixtureIndex {
    pub name: String,
    #[serde(default)]
    pub primary_key: bool,
}

fn default_schema() -> String {
    "dbo".to_string()
}

fn default_columns() -> Vec<String> {
    vec!["logtime".to_string(), "value".to_string()]
}

impl EngineFixture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Build an online engine holding every fixture table.
    pub fn seed(&self) -> EngineResult<MemoryEngine> {
        let engine = MemoryEngine::new(&self.database);
        for table in &self.tables {
            let name = TableName::new(&self.schema, &table.name);
            engine.create_table(name.clone(), table.columns.iter().cloned())?;

            for rows in &table.rows {
                engine.insert_rows(&name, spread_over_year(rows.year, rows.count)?)?;
            }

            if let Some(index) = &table.clustered_index {
                let column = table.columns.first().cloned().ok_or_else(|| {
                    EngineError::InvalidArgument(format!("{name} has no columns to index"))
                })?;
                engine.seed_clustered_index(
                    &name,
                    IndexInfo {
                        name: index.name.clone(),
                        column,
                        scheme: None,
                        is_primary_key: index.primary_key,
                    },
                )?;
            }
        }
        Ok(engine)
    }
}

/// `count` timestamps spaced evenly through `year`, starting on January 1st.
fn spread_over_year(year: i32, count: u32) -> EngineResult<Vec<NaiveDateTime>> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| EngineError::InvalidArgument(format!("year {year} out of range")))?;
    let step = Duration::hours(365 * 24 / i64::from(count.max(1)));
    Ok((0..count).map(|i| start + step * i as i32).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineGateway;

    const FIXTURE: &str = r#"
database = "telemetry"

[[tables]]
name = "main_events"
rows = [{ year = 2022, count = 10 }, { year = 2023, count = 5 }]

[[tables]]
name = "events"
columns = ["logtime", "payload"]
clustered_index = { name = "PK_events", primary_key = true }
"#;

    #[tokio::test]
    async fn test_seed_builds_tables_in_order() {
        let fixture = EngineFixture::from_str(FIXTURE).unwrap();
        let engine = fixture.seed().unwrap();

        let tables = engine.list_tables("dbo").await.unwrap();
        let names: Vec<_> = tables.iter().map(|t| t.name.name.as_str()).collect();
        assert_eq!(names, ["main_events", "events"]);
        assert!(tables[1].clustered_index.as_ref().unwrap().is_primary_key);
    }

    #[test]
    fn test_rows_stay_inside_their_year() {
        let rows = spread_over_year(2024, 12).unwrap();
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|ts| ts.and_utc().format("%Y").to_string() == "2024"));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = EngineFixture::from_str("database = \"x\"\nowner = \"y\"\n");
        assert!(result.is_err());
    }
}
