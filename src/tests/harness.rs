//! Test harness for lifecycle scenarios.
//!
//! The seeded database holds three managed tables and one table partkeeper must not
//! touch:
//!
//! | table          | rows (year: count)     | clustered index        |
//! |----------------|------------------------|------------------------|
//! | `main_events`  | 2022: 10, 2023: 5, 2024: 3 | none               |
//! | `events`       | 2022: 4, 2024: 2       | `IX_events_time`       |
//! | `main_metrics` | 2023: 6                | none                   |
//! | `lookup`       | 2022: 1                | none                   |

use std::sync::Arc;

use chrono::Datelike;

use crate::{
    config::{DatabaseConfig, PartitioningConfig, PartkeeperConfig},
    engine::{TableName, fixture::EngineFixture, memory::MemoryEngine},
    lifecycle::LifecycleCoordinator,
};

pub const DATABASE: &str = "telemetry";

pub const FIXTURE: &str = r#"
database = "telemetry"

[[tables]]
name = "main_events"
rows = [{ year = 2022, count = 10 }, { year = 2023, count = 5 }, { year = 2024, count = 3 }]

[[tables]]
name = "events"
rows = [{ year = 2022, count = 4 }, { year = 2024, count = 2 }]
clustered_index = { name = "IX_events_time" }

[[tables]]
name = "main_metrics"
rows = [{ year = 2023, count = 6 }]

[[tables]]
name = "lookup"
rows = [{ year = 2022, count = 1 }]
"#;

pub fn dbo(name: &str) -> TableName {
    TableName::new("dbo", name)
}

/// Boundaries 2022..=2024, keeping 2024.
pub fn config() -> PartkeeperConfig {
    PartkeeperConfig::new(
        DatabaseConfig::new(DATABASE),
        PartitioningConfig::new(vec![2022, 2023, 2024], vec![2024]),
    )
}

pub fn seeded_engine() -> Arc<MemoryEngine> {
    seed(FIXTURE)
}

pub fn seed(fixture: &str) -> Arc<MemoryEngine> {
    let fixture = EngineFixture::from_str(fixture).expect("Failed to parse fixture");
    Arc::new(fixture.seed().expect("Failed to seed fixture"))
}

pub fn coordinator(config: PartkeeperConfig, engine: &Arc<MemoryEngine>) -> LifecycleCoordinator {
    LifecycleCoordinator::new(config, engine.clone(), engine.clone())
        .expect("Failed to build coordinator")
}

/// Years of the rows left in `table`, sorted.
pub fn years(engine: &MemoryEngine, table: &str) -> Vec<i32> {
    let mut years: Vec<i32> = engine
        .rows(&dbo(table))
        .unwrap_or_default()
        .iter()
        .map(|ts| ts.year())
        .collect();
    years.sort_unstable();
    years
}

/// Position of the first journal entry starting with `prefix`.
pub fn journal_position(engine: &MemoryEngine, prefix: &str) -> Option<usize> {
    engine.journal().iter().position(|e| e.starts_with(prefix))
}
