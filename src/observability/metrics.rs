//! Counters for retention runs.
//!
//! Recorded through the `metrics` facade when the `prometheus` feature is on; the
//! host process installs the recorder/exporter. Without the feature every function
//! is a no-op.
//!
//! - `partkeeper_rows_purged_total{table}`
//! - `partkeeper_purge_failures_total{table}`
//! - `partkeeper_lifecycle_steps_total{step,outcome}`
//! - `partkeeper_backups_total{checkpoint}`

#[cfg(feature = "prometheus")]
use metrics::counter;

/// Record rows switched out and truncated for a table.
pub fn record_rows_purged(table: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "partkeeper_rows_purged_total",
            "table" => table.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, count);
    }
}

/// Record a table that could not be purged.
pub fn record_purge_failure(table: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "partkeeper_purge_failures_total",
            "table" => table.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = table;
    }
}

/// Record the end of a lifecycle step.
///
/// `outcome` is one of `completed`, `skipped` or `failed`.
pub fn record_lifecycle_step(step: &str, outcome: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "partkeeper_lifecycle_steps_total",
            "step" => step.to_string(),
            "outcome" => outcome.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (step, outcome);
    }
}

/// Record a full backup taken at a checkpoint.
pub fn record_backup(checkpoint: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "partkeeper_backups_total",
            "checkpoint" => checkpoint.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = checkpoint;
    }
}
