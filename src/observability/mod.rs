//! Observability: structured logging and retention counters.
//!
//! - Console logging with configurable formats (pretty, compact, JSON), behind the
//!   `cli` feature
//! - Counters through the `metrics` facade, behind the `prometheus` feature

pub mod metrics;
#[cfg(feature = "cli")]
mod tracing_init;

#[cfg(feature = "cli")]
pub use tracing_init::*;
