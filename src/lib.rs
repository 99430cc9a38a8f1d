//! Yearly partition retention for append-mostly tables.
//!
//! Tables are partitioned by calendar year on a timestamp column. Purging a year
//! switches its partition out of every managed table into an empty staging twin and
//! truncates the twin, so old data goes away as a metadata operation rather than a
//! row-by-row delete. The [`lifecycle`] module sequences the whole procedure:
//! restore, topology rebuild, index alignment, staging, purge, maintenance and backup
//! checkpoints.
//!
//! The engine is reached only through the traits in [`engine`]; the in-memory
//! [`engine::memory::MemoryEngine`] backs the simulator and the tests.

pub mod backup;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod purge;
pub mod resolver;
pub mod staging;
pub mod topology;

#[cfg(test)]
mod tests;

pub use config::PartkeeperConfig;
pub use error::{RetentionError, RetentionResult};
pub use lifecycle::{LifecycleCoordinator, LifecycleError, LifecycleMode, LifecycleReport};
