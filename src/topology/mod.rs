//! Partition topology: the boundary set, the partition function and scheme built
//! from it, and the clustered indexes aligned to the scheme.

mod boundaries;
mod manager;
mod plan;

pub use boundaries::{RetentionBoundarySet, range_right_ordinal, year_start};
pub use manager::{IndexAction, IndexReport, TopologyManager, TopologyReport};
pub use plan::{CurrentTopology, DesiredTopology, TopologyPlan, TopologyStep};
