pub mod convergence;
pub mod oracle;
pub mod step;

pub use convergence::{is_converged, remaining_replicas};
pub use oracle::{CachingPartitionIdOracle, PartitionIdOracle, SegmentNamePartitionIdOracle};
pub use step::{plan_next_step, PlanStepInput};
