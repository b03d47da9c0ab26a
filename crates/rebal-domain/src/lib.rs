pub mod config;
pub mod error;
pub mod types;

#[cfg(test)]
mod tests;

pub use config::{MinimizeDataMovement, RebalanceConfig};
pub use error::DomainError;
pub use types::{
    ExternalView, IdealStateDoc, InstanceConfig, InstanceId, InstancePartitions,
    InstancePartitionsCategory, InstanceStateMap, PartitionId, PlacementMap, RebalanceContext,
    SegmentId, SegmentState, TerminalStatus,
};
