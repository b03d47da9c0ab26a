use thiserror::Error;

use crate::types::{InstanceId, SegmentId};

/// Domain-level validation and convergence errors — the part of error handling
/// that doesn't depend on any I/O layer. Store-level errors
/// (`NotFound`, `VersionMismatch`, `Transient`) live in `rebal-store`;
/// force-commit errors live in `rebal-driver`. `rebal-engine::RebalanceError`
/// aggregates all of them.
#[derive(Debug, Error)]
pub enum DomainError {
    /// §7 `InvalidConfig` — e.g. `minAvailableReplicas >= replicas`,
    /// `batchSizePerServer == 0`, pre-checks without dry-run, or (per the
    /// open design question: OFFLINE table with `forceCommit=true`.
    /// Fatal before any side effect.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// §7 `DisabledTable` — the IdealState is disabled and `downtime=false`.
    /// A disabled table only ever takes the single-step downtime path.
    #[error("table {0} is disabled and downtime=false")]
    DisabledTable(String),

    /// §7 `StuckInError` — an ERROR replica seen with `bestEffort=false`.
    #[error("segment {segment} stuck in ERROR on instance {instance}")]
    StuckInError {
        segment: SegmentId,
        instance: InstanceId,
    },

    /// §7 `ConvergenceTimeout` — the external view failed to make
    /// measurable progress toward the ideal state within the stabilization
    /// timeout. Downgraded to a warning by the driver when `bestEffort` is
    /// set, never constructed as fatal in that case.
    #[error("external view convergence timed out with {remaining} replica(s) outstanding")]
    ConvergenceTimeout { remaining: usize },
}
