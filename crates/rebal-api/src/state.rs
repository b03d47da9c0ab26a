use std::sync::Arc;

use rebal_driver::ForceCommitCoordinator;
use rebal_engine::InstancePartitionsDriver;
use rebal_planner::PartitionIdOracle;
use rebal_policy::AssignmentPolicy;
use rebal_store::PlacementStore;

/// Everything a handler needs to build a [`rebal_engine::RebalanceDeps`] for
/// one request, plus the bearer token the auth middleware checks against.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn PlacementStore>,
    pub ip_driver: Arc<dyn InstancePartitionsDriver>,
    pub partition_oracle: Arc<dyn PartitionIdOracle + Send + Sync>,
    pub force_commit: Option<Arc<ForceCommitCoordinator>>,
    pub auth_token: Arc<String>,
}

impl AppState {
    /// Resolve the policy for a table from the request body rather than a
    /// fixed binding, since a single server may front both offline and
    /// realtime tables.
    pub fn policy_for(&self, kind: rebal_policy::PolicyKind) -> Arc<dyn AssignmentPolicy> {
        rebal_policy::resolve(kind)
    }
}
