use serde::{Deserialize, Serialize};

use rebal_domain::MinimizeDataMovement;

/// Raw YAML/JSON representation of a rebalance request file. Field names
/// are camelCase to match the wire config format verbatim; [`crate::loader::load_request`]
/// converts and validates this into a `(table, RebalanceConfig)` pair.
#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRebalanceRequest {
    pub table: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub pre_checks: bool,
    #[serde(default)]
    pub reassign_instances: bool,
    #[serde(default)]
    pub include_consuming: bool,
    #[serde(default)]
    pub bootstrap: bool,
    #[serde(default)]
    pub downtime: bool,
    #[serde(default = "default_min_available_replicas")]
    pub min_available_replicas: i32,
    #[serde(default)]
    pub low_disk_mode: bool,
    #[serde(default)]
    pub best_effort: bool,
    #[serde(default = "default_batch_size_per_server")]
    pub batch_size_per_server: i32,
    #[serde(default)]
    pub strict_replica_group: bool,
    #[serde(default = "default_ev_check_interval_ms")]
    pub external_view_check_interval_ms: u64,
    #[serde(default = "default_ev_stabilization_timeout_ms")]
    pub external_view_stabilization_timeout_ms: u64,
    #[serde(default)]
    pub minimize_data_movement: MinimizeDataMovement,
    #[serde(default)]
    pub force_commit: bool,
    #[serde(default = "default_force_commit_batch_size")]
    pub force_commit_batch_size: u32,
    #[serde(default = "default_force_commit_interval_ms")]
    pub force_commit_batch_status_check_interval_ms: u64,
    #[serde(default = "default_force_commit_timeout_ms")]
    pub force_commit_batch_status_check_timeout_ms: u64,
}

fn default_min_available_replicas() -> i32 {
    1
}

fn default_batch_size_per_server() -> i32 {
    -1
}

fn default_ev_check_interval_ms() -> u64 {
    1_000
}

fn default_ev_stabilization_timeout_ms() -> u64 {
    3_600_000
}

fn default_force_commit_batch_size() -> u32 {
    1
}

fn default_force_commit_interval_ms() -> u64 {
    5_000
}

fn default_force_commit_timeout_ms() -> u64 {
    300_000
}
