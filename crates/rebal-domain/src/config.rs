use serde::{Deserialize, Serialize};

/// Tri-state knob: §6 `minimizeDataMovement`. `Default` defers to whatever
/// the selected assignment policy does on its own; `Enable`/`Disable`
/// override it explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinimizeDataMovement {
    Default,
    Enable,
    Disable,
}

impl Default for MinimizeDataMovement {
    fn default() -> Self {
        MinimizeDataMovement::Default
    }
}

/// Every recognized rebalance configuration knob. This is
/// the typed config the engine consumes — not CLI flag parsing (that stays
/// in `rebal-cli`) and not YAML loading (that's `rebal-config`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RebalanceConfig {
    pub dry_run: bool,
    pub pre_checks: bool,
    pub reassign_instances: bool,
    pub include_consuming: bool,
    pub bootstrap: bool,
    pub downtime: bool,
    /// Negative values are interpreted as max-unavailable
    /// (`replicas + value`, floored at 0). Use
    /// [`RebalanceConfig::min_available_replicas`] to resolve.
    pub min_available_replicas: i32,
    pub low_disk_mode: bool,
    pub best_effort: bool,
    /// `>= 1`, or `-1` to disable. `0` is invalid — rejected at `Init`.
    pub batch_size_per_server: i32,
    pub strict_replica_group: bool,
    pub external_view_check_interval_ms: u64,
    pub external_view_stabilization_timeout_ms: u64,
    pub minimize_data_movement: MinimizeDataMovement,
    pub force_commit: bool,
    pub force_commit_batch_size: u32,
    pub force_commit_batch_status_check_interval_ms: u64,
    pub force_commit_batch_status_check_timeout_ms: u64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            pre_checks: false,
            reassign_instances: false,
            include_consuming: false,
            bootstrap: false,
            downtime: false,
            min_available_replicas: 1,
            low_disk_mode: false,
            best_effort: false,
            batch_size_per_server: -1,
            strict_replica_group: false,
            external_view_check_interval_ms: 1_000,
            external_view_stabilization_timeout_ms: 3_600_000,
            minimize_data_movement: MinimizeDataMovement::Default,
            force_commit: false,
            force_commit_batch_size: 1,
            force_commit_batch_status_check_interval_ms: 5_000,
            force_commit_batch_status_check_timeout_ms: 300_000,
        }
    }
}

impl RebalanceConfig {
    /// Resolve `min_available_replicas` against a concrete replica count, per
    /// negative values mean max-unavailable (`replicas + value`),
    /// floored at 0.
    pub fn min_available_replicas(&self, replicas: u32) -> u32 {
        if self.min_available_replicas >= 0 {
            self.min_available_replicas as u32
        } else {
            let floor = replicas as i64 + self.min_available_replicas as i64;
            floor.max(0) as u32
        }
    }

    /// Batching is disabled when `batch_size_per_server == -1`.
    pub fn batching_disabled(&self) -> bool {
        self.batch_size_per_server == -1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_available_replicas_resolves_non_negative_directly() {
        let mut cfg = RebalanceConfig::default();
        cfg.min_available_replicas = 2;
        assert_eq!(cfg.min_available_replicas(5), 2);
    }

    #[test]
    fn min_available_replicas_resolves_negative_as_max_unavailable() {
        let mut cfg = RebalanceConfig::default();
        cfg.min_available_replicas = -1;
        assert_eq!(cfg.min_available_replicas(3), 2);
    }

    #[test]
    fn min_available_replicas_floors_at_zero() {
        let mut cfg = RebalanceConfig::default();
        cfg.min_available_replicas = -10;
        assert_eq!(cfg.min_available_replicas(3), 0);
    }

    #[test]
    fn batching_disabled_only_at_sentinel() {
        let mut cfg = RebalanceConfig::default();
        cfg.batch_size_per_server = -1;
        assert!(cfg.batching_disabled());
        cfg.batch_size_per_server = 5;
        assert!(!cfg.batching_disabled());
    }
}
