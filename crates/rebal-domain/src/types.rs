use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

use crate::config::RebalanceConfig;

// ── Identifiers ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn new(s: impl Into<String>) -> Self {
        SegmentId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SegmentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub String);

impl InstanceId {
    pub fn new(s: impl Into<String>) -> Self {
        InstanceId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PartitionId(pub String);

impl PartitionId {
    pub fn new(s: impl Into<String>) -> Self {
        PartitionId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Segment state ─────────────────────────────────────────────────────────────

/// One (segment, instance) replica's state. `Error` is terminal for that pair.
///
/// In the IdealState, `Offline` means "do not serve"; in the ExternalView it
/// means "not loaded" (the instance has not yet picked the replica up, or has
/// dropped it).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SegmentState {
    Online,
    Consuming,
    Offline,
    Error,
    Dropped,
}

impl std::fmt::Display for SegmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SegmentState::Online => "ONLINE",
            SegmentState::Consuming => "CONSUMING",
            SegmentState::Offline => "OFFLINE",
            SegmentState::Error => "ERROR",
            SegmentState::Dropped => "DROPPED",
        };
        write!(f, "{}", s)
    }
}

// ── Placement maps ────────────────────────────────────────────────────────────

/// Instance → state for a single segment. Keys are unique by construction
/// (it's a map).
pub type InstanceStateMap = HashMap<InstanceId, SegmentState>;

/// Segment → instance state map. A `BTreeMap`, not a `HashMap`: the
/// data model requires stable lexicographic iteration on segment id for
/// deterministic next-step planning (mirror-server consistency across
/// co-routed segments depends on processing segments in the same order
/// every step).
pub type PlacementMap = BTreeMap<SegmentId, InstanceStateMap>;

/// The authoritative, versioned placement document. Mutated only via CAS
/// (see `rebal_store::PlacementStore::cas_update_ideal_state`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdealStateDoc {
    pub placement: PlacementMap,
    pub num_replicas: u32,
    pub num_partitions: u32,
    pub enabled: bool,
    pub version: u64,
}

impl IdealStateDoc {
    pub fn new(placement: PlacementMap, num_replicas: u32, num_partitions: u32) -> Self {
        Self {
            placement,
            num_replicas,
            num_partitions,
            enabled: true,
            version: 0,
        }
    }
}

/// What servers are observed to actually be serving. May lag the IdealState
/// or be transiently absent for a brand-new table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExternalView(pub PlacementMap);

impl ExternalView {
    pub fn get(&self, segment: &SegmentId) -> Option<&InstanceStateMap> {
        self.0.get(segment)
    }
}

// ── Instance partitions ───────────────────────────────────────────────────────

/// Which category of instance partitions a resolver produces. `Tier` carries
/// the tier name so multiple tiers can be resolved independently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstancePartitionsCategory {
    Offline,
    Consuming,
    Completed,
    Tier(String),
}

impl std::fmt::Display for InstancePartitionsCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstancePartitionsCategory::Offline => write!(f, "OFFLINE"),
            InstancePartitionsCategory::Consuming => write!(f, "CONSUMING"),
            InstancePartitionsCategory::Completed => write!(f, "COMPLETED"),
            InstancePartitionsCategory::Tier(t) => write!(f, "TIER({})", t),
        }
    }
}

/// A structured grouping of instances into replica-groups/partitions, used
/// by the assignment policy. Treated as opaque by the core: equality is
/// decidable (used to detect "unchanged" between reconcile attempts) but
/// the internal shape is a policy concern.
///
/// `groups[replica_group][partition_index]` lists the instances serving that
/// (replica group, partition) pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePartitions {
    pub category: Option<InstancePartitionsCategory>,
    pub groups: Vec<Vec<Vec<InstanceId>>>,
}

impl InstancePartitions {
    pub fn new(category: InstancePartitionsCategory) -> Self {
        Self {
            category: Some(category),
            groups: Vec::new(),
        }
    }

    pub fn all_instances(&self) -> Vec<InstanceId> {
        let mut out: Vec<InstanceId> = self
            .groups
            .iter()
            .flatten()
            .flatten()
            .cloned()
            .collect();
        out.sort();
        out.dedup();
        out
    }
}

/// A server, as reported by the placement store's instance config listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub id: InstanceId,
    pub tags: Vec<String>,
    pub enabled: bool,
}

// ── Terminal status ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    NoOp,
    Done,
    DryRun,
    Failed,
    Aborted,
    Cancelled,
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TerminalStatus::NoOp => "NO_OP",
            TerminalStatus::Done => "DONE",
            TerminalStatus::DryRun => "DRY_RUN",
            TerminalStatus::Failed => "FAILED",
            TerminalStatus::Aborted => "ABORTED",
            TerminalStatus::Cancelled => "CANCELLED",
        };
        write!(f, "{}", s)
    }
}

// ── Rebalance context ─────────────────────────────────────────────────────────

/// Created on rebalance entry, destroyed on return. Owned by a single driver
/// invocation; never persisted or shared across jobs.
#[derive(Clone)]
pub struct RebalanceContext {
    pub job_id: Uuid,
    pub table: String,
    pub config: Arc<RebalanceConfig>,
}

impl RebalanceContext {
    pub fn new(table: impl Into<String>, config: RebalanceConfig) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            table: table.into(),
            config: Arc::new(config),
        }
    }
}
