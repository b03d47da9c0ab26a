use serde::{Deserialize, Serialize};

use rebal_domain::{InstancePartitions, InstancePartitionsCategory};

/// Outcome of [`crate::store::PlacementStore::cas_update_ideal_state`] —
/// §4.1: `ok | versionMismatch | Transient`. `Transient` and other I/O
/// failures surface through `StoreError` instead; this enum only covers the
/// two CAS-specific outcomes the driver branches on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    Committed { new_version: u64 },
    VersionMismatch { current_version: u64 },
}

/// A persisted `InstancePartitions` document, keyed by (table, category).
/// Not part of the placement-store gateway's primary surface directly, but the natural
/// extension of the same versioned-document idea used to back the
/// Instance Partitions Resolver (§4.2) without inventing a second store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstancePartitionsRecord {
    pub table: String,
    pub category: InstancePartitionsCategory,
    pub partitions: InstancePartitions,
}
