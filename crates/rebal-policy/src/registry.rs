use std::sync::Arc;

use crate::policy::{AssignmentPolicy, OfflineSegmentAssignment, RealtimeSegmentAssignment, StrictRealtimeSegmentAssignment};

/// §9 "Polymorphism over assignment policy" — the three variants the driver
/// chooses between, resolved by name the same way a registry picks a
/// provisioning backend by capability tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKind {
    Offline,
    Realtime,
    StrictRealtime,
}

pub fn resolve(kind: PolicyKind) -> Arc<dyn AssignmentPolicy> {
    match kind {
        PolicyKind::Offline => Arc::new(OfflineSegmentAssignment),
        PolicyKind::Realtime => Arc::new(RealtimeSegmentAssignment),
        PolicyKind::StrictRealtime => Arc::new(StrictRealtimeSegmentAssignment),
    }
}
