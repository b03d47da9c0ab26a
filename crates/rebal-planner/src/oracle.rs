use std::cell::RefCell;
use std::collections::HashMap;

use rebal_domain::{PartitionId, SegmentId};

/// Resolves a segment's partition id, used by the strict-replica-group
/// planner to group co-routed segments. Kept as a trait (not baked into
/// `rebal_domain`) since in a real cluster this is typically a cheap parse
/// of the segment name, or a lookup against segment ZK metadata — a detail
/// this core treats as a pluggable dependency, same as the assignment policy.
pub trait PartitionIdOracle {
    fn partition_id(&self, segment: &SegmentId) -> PartitionId;
}

/// Caches partition id lookups for the lifetime of one planning step, per
/// the partition-id cache must be reset each step. Callers
/// construct a fresh `CachingPartitionIdOracle` per call to the planner.
pub struct CachingPartitionIdOracle<'a> {
    inner: &'a dyn PartitionIdOracle,
    cache: RefCell<HashMap<SegmentId, PartitionId>>,
}

impl<'a> CachingPartitionIdOracle<'a> {
    pub fn new(inner: &'a dyn PartitionIdOracle) -> Self {
        Self {
            inner,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn resolve(&self, segment: &SegmentId) -> PartitionId {
        if let Some(cached) = self.cache.borrow().get(segment) {
            return cached.clone();
        }
        let id = self.inner.partition_id(segment);
        self.cache.borrow_mut().insert(segment.clone(), id.clone());
        id
    }
}

/// Derives a partition id by splitting the segment id on the last `_` and
/// taking the trailing numeric component — the common "table_partition_seq"
/// segment-naming convention. Falls back to the whole segment id when no
/// such suffix is present (every segment is then its own partition, which
/// degrades strict-replica-group batching to per-segment grouping rather
/// than failing outright).
#[derive(Debug, Default)]
pub struct SegmentNamePartitionIdOracle;

impl PartitionIdOracle for SegmentNamePartitionIdOracle {
    fn partition_id(&self, segment: &SegmentId) -> PartitionId {
        match segment.as_str().rsplit_once('_') {
            Some((_, suffix)) if suffix.chars().all(|c| c.is_ascii_digit()) && !suffix.is_empty() => {
                PartitionId::new(suffix)
            }
            _ => PartitionId::new(segment.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_name_oracle_extracts_trailing_numeric_partition() {
        let oracle = SegmentNamePartitionIdOracle;
        assert_eq!(
            oracle.partition_id(&SegmentId::new("myTable__0__20")),
            PartitionId::new("20")
        );
    }

    #[test]
    fn segment_name_oracle_falls_back_to_whole_name() {
        let oracle = SegmentNamePartitionIdOracle;
        assert_eq!(
            oracle.partition_id(&SegmentId::new("opaque-name")),
            PartitionId::new("opaque-name")
        );
    }

    #[test]
    fn caching_oracle_memoizes_per_step() {
        let inner = SegmentNamePartitionIdOracle;
        let cache = CachingPartitionIdOracle::new(&inner);
        let a = cache.resolve(&SegmentId::new("t_5"));
        let b = cache.resolve(&SegmentId::new("t_5"));
        assert_eq!(a, b);
    }
}
