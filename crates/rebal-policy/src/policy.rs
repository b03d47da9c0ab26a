use std::collections::HashMap;

use rebal_domain::{
    InstancePartitions, InstancePartitionsCategory, PlacementMap, RebalanceConfig, SegmentState,
};

use crate::assign::{assign_from_partitions, pick_tier, validate_uniform_groups};
use crate::error::PolicyError;

/// §4.3 Assignment Policy — a pure function computing a target placement
/// from a current placement plus instance partitions and tier metadata.
/// Implementations must be deterministic: same inputs, same output.
pub trait AssignmentPolicy: Send + Sync {
    fn rebalance(
        &self,
        current: &PlacementMap,
        partitions_by_category: &HashMap<InstancePartitionsCategory, InstancePartitions>,
        sorted_tiers: &[String],
        tier_partitions: &HashMap<String, InstancePartitions>,
        config: &RebalanceConfig,
    ) -> Result<PlacementMap, PolicyError>;

    /// Strict-realtime policies force a full re-plan on every IdealState
    /// change observed mid-loop (§4.7 step 2), rather than adopting IS-only
    /// changes for segments that are still moving.
    fn is_strict_realtime(&self) -> bool {
        false
    }
}

/// A segment with no replica currently in `CONSUMING` is tombstoned — it has
/// already fully dropped out of the live set and should not be retargeted.
fn is_tombstoned(states: &rebal_domain::InstanceStateMap) -> bool {
    !states.is_empty() && states.values().all(|s| *s == SegmentState::Dropped)
}

fn pick_partitions<'a>(
    tier: Option<&str>,
    category: &InstancePartitionsCategory,
    partitions_by_category: &'a HashMap<InstancePartitionsCategory, InstancePartitions>,
    tier_partitions: &'a HashMap<String, InstancePartitions>,
) -> Result<&'a InstancePartitions, PolicyError> {
    if let Some(t) = tier {
        if let Some(ip) = tier_partitions.get(t) {
            return Ok(ip);
        }
    }
    partitions_by_category
        .get(category)
        .ok_or_else(|| PolicyError::InvalidConfig(format!("no instance partitions for category {category}")))
}

/// Offline segments: every replica assigned `ONLINE`, always sourced from
/// the `OFFLINE` category (plus tier overrides).
#[derive(Debug, Default)]
pub struct OfflineSegmentAssignment;

impl AssignmentPolicy for OfflineSegmentAssignment {
    fn rebalance(
        &self,
        current: &PlacementMap,
        partitions_by_category: &HashMap<InstancePartitionsCategory, InstancePartitions>,
        sorted_tiers: &[String],
        tier_partitions: &HashMap<String, InstancePartitions>,
        _config: &RebalanceConfig,
    ) -> Result<PlacementMap, PolicyError> {
        let mut target = PlacementMap::new();
        for (segment, states) in current {
            if is_tombstoned(states) {
                continue;
            }
            let tier = pick_tier(segment, sorted_tiers);
            let ip = pick_partitions(
                tier,
                &InstancePartitionsCategory::Offline,
                partitions_by_category,
                tier_partitions,
            )?;
            let assigned = assign_from_partitions(ip, segment, SegmentState::Online)?;
            target.insert(segment.clone(), assigned);
        }
        Ok(target)
    }
}

/// Realtime (streaming) segments: a segment currently serving any `CONSUMING`
/// replica stays in the `CONSUMING` category/state; everything else is
/// `COMPLETED` and served `ONLINE`.
#[derive(Debug, Default)]
pub struct RealtimeSegmentAssignment;

fn realtime_category(states: &rebal_domain::InstanceStateMap) -> InstancePartitionsCategory {
    if states.values().any(|s| *s == SegmentState::Consuming) {
        InstancePartitionsCategory::Consuming
    } else {
        InstancePartitionsCategory::Completed
    }
}

impl AssignmentPolicy for RealtimeSegmentAssignment {
    fn rebalance(
        &self,
        current: &PlacementMap,
        partitions_by_category: &HashMap<InstancePartitionsCategory, InstancePartitions>,
        sorted_tiers: &[String],
        tier_partitions: &HashMap<String, InstancePartitions>,
        config: &RebalanceConfig,
    ) -> Result<PlacementMap, PolicyError> {
        let mut target = PlacementMap::new();
        for (segment, states) in current {
            if is_tombstoned(states) {
                continue;
            }
            let category = realtime_category(states);
            let state = if category == InstancePartitionsCategory::Consuming && config.include_consuming {
                SegmentState::Consuming
            } else if category == InstancePartitionsCategory::Consuming {
                // includeConsuming=false: leave consuming segments untouched.
                target.insert(segment.clone(), states.clone());
                continue;
            } else {
                SegmentState::Online
            };
            let tier = pick_tier(segment, sorted_tiers);
            let ip = pick_partitions(tier, &category, partitions_by_category, tier_partitions)?;
            let assigned = assign_from_partitions(ip, segment, state)?;
            target.insert(segment.clone(), assigned);
        }
        Ok(target)
    }
}

/// Same placement rule as [`RealtimeSegmentAssignment`], but requires every
/// category's instance partitions to carve uniform replica groups — a
/// precondition for the driver's strict-replica-group batching (§4.5) to make
/// sense — and forces a full re-plan on any IdealState change mid-loop.
#[derive(Debug, Default)]
pub struct StrictRealtimeSegmentAssignment;

impl AssignmentPolicy for StrictRealtimeSegmentAssignment {
    fn rebalance(
        &self,
        current: &PlacementMap,
        partitions_by_category: &HashMap<InstancePartitionsCategory, InstancePartitions>,
        sorted_tiers: &[String],
        tier_partitions: &HashMap<String, InstancePartitions>,
        config: &RebalanceConfig,
    ) -> Result<PlacementMap, PolicyError> {
        for ip in partitions_by_category.values().chain(tier_partitions.values()) {
            validate_uniform_groups(ip)?;
        }
        RealtimeSegmentAssignment.rebalance(current, partitions_by_category, sorted_tiers, tier_partitions, config)
    }

    fn is_strict_realtime(&self) -> bool {
        true
    }
}
