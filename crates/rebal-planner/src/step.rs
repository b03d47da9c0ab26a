use std::collections::{BTreeSet, HashMap};

use rebal_domain::{InstanceId, InstanceStateMap, PlacementMap, SegmentId};

use crate::oracle::CachingPartitionIdOracle;

/// Inputs to a single invocation of [`plan_next_step`]. Constructed fresh by
/// the driver every loop iteration — none of the per-step caches below are
/// expected to survive across calls ("per-step local state...
/// must be reset each step to avoid bleed across versions").
pub struct PlanStepInput<'a> {
    pub current: &'a PlacementMap,
    pub target: &'a PlacementMap,
    pub min_available_replicas: u32,
    pub strict_replica_group: bool,
    pub low_disk_mode: bool,
    /// `None` means batching is disabled (the `-1` sentinel, already
    /// resolved by the caller via `RebalanceConfig::batching_disabled`).
    pub batch_size_per_server: Option<u32>,
    pub partition_oracle: &'a CachingPartitionIdOracle<'a>,
}

type InstanceSet = BTreeSet<InstanceId>;

#[derive(Default)]
struct StepCaches {
    pending_offload: HashMap<InstanceId, i64>,
    assignment_cache: HashMap<(InstanceSet, InstanceSet), (InstanceStateMap, InstanceSet)>,
}

fn instance_keys(map: Option<&InstanceStateMap>) -> InstanceSet {
    map.map(|m| m.keys().cloned().collect()).unwrap_or_default()
}

fn compute_pending_offloads(current: &PlacementMap, target: &PlacementMap) -> HashMap<InstanceId, i64> {
    let mut pending: HashMap<InstanceId, i64> = HashMap::new();
    for states in current.values() {
        for instance in states.keys() {
            *pending.entry(instance.clone()).or_insert(0) += 1;
        }
    }
    for states in target.values() {
        for instance in states.keys() {
            *pending.entry(instance.clone()).or_insert(0) -= 1;
        }
    }
    pending
}

/// §4.5 single-segment next-assignment subroutine.
fn next_segment_assignment(
    current_states: Option<&InstanceStateMap>,
    target_states: Option<&InstanceStateMap>,
    min_available_replicas: u32,
    low_disk_mode: bool,
    caches: &mut StepCaches,
) -> (InstanceStateMap, InstanceSet) {
    let c_keys = instance_keys(current_states);
    let t_keys = instance_keys(target_states);
    let cache_key = (c_keys.clone(), t_keys.clone());

    if let Some(cached) = caches.assignment_cache.get(&cache_key) {
        return cached.clone();
    }

    let mut next: InstanceStateMap = HashMap::new();

    for instance in c_keys.intersection(&t_keys) {
        let state = target_states.unwrap()[instance];
        next.insert(instance.clone(), state);
    }

    if next.len() < min_available_replicas as usize {
        let mut candidates: Vec<&InstanceId> = c_keys.difference(&t_keys).collect();
        candidates.sort_by(|a, b| {
            let pa = caches.pending_offload.get(*a).copied().unwrap_or(0);
            let pb = caches.pending_offload.get(*b).copied().unwrap_or(0);
            pa.cmp(&pb).then_with(|| a.as_str().cmp(b.as_str()))
        });
        for instance in candidates {
            if next.len() >= min_available_replicas as usize {
                break;
            }
            let state = current_states.unwrap()[instance];
            next.insert(instance.clone(), state);
            *caches.pending_offload.entry(instance.clone()).or_insert(0) -= 1;
        }
    }

    let still_dropping = low_disk_mode && next.len() < c_keys.len();
    if !still_dropping {
        let mut candidates: Vec<&InstanceId> = t_keys.difference(&c_keys).collect();
        candidates.sort_by(|a, b| {
            let pa = caches.pending_offload.get(*a).copied().unwrap_or(0);
            let pb = caches.pending_offload.get(*b).copied().unwrap_or(0);
            pa.cmp(&pb).then_with(|| a.as_str().cmp(b.as_str()))
        });
        for instance in candidates {
            let state = target_states.unwrap()[instance];
            next.insert(instance.clone(), state);
            *caches.pending_offload.entry(instance.clone()).or_insert(0) -= 1;
        }
    }

    let available: InstanceSet = next.keys().filter(|i| c_keys.contains(*i)).cloned().collect();
    caches
        .assignment_cache
        .insert(cache_key, (next.clone(), available.clone()));
    (next, available)
}

fn union_segments(current: &PlacementMap, target: &PlacementMap) -> Vec<SegmentId> {
    let mut all: BTreeSet<SegmentId> = current.keys().cloned().collect();
    all.extend(target.keys().cloned());
    all.into_iter().collect()
}

/// §4.5 Next-Step Planner. Dispatches to the non-strict or strict-replica-
/// group algorithm depending on `input.strict_replica_group`.
pub fn plan_next_step(input: &PlanStepInput) -> PlacementMap {
    let mut caches = StepCaches {
        pending_offload: compute_pending_offloads(input.current, input.target),
        assignment_cache: HashMap::new(),
    };

    if input.strict_replica_group {
        plan_strict(input, &mut caches)
    } else {
        plan_non_strict(input, &mut caches)
    }
}

fn plan_non_strict(input: &PlanStepInput, caches: &mut StepCaches) -> PlacementMap {
    let segments = union_segments(input.current, input.target);
    let mut result = PlacementMap::new();
    let mut quota_used: HashMap<InstanceId, u32> = HashMap::new();

    for segment in segments {
        let current_states = input.current.get(&segment);
        let target_states = input.target.get(&segment);
        let (next, _available) = next_segment_assignment(
            current_states,
            target_states,
            input.min_available_replicas,
            input.low_disk_mode,
            caches,
        );

        let current_keys = instance_keys(current_states);
        let newly_introduced: Vec<InstanceId> = next
            .keys()
            .filter(|i| !current_keys.contains(*i))
            .cloned()
            .collect();

        let admitted = match input.batch_size_per_server {
            None => true,
            Some(quota) => newly_introduced
                .iter()
                .all(|i| quota_used.get(i).copied().unwrap_or(0) < quota),
        };

        if admitted {
            if input.batch_size_per_server.is_some() {
                for i in &newly_introduced {
                    *quota_used.entry(i.clone()).or_insert(0) += 1;
                }
            }
            result.insert(segment, next);
        } else if let Some(states) = current_states {
            result.insert(segment, states.clone());
        }
    }

    result
}

fn plan_strict(input: &PlanStepInput, caches: &mut StepCaches) -> PlacementMap {
    let segments = union_segments(input.current, input.target);

    // Group key: (current instance set, target instance set, partition id).
    // Groups are ordered by first occurrence to keep the whole step
    // deterministic — segments arrive in lexicographic order already
    // (PlacementMap is a BTreeMap), so first-occurrence order is stable.
    type GroupKey = (InstanceSet, InstanceSet, rebal_domain::PartitionId);
    let mut order: Vec<GroupKey> = Vec::new();
    let mut groups: HashMap<GroupKey, Vec<SegmentId>> = HashMap::new();

    for segment in segments {
        let c_keys = instance_keys(input.current.get(&segment));
        let t_keys = instance_keys(input.target.get(&segment));
        let partition = input.partition_oracle.resolve(&segment);
        let key = (c_keys, t_keys, partition);
        groups.entry(key.clone()).or_insert_with(|| {
            order.push(key.clone());
            Vec::new()
        });
        groups.get_mut(&key).unwrap().push(segment);
    }

    let mut result = PlacementMap::new();
    let mut quota_used: HashMap<InstanceId, u32> = HashMap::new();

    for key in order {
        let members = groups.remove(&key).unwrap();
        let probe = &members[0];
        let (next, available) = next_segment_assignment(
            input.current.get(probe),
            input.target.get(probe),
            input.min_available_replicas,
            input.low_disk_mode,
            caches,
        );

        let current_keys = &key.0;
        let newly_introduced: Vec<InstanceId> = next
            .keys()
            .filter(|i| !current_keys.contains(*i))
            .cloned()
            .collect();

        let group_len = members.len() as u32;
        let admitted = if available.len() < input.min_available_replicas as usize {
            // Defensive: the subroutine should already guarantee this, but a
            // group admission must never ship below the floor.
            false
        } else {
            match input.batch_size_per_server {
                None => true,
                Some(quota) => newly_introduced.iter().all(|i| {
                    let used = quota_used.get(i).copied().unwrap_or(0);
                    used < quota && (used == 0 || used + group_len <= quota)
                }),
            }
        };

        if admitted {
            for i in &newly_introduced {
                *quota_used.entry(i.clone()).or_insert(0) += group_len;
            }
            for segment in members {
                result.insert(segment, next.clone());
            }
        } else {
            for segment in members {
                if let Some(states) = input.current.get(&segment) {
                    result.insert(segment, states.clone());
                }
            }
        }
    }

    result
}
