use std::collections::HashMap;

use rebal_domain::{InstanceId, InstancePartitions, InstanceStateMap, SegmentId, SegmentState};

use crate::error::PolicyError;

/// FNV-1a over the segment id, used to deterministically pick a partition
/// slot and (where applicable) a tier bucket. Not cryptographic, not
/// randomized — the same segment id always lands on the same slot, which is
/// the only property the policy contract requires.
fn stable_bucket(s: &str, modulus: usize) -> usize {
    if modulus == 0 {
        return 0;
    }
    let mut hash: u64 = 0xcbf29ce484222325;
    for b in s.as_bytes() {
        hash ^= *b as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    (hash % modulus as u64) as usize
}

/// Every replica group must carve the same number of partitions — strict
/// replica-group routing only makes sense when partition index `p` names the
/// same logical slice in every group.
pub fn validate_uniform_groups(ip: &InstancePartitions) -> Result<(), PolicyError> {
    let Some(first) = ip.groups.first() else {
        return Ok(());
    };
    let expected = first.len();
    if ip.groups.iter().any(|g| g.len() != expected) {
        return Err(PolicyError::InvalidConfig(
            "instance partitions groups have inconsistent partition counts".into(),
        ));
    }
    Ok(())
}

/// Assign `segment` one replica per replica-group, each replica taking on
/// `state`. The partition slot within a group is chosen deterministically
/// from the segment id so repeated calls are stable.
pub fn assign_from_partitions(
    ip: &InstancePartitions,
    segment: &SegmentId,
    state: SegmentState,
) -> Result<InstanceStateMap, PolicyError> {
    if ip.groups.is_empty() {
        return Err(PolicyError::InvalidConfig(format!(
            "no instance partitions available to assign segment {segment}"
        )));
    }
    let mut out: InstanceStateMap = HashMap::new();
    for group in &ip.groups {
        if group.is_empty() {
            return Err(PolicyError::InvalidConfig(
                "replica group has no partitions".into(),
            ));
        }
        let slot = stable_bucket(segment.as_str(), group.len());
        let instances = &group[slot];
        if instances.is_empty() {
            return Err(PolicyError::InvalidConfig(format!(
                "replica group partition slot {slot} has no instances"
            )));
        }
        // A slot may list more than one instance (e.g. co-located replicas);
        // every listed instance serves this segment at `state`.
        for instance in instances {
            out.insert(instance.clone(), state);
        }
    }
    Ok(out)
}

/// Picks a tier name for `segment` deterministically from `sorted_tiers`, or
/// `None` if there are no tiers configured.
pub fn pick_tier<'a>(segment: &SegmentId, sorted_tiers: &'a [String]) -> Option<&'a str> {
    if sorted_tiers.is_empty() {
        return None;
    }
    let idx = stable_bucket(segment.as_str(), sorted_tiers.len());
    Some(sorted_tiers[idx].as_str())
}

pub fn all_instances_in(ip: &InstancePartitions) -> Vec<InstanceId> {
    ip.all_instances()
}
