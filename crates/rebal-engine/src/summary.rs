use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;

use rebal_domain::{InstanceConfig, InstanceId, PlacementMap, SegmentId, SegmentState};
use rebal_driver::{SegmentMetadata, SegmentZkMetadataOracle, StreamMetadataOracle};
use rebal_planner::PartitionIdOracle;

/// §4.9 per-server movement delta.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ServerDelta {
    pub added: usize,
    pub removed: usize,
    pub unchanged: usize,
    pub new_segments: usize,
}

/// A consuming segment's advisory age/lag, used to flag tail segments that
/// are far behind or very old before committing to move them. `-1` is the
/// null-tolerant sentinel (§4.9) when an oracle is absent or fails.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConsumingSegmentInfo {
    pub segment: SegmentId,
    pub age_ms: i64,
    pub offset_lag: i64,
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct RebalanceSummary {
    pub per_server: HashMap<InstanceId, ServerDelta>,
    pub tag_breakdown: HashMap<String, usize>,
    pub replication_factor_before: u32,
    pub replication_factor_after: u32,
    /// `-1` when no size oracle was supplied, per §4.9's null-tolerant rule.
    pub estimated_bytes_moved: i64,
    pub top_consuming_segments: Vec<ConsumingSegmentInfo>,
}

/// Per-server {added, removed, unchanged, new-segment} from §4.9, computed
/// by set-comparing each segment's current vs. target instance set.
pub fn compute_server_deltas(
    current: &PlacementMap,
    target: &PlacementMap,
) -> HashMap<InstanceId, ServerDelta> {
    let mut out: HashMap<InstanceId, ServerDelta> = HashMap::new();
    let segments: BTreeSet<&SegmentId> = current.keys().chain(target.keys()).collect();

    for segment in segments {
        let current_states = current.get(segment);
        let target_states = target.get(segment);
        let c_keys: HashSet<&InstanceId> =
            current_states.map(|m| m.keys().collect()).unwrap_or_default();
        let t_keys: HashSet<&InstanceId> =
            target_states.map(|m| m.keys().collect()).unwrap_or_default();

        for instance in c_keys.union(&t_keys) {
            let entry = out.entry((*instance).clone()).or_default();
            match (c_keys.contains(*instance), t_keys.contains(*instance)) {
                (true, true) => entry.unchanged += 1,
                (false, true) => {
                    entry.added += 1;
                    if current_states.is_none() {
                        entry.new_segments += 1;
                    }
                }
                (true, false) => entry.removed += 1,
                (false, false) => {}
            }
        }
    }
    out
}

/// Rolls per-server `added` counts up by instance tag, so a dry-run summary
/// can show "tier-hot gains 40 segments" rather than per-instance noise.
fn compute_tag_breakdown(
    per_server: &HashMap<InstanceId, ServerDelta>,
    instance_configs: &[InstanceConfig],
) -> HashMap<String, usize> {
    let tags_by_instance: HashMap<&InstanceId, &[String]> = instance_configs
        .iter()
        .map(|c| (&c.id, c.tags.as_slice()))
        .collect();

    let mut out: HashMap<String, usize> = HashMap::new();
    for (instance, delta) in per_server {
        if delta.added == 0 {
            continue;
        }
        if let Some(tags) = tags_by_instance.get(instance) {
            for tag in *tags {
                *out.entry(tag.clone()).or_insert(0) += delta.added;
            }
        }
    }
    out
}

fn consuming_segments(target: &PlacementMap) -> Vec<&SegmentId> {
    target
        .iter()
        .filter(|(_, states)| states.values().any(|s| *s == SegmentState::Consuming))
        .map(|(seg, _)| seg)
        .collect()
}

/// §4.9 Summary Calculator: an advisory summary of movement for dry runs and
/// pre-checks. Every oracle is optional; a missing or failing oracle
/// degrades its metric to a `-1` sentinel rather than failing the whole
/// summary (a "null-tolerant" summary).
pub async fn compute_summary(
    current: &PlacementMap,
    target: &PlacementMap,
    replication_factor_before: u32,
    replication_factor_after: u32,
    instance_configs: &[InstanceConfig],
    table: &str,
    partition_oracle: &dyn PartitionIdOracle,
    size_oracle: Option<&(dyn Fn(&SegmentId) -> Option<u64> + Send + Sync)>,
    stream_oracle: Option<&dyn StreamMetadataOracle>,
    zk_oracle: Option<&dyn SegmentZkMetadataOracle>,
    oracle_timeout: Duration,
    top_n: usize,
) -> RebalanceSummary {
    let per_server = compute_server_deltas(current, target);
    let tag_breakdown = compute_tag_breakdown(&per_server, instance_configs);

    let estimated_bytes_moved = match size_oracle {
        None => -1,
        Some(oracle) => {
            let mut total: i64 = 0;
            let mut any_hit = false;
            for segment in target.keys() {
                if current.get(segment) != target.get(segment) {
                    if let Some(bytes) = oracle(segment) {
                        total += bytes as i64;
                        any_hit = true;
                    }
                }
            }
            if any_hit {
                total
            } else {
                -1
            }
        }
    };

    let mut top_consuming_segments = Vec::new();
    if let (Some(stream), Some(zk)) = (stream_oracle, zk_oracle) {
        let mut infos: Vec<ConsumingSegmentInfo> = Vec::new();
        for segment in consuming_segments(target) {
            let meta: Option<SegmentMetadata> = zk.get_segment_metadata(segment).await.ok();
            let (age_ms, start_offset, partition) = match &meta {
                Some(m) => (
                    chrono::Utc::now().timestamp_millis() - m.creation_time_ms,
                    m.start_offset,
                    m.partition_id.clone(),
                ),
                None => (-1, -1, partition_oracle.partition_id(segment)),
            };
            let offset_lag = if start_offset < 0 {
                -1
            } else {
                match stream.fetch_largest_offset(table, &partition, oracle_timeout).await {
                    Ok(largest) => largest - start_offset,
                    Err(_) => -1,
                }
            };
            infos.push(ConsumingSegmentInfo {
                segment: segment.clone(),
                age_ms,
                offset_lag,
            });
        }
        infos.sort_by(|a, b| b.offset_lag.cmp(&a.offset_lag));
        infos.truncate(top_n);
        top_consuming_segments = infos;
    } else {
        for segment in consuming_segments(target).into_iter().take(top_n) {
            top_consuming_segments.push(ConsumingSegmentInfo {
                segment: segment.clone(),
                age_ms: -1,
                offset_lag: -1,
            });
        }
    }

    RebalanceSummary {
        per_server,
        tag_breakdown,
        replication_factor_before,
        replication_factor_after,
        estimated_bytes_moved,
        top_consuming_segments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_domain::{InstanceStateMap, SegmentId};

    fn states(pairs: &[(&str, SegmentState)]) -> InstanceStateMap {
        pairs
            .iter()
            .map(|(i, s)| (InstanceId::new(*i), *s))
            .collect()
    }

    #[test]
    fn server_deltas_classify_added_removed_unchanged() {
        let mut current = PlacementMap::new();
        current.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online)]));
        let mut target = PlacementMap::new();
        target.insert(
            SegmentId::new("s1"),
            states(&[("i1", SegmentState::Online), ("i2", SegmentState::Online)]),
        );

        let deltas = compute_server_deltas(&current, &target);
        assert_eq!(deltas[&InstanceId::new("i1")].unchanged, 1);
        assert_eq!(deltas[&InstanceId::new("i2")].added, 1);
        assert_eq!(deltas[&InstanceId::new("i2")].new_segments, 0);
    }

    #[test]
    fn server_deltas_flags_new_segment() {
        let current = PlacementMap::new();
        let mut target = PlacementMap::new();
        target.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online)]));

        let deltas = compute_server_deltas(&current, &target);
        assert_eq!(deltas[&InstanceId::new("i1")].new_segments, 1);
    }

    #[tokio::test]
    async fn summary_is_null_tolerant_without_oracles() {
        let mut current = PlacementMap::new();
        current.insert(SegmentId::new("s1"), states(&[("i1", SegmentState::Online)]));
        let target = current.clone();

        let oracle = rebal_planner::SegmentNamePartitionIdOracle;
        let summary = compute_summary(
            &current,
            &target,
            2,
            2,
            &[],
            "t1",
            &oracle,
            None,
            None,
            None,
            Duration::from_secs(1),
            5,
        )
        .await;
        assert_eq!(summary.estimated_bytes_moved, -1);
        assert!(summary.top_consuming_segments.is_empty());
    }
}
