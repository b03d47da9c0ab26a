use rebal_domain::{InstanceConfig, InstanceId, InstancePartitions, InstancePartitionsCategory};
use rebal_store::PlacementStore;
use tracing::debug;

use crate::error::RebalanceError;

/// §4.3's pluggable driver, repurposed for the Instance Partitions Resolver
/// (§4.2): computes a fresh `InstancePartitions` from the current instance
/// configs. Treated as opaque by the driver loop, same as `AssignmentPolicy`.
pub trait InstancePartitionsDriver: Send + Sync {
    fn recompute(
        &self,
        category: &InstancePartitionsCategory,
        configs: &[InstanceConfig],
    ) -> InstancePartitions;
}

/// Buckets enabled instances whose tags contain the category's name
/// (case-insensitively), falling back to every enabled instance when no tag
/// matches, then lays them out round-robin across `replica_groups *
/// partitions_per_group` slots — the simplest allocation that satisfies
/// `validate_uniform_groups` (every group carves the same partition count).
#[derive(Debug, Clone, Copy)]
pub struct TagBucketRoundRobinDriver {
    pub replica_groups: u32,
    pub partitions_per_group: u32,
}

impl TagBucketRoundRobinDriver {
    pub fn new(replica_groups: u32, partitions_per_group: u32) -> Self {
        Self {
            replica_groups: replica_groups.max(1),
            partitions_per_group: partitions_per_group.max(1),
        }
    }

    fn tag_for(category: &InstancePartitionsCategory) -> String {
        category.to_string()
    }
}

impl InstancePartitionsDriver for TagBucketRoundRobinDriver {
    fn recompute(
        &self,
        category: &InstancePartitionsCategory,
        configs: &[InstanceConfig],
    ) -> InstancePartitions {
        let tag = Self::tag_for(category);
        let tagged: Vec<InstanceId> = configs
            .iter()
            .filter(|c| c.enabled && c.tags.iter().any(|t| t.eq_ignore_ascii_case(&tag)))
            .map(|c| c.id.clone())
            .collect();
        let mut pool = if tagged.is_empty() {
            configs
                .iter()
                .filter(|c| c.enabled)
                .map(|c| c.id.clone())
                .collect()
        } else {
            tagged
        };
        pool.sort();

        let mut ip = InstancePartitions::new(category.clone());
        if pool.is_empty() {
            return ip;
        }

        let mut cursor = 0usize;
        for _ in 0..self.replica_groups {
            let mut group = Vec::with_capacity(self.partitions_per_group as usize);
            for _ in 0..self.partitions_per_group {
                group.push(vec![pool[cursor % pool.len()].clone()]);
                cursor += 1;
            }
            ip.groups.push(group);
        }
        ip
    }
}

/// Outcome of resolving one category (§4.2). `unchanged` is advisory:
/// correctness never depends on it, only progress reporting does.
#[derive(Debug, Clone)]
pub struct CategoryResolution {
    pub partitions: InstancePartitions,
    pub unchanged: bool,
}

/// Resolves the persisted-or-recomputed `InstancePartitions` for one
/// category.
///
/// - `applicable = false` (e.g. COMPLETED relocation disabled): the
///   persisted document, if any, is deleted and `None` is returned.
/// - `reassign_instances`: always recompute from `read_instance_configs()`.
/// - `bootstrap`: the persisted value is treated as absent (fresh
///   allocation), forcing a recompute even without `reassign_instances`.
/// - Persistence writes (including the delete above) are skipped entirely
///   under `dry_run`.
///
/// `configs_cache` is populated on first use and reused by every subsequent
/// call sharing it within the same resolution pass (one table has up to one
/// category per OFFLINE/CONSUMING/COMPLETED plus one per tier, all needing
/// the same `read_instance_configs()` snapshot when `reassign_instances` is
/// set) — avoids a redundant store round-trip per category/tier.
pub async fn resolve_category(
    store: &dyn PlacementStore,
    table: &str,
    category: &InstancePartitionsCategory,
    applicable: bool,
    reassign_instances: bool,
    bootstrap: bool,
    dry_run: bool,
    driver: &dyn InstancePartitionsDriver,
    configs_cache: &mut Option<Vec<InstanceConfig>>,
) -> Result<Option<CategoryResolution>, RebalanceError> {
    if !applicable {
        if !dry_run {
            store.delete_instance_partitions(table, category).await?;
        }
        return Ok(None);
    }

    let persisted = store.read_instance_partitions(table, category).await?;
    let effective_persisted = if bootstrap { None } else { persisted };

    let (resolved, unchanged) = if reassign_instances || effective_persisted.is_none() {
        if configs_cache.is_none() {
            *configs_cache = Some(store.read_instance_configs().await?);
        }
        let configs = configs_cache.as_ref().expect("just populated above");
        let recomputed = driver.recompute(category, configs);
        let unchanged = effective_persisted.as_ref() == Some(&recomputed);
        debug!(%category, unchanged, "recomputed instance partitions");
        (recomputed, unchanged)
    } else {
        (effective_persisted.expect("checked is_none above"), true)
    };

    if !dry_run {
        store
            .write_instance_partitions(table, category, &resolved)
            .await?;
    }

    Ok(Some(CategoryResolution {
        partitions: resolved,
        unchanged,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_store::InMemoryStore;

    fn config(id: &str, tags: &[&str]) -> InstanceConfig {
        InstanceConfig {
            id: InstanceId::new(id),
            tags: tags.iter().map(|s| s.to_string()).collect(),
            enabled: true,
        }
    }

    #[test]
    fn round_robin_driver_prefers_tagged_instances() {
        let driver = TagBucketRoundRobinDriver::new(1, 2);
        let configs = vec![
            config("i1", &["OFFLINE"]),
            config("i2", &["OFFLINE"]),
            config("i3", &["CONSUMING"]),
        ];
        let ip = driver.recompute(&InstancePartitionsCategory::Offline, &configs);
        let all = ip.all_instances();
        assert_eq!(all, vec![InstanceId::new("i1"), InstanceId::new("i2")]);
    }

    #[test]
    fn round_robin_driver_falls_back_to_all_enabled_when_untagged() {
        let driver = TagBucketRoundRobinDriver::new(1, 1);
        let configs = vec![config("i1", &[]), config("i2", &[])];
        let ip = driver.recompute(&InstancePartitionsCategory::Consuming, &configs);
        assert_eq!(ip.all_instances().len(), 2);
    }

    #[tokio::test]
    async fn inapplicable_category_deletes_persisted_partitions() {
        let store = InMemoryStore::new();
        let cat = InstancePartitionsCategory::Completed;
        let ip = InstancePartitions::new(cat.clone());
        store.write_instance_partitions("t1", &cat, &ip).await.unwrap();

        let driver = TagBucketRoundRobinDriver::new(1, 1);
        let result = resolve_category(&store, "t1", &cat, false, false, false, false, &driver, &mut None)
            .await
            .unwrap();
        assert!(result.is_none());
        assert!(store
            .read_instance_partitions("t1", &cat)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bootstrap_forces_recompute_even_without_reassign() {
        let store = InMemoryStore::new();
        let cat = InstancePartitionsCategory::Offline;
        let stale = InstancePartitions::new(cat.clone());
        store.write_instance_partitions("t1", &cat, &stale).await.unwrap();
        store
            .set_instance_configs(vec![config("i1", &[]), config("i2", &[])])
            .await;

        let driver = TagBucketRoundRobinDriver::new(1, 1);
        let result = resolve_category(&store, "t1", &cat, true, false, true, false, &driver, &mut None)
            .await
            .unwrap()
            .unwrap();
        assert!(!result.partitions.groups.is_empty());
    }

    #[tokio::test]
    async fn dry_run_skips_persistence() {
        let store = InMemoryStore::new();
        let cat = InstancePartitionsCategory::Offline;
        store.set_instance_configs(vec![config("i1", &[])]).await;

        let driver = TagBucketRoundRobinDriver::new(1, 1);
        resolve_category(&store, "t1", &cat, true, true, false, true, &driver, &mut None)
            .await
            .unwrap();
        assert!(store
            .read_instance_partitions("t1", &cat)
            .await
            .unwrap()
            .is_none());
    }
}
