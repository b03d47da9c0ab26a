use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rebal_domain::{
    ExternalView, IdealStateDoc, InstanceConfig, InstancePartitions, InstancePartitionsCategory,
    PlacementMap,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::state::CasOutcome;
use crate::store::PlacementStore;

#[derive(Debug, Default)]
struct Inner {
    ideal_states: HashMap<String, IdealStateDoc>,
    external_views: HashMap<String, ExternalView>,
    instance_partitions: HashMap<(String, InstancePartitionsCategory), InstancePartitions>,
    instance_configs: Vec<InstanceConfig>,
}

/// In-memory implementation of [`PlacementStore`].
///
/// All data is lost on process exit. Used by tests and by the CLI demo mode;
/// also doubles as a hand-rolled "cluster simulator" for exercising the
/// no-downtime loop, since [`InMemoryStore::set_external_view`] lets tests
/// play the role of servers converging toward the IdealState.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table's IdealState at version 0. Panics if the table already
    /// has one — call sites are tests and the CLI demo, which always start
    /// from a clean table.
    pub async fn seed_ideal_state(&self, table: &str, placement: PlacementMap, replicas: u32, partitions: u32) {
        let mut guard = self.inner.write().await;
        assert!(
            !guard.ideal_states.contains_key(table),
            "table {table} already has an IdealState"
        );
        guard
            .ideal_states
            .insert(table.to_string(), IdealStateDoc::new(placement, replicas, partitions));
    }

    /// Directly overwrite the ExternalView for a table — simulates servers
    /// reporting their observed state. Not part of the `PlacementStore`
    /// trait: a real cluster's EV is written by the servers themselves, never
    /// by the rebalancer.
    pub async fn set_external_view(&self, table: &str, ev: ExternalView) {
        let mut guard = self.inner.write().await;
        guard.external_views.insert(table.to_string(), ev);
    }

    pub async fn set_instance_configs(&self, configs: Vec<InstanceConfig>) {
        let mut guard = self.inner.write().await;
        guard.instance_configs = configs;
    }
}

#[async_trait]
impl PlacementStore for InMemoryStore {
    async fn read_ideal_state(&self, table: &str) -> Result<(IdealStateDoc, u64), StoreError> {
        let guard = self.inner.read().await;
        let doc = guard
            .ideal_states
            .get(table)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        let version = doc.version;
        Ok((doc, version))
    }

    async fn read_external_view(&self, table: &str) -> Result<Option<ExternalView>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.external_views.get(table).cloned())
    }

    async fn cas_update_ideal_state(
        &self,
        table: &str,
        new_placement: PlacementMap,
        expected_version: u64,
    ) -> Result<CasOutcome, StoreError> {
        let mut guard = self.inner.write().await;
        let doc = guard
            .ideal_states
            .get_mut(table)
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        if doc.version != expected_version {
            return Ok(CasOutcome::VersionMismatch {
                current_version: doc.version,
            });
        }
        doc.placement = new_placement;
        doc.version += 1;
        Ok(CasOutcome::Committed {
            new_version: doc.version,
        })
    }

    async fn read_instance_configs(&self) -> Result<Vec<InstanceConfig>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard.instance_configs.clone())
    }

    async fn read_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<Option<InstancePartitions>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .instance_partitions
            .get(&(table.to_string(), category.clone()))
            .cloned())
    }

    async fn write_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
        partitions: &InstancePartitions,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .instance_partitions
            .insert((table.to_string(), category.clone()), partitions.clone());
        Ok(())
    }

    async fn delete_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        guard
            .instance_partitions
            .remove(&(table.to_string(), category.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_domain::{InstanceId, InstanceStateMap, SegmentId, SegmentState};

    fn placement_one_segment() -> PlacementMap {
        let mut pm = PlacementMap::new();
        let mut ism = InstanceStateMap::new();
        ism.insert(InstanceId::new("i1"), SegmentState::Online);
        pm.insert(SegmentId::new("s1"), ism);
        pm
    }

    #[tokio::test]
    async fn read_missing_table_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.read_ideal_state("t1").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn cas_update_with_matching_version_commits_and_bumps() {
        let store = InMemoryStore::new();
        store.seed_ideal_state("t1", placement_one_segment(), 1, 1).await;

        let outcome = store
            .cas_update_ideal_state("t1", PlacementMap::new(), 0)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Committed { new_version: 1 });

        let (doc, version) = store.read_ideal_state("t1").await.unwrap();
        assert_eq!(version, 1);
        assert!(doc.placement.is_empty());
    }

    #[tokio::test]
    async fn cas_update_with_stale_version_reports_mismatch_without_mutating() {
        let store = InMemoryStore::new();
        store.seed_ideal_state("t1", placement_one_segment(), 1, 1).await;

        let outcome = store
            .cas_update_ideal_state("t1", PlacementMap::new(), 7)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::VersionMismatch { current_version: 0 });

        let (doc, version) = store.read_ideal_state("t1").await.unwrap();
        assert_eq!(version, 0);
        assert!(!doc.placement.is_empty(), "mismatched CAS must not mutate state");
    }

    #[tokio::test]
    async fn external_view_absent_for_new_table() {
        let store = InMemoryStore::new();
        assert!(store.read_external_view("t1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn instance_partitions_roundtrip_and_delete() {
        let store = InMemoryStore::new();
        let cat = InstancePartitionsCategory::Offline;
        let ip = InstancePartitions::new(cat.clone());
        store.write_instance_partitions("t1", &cat, &ip).await.unwrap();
        assert!(store.read_instance_partitions("t1", &cat).await.unwrap().is_some());

        store.delete_instance_partitions("t1", &cat).await.unwrap();
        assert!(store.read_instance_partitions("t1", &cat).await.unwrap().is_none());
    }
}
