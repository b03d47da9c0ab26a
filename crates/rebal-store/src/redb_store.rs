use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rebal_domain::{
    ExternalView, IdealStateDoc, InstanceConfig, InstancePartitions, InstancePartitionsCategory,
    PlacementMap,
};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::state::CasOutcome;
use crate::store::PlacementStore;

const IDEAL_STATES: TableDefinition<&str, &[u8]> = TableDefinition::new("ideal_states");
const EXTERNAL_VIEWS: TableDefinition<&str, &[u8]> = TableDefinition::new("external_views");
const INSTANCE_PARTITIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("instance_partitions");
const INSTANCE_CONFIGS: TableDefinition<&str, &[u8]> = TableDefinition::new("instance_configs");

fn ip_key(table: &str, category: &InstancePartitionsCategory) -> String {
    format!("{table}::{category}")
}

/// Persistent placement store backed by a redb database file.
///
/// IdealState survives process restarts. CAS is implemented explicitly
/// (read current version inside the write transaction, compare, then write)
/// rather than relying on redb's own transaction isolation as the CAS
/// mechanism — this keeps the contract identical to a networked CAS store,
/// so driver logic doesn't need to special-case the backend.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a redb database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| StoreError::Internal(e.to_string()))?;

        {
            let wtxn = db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(IDEAL_STATES).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(EXTERNAL_VIEWS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(INSTANCE_PARTITIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(INSTANCE_CONFIGS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl PlacementStore for RedbStore {
    async fn read_ideal_state(&self, table: &str) -> Result<(IdealStateDoc, u64), StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = rtxn.open_table(IDEAL_STATES).map_err(|e| StoreError::Internal(e.to_string()))?;
        let guard = t
            .get(table)
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
        let doc: IdealStateDoc = serde_json::from_slice(guard.value())?;
        let version = doc.version;
        Ok((doc, version))
    }

    async fn read_external_view(&self, table: &str) -> Result<Option<ExternalView>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = rtxn.open_table(EXTERNAL_VIEWS).map_err(|e| StoreError::Internal(e.to_string()))?;
        match t.get(table).map_err(|e| StoreError::Internal(e.to_string()))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn cas_update_ideal_state(
        &self,
        table: &str,
        new_placement: PlacementMap,
        expected_version: u64,
    ) -> Result<CasOutcome, StoreError> {
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        let outcome = {
            let mut t = wtxn.open_table(IDEAL_STATES).map_err(|e| StoreError::Internal(e.to_string()))?;
            let mut doc: IdealStateDoc = {
                let guard = t
                    .get(table)
                    .map_err(|e| StoreError::Internal(e.to_string()))?
                    .ok_or_else(|| StoreError::NotFound(table.to_string()))?;
                serde_json::from_slice(guard.value())?
            };
            if doc.version != expected_version {
                CasOutcome::VersionMismatch {
                    current_version: doc.version,
                }
            } else {
                doc.placement = new_placement;
                doc.version += 1;
                let bytes = serde_json::to_vec(&doc)?;
                t.insert(table, bytes.as_slice()).map_err(|e| StoreError::Internal(e.to_string()))?;
                CasOutcome::Committed {
                    new_version: doc.version,
                }
            }
        };
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(outcome)
    }

    async fn read_instance_configs(&self) -> Result<Vec<InstanceConfig>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = rtxn.open_table(INSTANCE_CONFIGS).map_err(|e| StoreError::Internal(e.to_string()))?;
        let mut out = Vec::new();
        for entry in t.iter().map_err(|e| StoreError::Internal(e.to_string()))? {
            let (_k, v) = entry.map_err(|e| StoreError::Internal(e.to_string()))?;
            out.push(serde_json::from_slice(v.value())?);
        }
        Ok(out)
    }

    async fn read_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<Option<InstancePartitions>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let t = rtxn.open_table(INSTANCE_PARTITIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
        match t
            .get(ip_key(table, category).as_str())
            .map_err(|e| StoreError::Internal(e.to_string()))?
        {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn write_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
        partitions: &InstancePartitions,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(partitions)?;
        let key = ip_key(table, category);
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut t = wtxn.open_table(INSTANCE_PARTITIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            t.insert(key.as_str(), bytes.as_slice()).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn delete_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<(), StoreError> {
        let key = ip_key(table, category);
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut t = wtxn.open_table(INSTANCE_PARTITIONS).map_err(|e| StoreError::Internal(e.to_string()))?;
            t.remove(key.as_str()).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebal_domain::{InstanceId, InstanceStateMap, SegmentId, SegmentState};
    use tempfile::TempDir;

    fn placement_one_segment() -> PlacementMap {
        let mut pm = PlacementMap::new();
        let mut ism = InstanceStateMap::new();
        ism.insert(InstanceId::new("i1"), SegmentState::Online);
        pm.insert(SegmentId::new("s1"), ism);
        pm
    }

    fn open_store(dir: &TempDir) -> RedbStore {
        RedbStore::open(&dir.path().join("state.redb")).unwrap()
    }

    async fn seed(store: &RedbStore, table: &str) {
        let wtxn = store.db.begin_write().unwrap();
        {
            let mut t = wtxn.open_table(IDEAL_STATES).unwrap();
            let doc = IdealStateDoc::new(placement_one_segment(), 1, 1);
            let bytes = serde_json::to_vec(&doc).unwrap();
            t.insert(table, bytes.as_slice()).unwrap();
        }
        wtxn.commit().unwrap();
    }

    #[tokio::test]
    async fn persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.redb");
        {
            let store = RedbStore::open(&path).unwrap();
            seed(&store, "t1").await;
        }
        {
            let store = RedbStore::open(&path).unwrap();
            let (doc, version) = store.read_ideal_state("t1").await.unwrap();
            assert_eq!(version, 0);
            assert_eq!(doc.placement.len(), 1);
        }
    }

    #[tokio::test]
    async fn cas_update_bumps_version_and_rejects_stale() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        seed(&store, "t1").await;

        let outcome = store
            .cas_update_ideal_state("t1", PlacementMap::new(), 0)
            .await
            .unwrap();
        assert_eq!(outcome, CasOutcome::Committed { new_version: 1 });

        let stale = store
            .cas_update_ideal_state("t1", PlacementMap::new(), 0)
            .await
            .unwrap();
        assert_eq!(stale, CasOutcome::VersionMismatch { current_version: 1 });
    }

    #[tokio::test]
    async fn instance_partitions_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let cat = InstancePartitionsCategory::Tier("t1".into());
        let ip = InstancePartitions::new(cat.clone());
        store.write_instance_partitions("t1", &cat, &ip).await.unwrap();
        assert!(store.read_instance_partitions("t1", &cat).await.unwrap().is_some());
        store.delete_instance_partitions("t1", &cat).await.unwrap();
        assert!(store.read_instance_partitions("t1", &cat).await.unwrap().is_none());
    }
}
