use async_trait::async_trait;
use rebal_domain::{
    ExternalView, IdealStateDoc, InstanceConfig, InstancePartitions, InstancePartitionsCategory,
    PlacementMap,
};

use crate::error::StoreError;
use crate::state::CasOutcome;

/// §4.1 Placement Store Gateway — versioned read/compare-and-set access to
/// the authoritative IdealState document, and read access to the reported
/// ExternalView. No caching: every call is a point-in-time read against the
/// backing store.
#[async_trait]
pub trait PlacementStore: Send + Sync + 'static {
    /// Fails with `StoreError::NotFound` if the table has no IdealState yet,
    /// or `StoreError::Transient` on a backend hiccup.
    async fn read_ideal_state(&self, table: &str) -> Result<(IdealStateDoc, u64), StoreError>;

    /// A newly created table may not have an ExternalView yet — `None`, not
    /// an error.
    async fn read_external_view(&self, table: &str) -> Result<Option<ExternalView>, StoreError>;

    /// Compare-and-set the placement map against `expected_version`. Only the
    /// placement changes; `num_replicas`/`num_partitions`/`enabled` on the
    /// stored document are left untouched (a rebalance never changes the
    /// table's replication config).
    async fn cas_update_ideal_state(
        &self,
        table: &str,
        new_placement: PlacementMap,
        expected_version: u64,
    ) -> Result<CasOutcome, StoreError>;

    async fn read_instance_configs(&self) -> Result<Vec<InstanceConfig>, StoreError>;

    /// Read the persisted InstancePartitions for one category, if any.
    async fn read_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<Option<InstancePartitions>, StoreError>;

    /// Persist InstancePartitions for one category. Skipped entirely by the
    /// resolver when `dry_run` is set (§4.2).
    async fn write_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
        partitions: &InstancePartitions,
    ) -> Result<(), StoreError>;

    /// Remove the persisted InstancePartitions for one category — used when
    /// that category becomes inapplicable (§4.2, e.g. COMPLETED relocation
    /// disabled).
    async fn delete_instance_partitions(
        &self,
        table: &str,
        category: &InstancePartitionsCategory,
    ) -> Result<(), StoreError>;
}
