use std::sync::Arc;

use rebal_domain::SegmentId;

use crate::error::DriverError;
use crate::realtime::{BatchConfig, RealtimeManager};

/// §4.6 Force-Commit Coordinator. Stateless wrapper around a
/// [`RealtimeManager`]: request commit, then poll until done or timeout.
/// Observer `FORCE_COMMIT_START`/`FORCE_COMMIT_END` triggers are emitted by
/// the caller (`rebal-engine`), which owns the observer handle; this type
/// only owns the commit-then-wait protocol.
pub struct ForceCommitCoordinator {
    manager: Arc<dyn RealtimeManager>,
}

impl ForceCommitCoordinator {
    pub fn new(manager: Arc<dyn RealtimeManager>) -> Self {
        Self { manager }
    }

    /// Commits `segments` and blocks until the realtime manager confirms all
    /// of them landed, or the batch timeout elapses. Returns the set the
    /// manager actually accepted for commit (may be a subset of `segments`).
    pub async fn commit_and_wait(
        &self,
        table: &str,
        segments: &[SegmentId],
        batch: &BatchConfig,
    ) -> Result<Vec<SegmentId>, DriverError> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }
        let committed = self.manager.force_commit(table, segments, batch).await?;
        self.manager.wait_until_committed(table, &committed, batch).await?;
        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::realtime::LocalRealtimeManager;

    fn batch() -> BatchConfig {
        BatchConfig {
            batch_size: 5,
            check_interval_ms: 5,
            check_timeout_ms: 500,
        }
    }

    #[tokio::test]
    async fn empty_segment_set_is_a_noop() {
        let coordinator = ForceCommitCoordinator::new(Arc::new(LocalRealtimeManager::new()));
        let result = coordinator.commit_and_wait("t1", &[], &batch()).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn commits_and_waits_for_local_manager() {
        let coordinator = ForceCommitCoordinator::new(Arc::new(LocalRealtimeManager::new()));
        let segs = vec![SegmentId::new("s1")];
        let result = coordinator.commit_and_wait("t1", &segs, &batch()).await.unwrap();
        assert_eq!(result, segs);
    }
}
