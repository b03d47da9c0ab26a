use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use rebal_domain::SegmentId;
use tracing::debug;

use crate::error::DriverError;
use crate::signing::sign;

/// §6 force-commit batch configuration: `forceCommitBatchSize`,
/// `forceCommitBatchStatusCheckIntervalMs`, `forceCommitBatchStatusCheckTimeoutMs`.
#[derive(Debug, Clone, Copy)]
pub struct BatchConfig {
    pub batch_size: u32,
    pub check_interval_ms: u64,
    pub check_timeout_ms: u64,
}

/// §6 "Realtime/force-commit manager" — abstracts the external RPC surface
/// that commits tail-of-stream segments. The core never talks to the stream
/// directly; it only drives this interface.
#[async_trait]
pub trait RealtimeManager: Send + Sync {
    /// Requests a commit for `segments`; the manager may commit a subset
    /// (e.g. segments already committed by someone else are dropped from the
    /// returned set).
    async fn force_commit(
        &self,
        table: &str,
        segments: &[SegmentId],
        batch: &BatchConfig,
    ) -> Result<Vec<SegmentId>, DriverError>;

    /// Blocks (polling) until `segments` all report committed, or the batch
    /// timeout elapses.
    async fn wait_until_committed(
        &self,
        table: &str,
        segments: &[SegmentId],
        batch: &BatchConfig,
    ) -> Result<(), DriverError>;

    async fn segments_yet_to_be_committed(
        &self,
        table: &str,
        segments: &[SegmentId],
    ) -> Result<Vec<SegmentId>, DriverError>;
}

/// In-process stub: commits everything immediately. Used by the CLI demo
/// mode and by engine-level tests that don't care about real commit latency.
#[derive(Debug, Default)]
pub struct LocalRealtimeManager {
    committed: Mutex<HashSet<SegmentId>>,
}

impl LocalRealtimeManager {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RealtimeManager for LocalRealtimeManager {
    async fn force_commit(
        &self,
        table: &str,
        segments: &[SegmentId],
        _batch: &BatchConfig,
    ) -> Result<Vec<SegmentId>, DriverError> {
        debug!(table, count = segments.len(), "LocalRealtimeManager: force_commit");
        let mut guard = self.committed.lock().unwrap();
        guard.extend(segments.iter().cloned());
        Ok(segments.to_vec())
    }

    async fn wait_until_committed(
        &self,
        _table: &str,
        _segments: &[SegmentId],
        _batch: &BatchConfig,
    ) -> Result<(), DriverError> {
        Ok(())
    }

    async fn segments_yet_to_be_committed(
        &self,
        _table: &str,
        segments: &[SegmentId],
    ) -> Result<Vec<SegmentId>, DriverError> {
        let guard = self.committed.lock().unwrap();
        Ok(segments.iter().filter(|s| !guard.contains(s)).cloned().collect())
    }
}

/// HTTP-backed implementation calling an internal realtime-manager service.
/// Requests are signed with HMAC-SHA256 over the JSON body.
pub struct HttpRealtimeManager {
    client: reqwest::Client,
    base_url: String,
    signing_key: Vec<u8>,
}

impl HttpRealtimeManager {
    pub fn new(base_url: impl Into<String>, signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            signing_key: signing_key.into(),
        }
    }

    fn signed_post(&self, path: &str, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let payload = serde_json::to_vec(body).unwrap_or_default();
        let signature = sign(&self.signing_key, &payload);
        self.client
            .post(format!("{}{}", self.base_url, path))
            .header("X-Signature", signature)
            .json(body)
    }
}

#[async_trait]
impl RealtimeManager for HttpRealtimeManager {
    async fn force_commit(
        &self,
        table: &str,
        segments: &[SegmentId],
        batch: &BatchConfig,
    ) -> Result<Vec<SegmentId>, DriverError> {
        let body = serde_json::json!({
            "table": table,
            "segments": segments.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            "batchSize": batch.batch_size,
        });
        let resp = self
            .signed_post("/forceCommit", &body)
            .send()
            .await?
            .error_for_status()?;
        let committed: Vec<String> = resp.json().await?;
        Ok(committed.into_iter().map(SegmentId::new).collect())
    }

    async fn wait_until_committed(
        &self,
        table: &str,
        segments: &[SegmentId],
        batch: &BatchConfig,
    ) -> Result<(), DriverError> {
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_millis(batch.check_timeout_ms);
        loop {
            let remaining = self.segments_yet_to_be_committed(table, segments).await?;
            if remaining.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DriverError::ForceCommitFailed(format!(
                    "{} segment(s) still uncommitted after timeout",
                    remaining.len()
                )));
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(batch.check_interval_ms)).await;
        }
    }

    async fn segments_yet_to_be_committed(
        &self,
        table: &str,
        segments: &[SegmentId],
    ) -> Result<Vec<SegmentId>, DriverError> {
        let body = serde_json::json!({
            "table": table,
            "segments": segments.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        });
        let resp = self
            .signed_post("/segmentsYetToBeCommitted", &body)
            .send()
            .await?
            .error_for_status()?;
        let remaining: Vec<String> = resp.json().await?;
        Ok(remaining.into_iter().map(SegmentId::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch() -> BatchConfig {
        BatchConfig {
            batch_size: 10,
            check_interval_ms: 10,
            check_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn local_manager_commits_immediately() {
        let mgr = LocalRealtimeManager::new();
        let segs = vec![SegmentId::new("s1"), SegmentId::new("s2")];
        let committed = mgr.force_commit("t1", &segs, &batch()).await.unwrap();
        assert_eq!(committed.len(), 2);

        let remaining = mgr.segments_yet_to_be_committed("t1", &segs).await.unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn local_manager_reports_pending_before_commit() {
        let mgr = LocalRealtimeManager::new();
        let segs = vec![SegmentId::new("s1")];
        let remaining = mgr.segments_yet_to_be_committed("t1", &segs).await.unwrap();
        assert_eq!(remaining, segs);
    }
}
