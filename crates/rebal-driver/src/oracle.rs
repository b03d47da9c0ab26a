use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rebal_domain::{PartitionId, SegmentId};

use crate::error::DriverError;
use crate::signing::sign;

/// §6 "Stream metadata oracle": `fetchLargestOffset(table, partitionId, timeout) → integer | Err`.
#[async_trait]
pub trait StreamMetadataOracle: Send + Sync {
    async fn fetch_largest_offset(
        &self,
        table: &str,
        partition: &PartitionId,
        timeout: Duration,
    ) -> Result<i64, DriverError>;
}

/// §6 "Segment ZK metadata oracle": `getSegmentMetadata(segment) → {creationTime, startOffset, partitionId}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMetadata {
    pub creation_time_ms: i64,
    pub start_offset: i64,
    pub partition_id: PartitionId,
}

#[async_trait]
pub trait SegmentZkMetadataOracle: Send + Sync {
    async fn get_segment_metadata(&self, segment: &SegmentId) -> Result<SegmentMetadata, DriverError>;
}

/// In-memory stub for both oracles, seeded by tests and the CLI demo. A
/// missing entry is not an error — callers degrade to the `-1` sentinel per
/// §4.9, so the stub returns `Transient` only when explicitly configured to.
#[derive(Debug, Default)]
pub struct StubOracle {
    offsets: Mutex<HashMap<(String, PartitionId), i64>>,
    segments: Mutex<HashMap<SegmentId, SegmentMetadata>>,
}

impl StubOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_offset(&self, table: &str, partition: PartitionId, offset: i64) {
        self.offsets
            .lock()
            .unwrap()
            .insert((table.to_string(), partition), offset);
    }

    pub fn set_segment_metadata(&self, segment: SegmentId, meta: SegmentMetadata) {
        self.segments.lock().unwrap().insert(segment, meta);
    }
}

#[async_trait]
impl StreamMetadataOracle for StubOracle {
    async fn fetch_largest_offset(
        &self,
        table: &str,
        partition: &PartitionId,
        _timeout: Duration,
    ) -> Result<i64, DriverError> {
        self.offsets
            .lock()
            .unwrap()
            .get(&(table.to_string(), partition.clone()))
            .copied()
            .ok_or_else(|| DriverError::Transient(format!("no offset known for partition {partition}")))
    }
}

#[async_trait]
impl SegmentZkMetadataOracle for StubOracle {
    async fn get_segment_metadata(&self, segment: &SegmentId) -> Result<SegmentMetadata, DriverError> {
        self.segments
            .lock()
            .unwrap()
            .get(segment)
            .cloned()
            .ok_or_else(|| DriverError::Transient(format!("no metadata known for segment {segment}")))
    }
}

/// HTTP-backed stream metadata oracle, signed the same way as
/// [`crate::realtime::HttpRealtimeManager`].
pub struct HttpStreamMetadataOracle {
    client: reqwest::Client,
    base_url: String,
    signing_key: Vec<u8>,
}

impl HttpStreamMetadataOracle {
    pub fn new(base_url: impl Into<String>, signing_key: impl Into<Vec<u8>>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            signing_key: signing_key.into(),
        }
    }
}

#[async_trait]
impl StreamMetadataOracle for HttpStreamMetadataOracle {
    async fn fetch_largest_offset(
        &self,
        table: &str,
        partition: &PartitionId,
        timeout: Duration,
    ) -> Result<i64, DriverError> {
        let body = serde_json::json!({ "table": table, "partitionId": partition.as_str() });
        let payload = serde_json::to_vec(&body).unwrap_or_default();
        let signature = sign(&self.signing_key, &payload);
        let resp = tokio::time::timeout(
            timeout,
            self.client
                .post(format!("{}/fetchLargestOffset", self.base_url))
                .header("X-Signature", signature)
                .json(&body)
                .send(),
        )
        .await
        .map_err(|_| DriverError::Timeout(format!("fetchLargestOffset({table}, {partition})")))??
        .error_for_status()?;

        #[derive(serde::Deserialize)]
        struct Resp {
            offset: i64,
        }
        let parsed: Resp = resp.json().await?;
        Ok(parsed.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_oracle_returns_seeded_offset() {
        let oracle = StubOracle::new();
        oracle.set_offset("t1", PartitionId::new("0"), 42);
        let offset = oracle
            .fetch_largest_offset("t1", &PartitionId::new("0"), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(offset, 42);
    }

    #[tokio::test]
    async fn stub_oracle_missing_entry_is_transient() {
        let oracle = StubOracle::new();
        let err = oracle
            .fetch_largest_offset("t1", &PartitionId::new("0"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, DriverError::Transient(_)));
    }

    #[tokio::test]
    async fn stub_segment_metadata_roundtrips() {
        let oracle = StubOracle::new();
        let meta = SegmentMetadata {
            creation_time_ms: 100,
            start_offset: 0,
            partition_id: PartitionId::new("0"),
        };
        oracle.set_segment_metadata(SegmentId::new("s1"), meta.clone());
        let got = oracle.get_segment_metadata(&SegmentId::new("s1")).await.unwrap();
        assert_eq!(got, meta);
    }
}
