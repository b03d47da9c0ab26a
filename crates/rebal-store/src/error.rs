use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// §7 `NotFound` — no IdealState document exists for the table.
    #[error("ideal state not found for table: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),

    /// §7 `Transient` — a store-level failure the driver does not retry
    /// beyond the CAS retries it already performs; the caller reruns the job.
    #[error("transient store error: {0}")]
    Transient(String),
}
