use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("force commit failed: {0}")]
    ForceCommitFailed(String),

    #[error("oracle request timed out: {0}")]
    Timeout(String),

    #[error("transient driver error: {0}")]
    Transient(String),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
}
