use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
