use thiserror::Error;

use rebal_domain::DomainError;
use rebal_driver::DriverError;
use rebal_policy::PolicyError;
use rebal_store::StoreError;

/// §7 Error Handling Design — aggregates every layer's error into the one
/// type the driver state machine propagates. Every fatal path constructs a
/// `RebalanceResult{status=Failed, ...}` from one of these and calls
/// `onError` exactly once (see `crate::driver::run`).
#[derive(Debug, Error)]
pub enum RebalanceError {
    #[error("domain error: {0}")]
    Domain(#[from] DomainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("driver error: {0}")]
    Driver(#[from] DriverError),

    #[error("internal error: {0}")]
    Internal(String),
}
