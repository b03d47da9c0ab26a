pub mod error;
pub mod force_commit;
pub mod oracle;
pub mod realtime;
pub mod signing;

pub use error::DriverError;
pub use force_commit::ForceCommitCoordinator;
pub use oracle::{
    HttpStreamMetadataOracle, SegmentMetadata, SegmentZkMetadataOracle, StreamMetadataOracle, StubOracle,
};
pub use realtime::{BatchConfig, HttpRealtimeManager, LocalRealtimeManager, RealtimeManager};
