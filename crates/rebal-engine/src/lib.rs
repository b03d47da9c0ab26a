pub mod driver;
pub mod error;
pub mod instance_partitions;
pub mod observer;
pub mod report;
pub mod summary;

pub use driver::{run, RebalanceDeps};
pub use error::RebalanceError;
pub use instance_partitions::{CategoryResolution, InstancePartitionsDriver, TagBucketRoundRobinDriver};
pub use observer::{NoopObserver, RebalanceObserver, TriggerKind};
pub use report::{RebalanceRequest, RebalanceResult};
pub use summary::{compute_server_deltas, compute_summary, ConsumingSegmentInfo, RebalanceSummary, ServerDelta};
