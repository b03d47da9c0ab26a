pub mod error;
pub mod state;
pub mod store;
pub mod memory;
pub mod redb_store;
pub mod postgres_store;

pub use error::StoreError;
pub use state::{CasOutcome, InstancePartitionsRecord};
pub use store::PlacementStore;
pub use memory::InMemoryStore;
pub use redb_store::RedbStore;
pub use postgres_store::PostgresStore;
