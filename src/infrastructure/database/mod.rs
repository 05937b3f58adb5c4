pub mod connection_pool;
pub mod legacy_migration;
pub mod local_store;
pub mod schema;

pub use connection_pool::ConnectionPool;
pub use local_store::LocalStore;
pub use schema::{storefront_schema, IndexSpec, PartitionSpec, StoreSchema};
