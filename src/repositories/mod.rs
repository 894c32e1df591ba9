pub mod identity_store;
pub mod memory_store;
pub mod postgres_store;
pub mod rest_store;

pub use identity_store::{IdentityStore, InvalidField, StoreError, StoreResult, UniqueField};
pub use memory_store::{MemoryIdentityStore, StoreOperation};
pub use postgres_store::PgIdentityStore;
pub use rest_store::RestIdentityStore;
