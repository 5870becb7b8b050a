pub mod identity;

pub use identity::{IdentityRecord, IdentityStore, MemoryIdentityStore, PgIdentityStore};
