//! Shared key-value store behind the connection registry and caches.
//!
//! Workers never share process memory; everything they coordinate on goes
//! through an implementation of [`KeyValueStore`]. Each operation touches a
//! single key and is atomic on its own. There are no multi-key transactions.

pub mod key_builder;
pub mod memory;
pub mod redis;

use async_trait::async_trait;

use crate::Result;

pub use self::key_builder::KeyBuilder;
pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Add a member to a set, creating the set if needed.
    async fn add_to_set(&self, key: &str, member: &str) -> Result<()>;

    /// Remove a member from a set. An emptied set disappears.
    async fn remove_from_set(&self, key: &str, member: &str) -> Result<()>;

    /// Members of a set; empty when the key is absent.
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Every key matching a glob-style pattern (only `*` is interpreted).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
}
