pub mod cache;
pub mod config;
pub mod error;
pub mod kv;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;

pub use cache::{IdentityCache, SessionListCache};
pub use config::Config;
pub use error::{Error, Result};
pub use kv::{KeyBuilder, KeyValueStore, MemoryStore, RedisStore};
pub use repository::{IdentityStore, MemoryIdentityStore, PgIdentityStore};
