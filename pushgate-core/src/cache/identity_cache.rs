//! Subject → identity name resolution (cache-aside)
//!
//! Lookup order:
//! - L1: in-process Moka cache (local to the worker)
//! - L2: shared KV store (visible to every worker)
//! - system of record, with the result written back to L2 and L1
//!
//! Identity names are treated as immutable once created, so entries carry no
//! expiry in L2 and nothing here invalidates them.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::IdentityCacheConfig;
use crate::kv::{KeyBuilder, KeyValueStore};
use crate::metrics::identity::LOOKUPS;
use crate::models::{IdentityName, SubjectId};
use crate::repository::IdentityStore;
use crate::Result;

#[derive(Clone)]
pub struct IdentityCache {
    l1: moka::future::Cache<SubjectId, IdentityName>,
    store: Arc<dyn KeyValueStore>,
    records: Arc<dyn IdentityStore>,
    keys: KeyBuilder,
}

impl IdentityCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        records: Arc<dyn IdentityStore>,
        keys: KeyBuilder,
        config: &IdentityCacheConfig,
    ) -> Self {
        let l1 = moka::future::Cache::builder()
            .max_capacity(config.l1_capacity)
            .time_to_live(Duration::from_secs(config.l1_ttl_seconds))
            .build();

        Self {
            l1,
            store,
            records,
            keys,
        }
    }

    /// Resolve a subject to its identity name.
    ///
    /// `Ok(None)` means the system of record has no such subject; callers must
    /// not register a connection for it. A failing cache tier is treated as a
    /// miss, only a failing system of record is an error.
    pub async fn resolve(&self, subject_id: &SubjectId) -> Result<Option<IdentityName>> {
        if let Some(name) = self.l1.get(subject_id).await {
            LOOKUPS.with_label_values(&["l1", "hit"]).inc();
            debug!(subject_id = %subject_id, identity = %name, "Identity cache hit (L1)");
            return Ok(Some(name));
        }

        let key = self.keys.subject_identity(subject_id);
        match self.store.get(&key).await {
            Ok(Some(name)) => {
                LOOKUPS.with_label_values(&["l2", "hit"]).inc();
                debug!(subject_id = %subject_id, identity = %name, "Identity cache hit (L2)");
                let name = IdentityName::from(name);
                self.l1.insert(subject_id.clone(), name.clone()).await;
                return Ok(Some(name));
            }
            Ok(None) => {
                LOOKUPS.with_label_values(&["l2", "miss"]).inc();
            }
            Err(e) => {
                LOOKUPS.with_label_values(&["l2", "error"]).inc();
                warn!(
                    subject_id = %subject_id,
                    error = %e,
                    "Identity cache read failed, falling back to system of record"
                );
            }
        }

        let Some(record) = self.records.find_by_subject(subject_id).await? else {
            LOOKUPS.with_label_values(&["store", "miss"]).inc();
            debug!(subject_id = %subject_id, "Subject not found in system of record");
            return Ok(None);
        };
        LOOKUPS.with_label_values(&["store", "hit"]).inc();

        let name = record.identity_name;
        if let Err(e) = self.store.set(&key, name.as_str()).await {
            warn!(
                subject_id = %subject_id,
                identity = %name,
                error = %e,
                "Failed to write identity back to cache"
            );
        }
        self.l1.insert(subject_id.clone(), name.clone()).await;

        debug!(subject_id = %subject_id, identity = %name, "Identity resolved from system of record");
        Ok(Some(name))
    }
}

impl std::fmt::Debug for IdentityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityCache")
            .field("l1_entries", &self.l1.entry_count())
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;
    use crate::repository::{IdentityRecord, MemoryIdentityStore};
    use crate::Error;
    use async_trait::async_trait;
    use mockall::mock;

    mock! {
        Records {}

        #[async_trait]
        impl IdentityStore for Records {
            async fn find_by_subject(&self, subject_id: &SubjectId) -> Result<Option<IdentityRecord>>;
        }
    }

    mock! {
        Store {}

        #[async_trait]
        impl KeyValueStore for Store {
            async fn get(&self, key: &str) -> Result<Option<String>>;
            async fn set(&self, key: &str, value: &str) -> Result<()>;
            async fn delete(&self, key: &str) -> Result<bool>;
            async fn add_to_set(&self, key: &str, member: &str) -> Result<()>;
            async fn remove_from_set(&self, key: &str, member: &str) -> Result<()>;
            async fn set_members(&self, key: &str) -> Result<Vec<String>>;
            async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;
        }
    }

    fn alice_records() -> MemoryIdentityStore {
        let records = MemoryIdentityStore::new();
        records.insert("s1", "alice");
        records
    }

    fn cache_with(store: MemoryStore, records: Arc<dyn IdentityStore>) -> IdentityCache {
        IdentityCache::new(
            Arc::new(store),
            records,
            KeyBuilder::new("test"),
            &IdentityCacheConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_miss_populates_shared_cache() {
        let store = MemoryStore::new();
        let cache = cache_with(store.clone(), Arc::new(alice_records()));
        let name = cache.resolve(&SubjectId::from("s1")).await.unwrap();

        assert_eq!(name, Some(IdentityName::from("alice")));
        assert_eq!(
            store.get("test:subject:s1").await.unwrap(),
            Some("alice".to_string())
        );
    }

    #[tokio::test]
    async fn test_system_of_record_consulted_once() {
        let mut records = MockRecords::new();
        records.expect_find_by_subject().times(1).returning(|subject| {
            Ok(Some(IdentityRecord {
                subject_id: subject.clone(),
                identity_name: IdentityName::from("alice"),
            }))
        });

        let cache = cache_with(MemoryStore::new(), Arc::new(records));
        let subject = SubjectId::from("s1");
        for _ in 0..3 {
            assert_eq!(
                cache.resolve(&subject).await.unwrap(),
                Some(IdentityName::from("alice"))
            );
        }
    }

    #[tokio::test]
    async fn test_shared_cache_hit_skips_system_of_record() {
        let store = MemoryStore::new();
        store.set("test:subject:s9", "carol").await.unwrap();

        let mut records = MockRecords::new();
        records.expect_find_by_subject().never();

        // A second worker with a cold L1 still hits L2
        let cache = cache_with(store, Arc::new(records));
        assert_eq!(
            cache.resolve(&SubjectId::from("s9")).await.unwrap(),
            Some(IdentityName::from("carol"))
        );
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_cached() {
        let store = MemoryStore::new();
        let cache = cache_with(store.clone(), Arc::new(MemoryIdentityStore::new()));

        assert_eq!(cache.resolve(&SubjectId::from("ghost")).await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cache_read_failure_falls_back_to_system_of_record() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .returning(|_| Err(Error::Timeout("Redis GET".to_string())));
        store
            .expect_set()
            .withf(|key, value| key == "test:subject:s1" && value == "alice")
            .times(1)
            .returning(|_, _| Ok(()));

        let cache = IdentityCache::new(
            Arc::new(store),
            Arc::new(alice_records()),
            KeyBuilder::new("test"),
            &IdentityCacheConfig::default(),
        );
        assert_eq!(
            cache.resolve(&SubjectId::from("s1")).await.unwrap(),
            Some(IdentityName::from("alice"))
        );
    }

    #[tokio::test]
    async fn test_write_back_failure_still_resolves() {
        let mut store = MockStore::new();
        store.expect_get().times(1).returning(|_| Ok(None));
        store
            .expect_set()
            .times(1)
            .returning(|_, _| Err(Error::Internal("read-only replica".to_string())));

        let cache = IdentityCache::new(
            Arc::new(store),
            Arc::new(alice_records()),
            KeyBuilder::new("test"),
            &IdentityCacheConfig::default(),
        );
        let subject = SubjectId::from("s1");
        assert_eq!(
            cache.resolve(&subject).await.unwrap(),
            Some(IdentityName::from("alice"))
        );
        // L1 still holds the name, so the failing store is not asked again
        assert_eq!(
            cache.resolve(&subject).await.unwrap(),
            Some(IdentityName::from("alice"))
        );
    }

    #[tokio::test]
    async fn test_system_of_record_failure_propagates() {
        let mut records = MockRecords::new();
        records
            .expect_find_by_subject()
            .returning(|_| Err(Error::Internal("db down".to_string())));

        let cache = cache_with(MemoryStore::new(), Arc::new(records));
        assert!(cache.resolve(&SubjectId::from("s1")).await.is_err());
    }
}
