//! Read-through cache of per-project session listings.
//!
//! Owned by the session listing read path; the push layer only ever drops
//! entries from it when a new session is announced.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::kv::{KeyBuilder, KeyValueStore};
use crate::models::IdentityName;
use crate::Result;

#[derive(Clone)]
pub struct SessionListCache {
    store: Arc<dyn KeyValueStore>,
    keys: KeyBuilder,
}

impl SessionListCache {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyBuilder) -> Self {
        Self { store, keys }
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        identity: &IdentityName,
        project_id: &str,
    ) -> Result<Option<T>> {
        let key = self.keys.session_list(identity, project_id);
        match self.store.get(&key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub async fn put<T: Serialize + Sync>(
        &self,
        identity: &IdentityName,
        project_id: &str,
        sessions: &T,
    ) -> Result<()> {
        let key = self.keys.session_list(identity, project_id);
        let json = serde_json::to_string(sessions)?;
        self.store.set(&key, &json).await
    }

    /// Return the cached listing or load, store, and return it.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        identity: &IdentityName,
        project_id: &str,
        load: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Sync,
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = Result<T>> + Send,
    {
        if let Some(cached) = self.get(identity, project_id).await? {
            return Ok(cached);
        }
        let fresh = load().await?;
        self.put(identity, project_id, &fresh).await?;
        Ok(fresh)
    }

    /// Drop the listing for `(identity, project)`. Deleting an absent key is
    /// fine, so repeating the call has no further effect.
    pub async fn invalidate(&self, identity: &IdentityName, project_id: &str) -> Result<bool> {
        let key = self.keys.session_list(identity, project_id);
        let existed = self.store.delete(&key).await?;
        debug!(
            identity = %identity,
            project_id = %project_id,
            existed = existed,
            "Session list cache invalidated"
        );
        Ok(existed)
    }
}

impl std::fmt::Debug for SessionListCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionListCache")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryStore;

    fn cache() -> (MemoryStore, SessionListCache) {
        let store = MemoryStore::new();
        let cache = SessionListCache::new(Arc::new(store.clone()), KeyBuilder::new("t"));
        (store, cache)
    }

    #[tokio::test]
    async fn test_get_or_load_reads_through() {
        let (store, cache) = cache();
        let bob = IdentityName::from("bob");

        let sessions: Vec<String> = cache
            .get_or_load(&bob, "p1", || async { Ok(vec!["s1".to_string()]) })
            .await
            .unwrap();
        assert_eq!(sessions, vec!["s1"]);
        assert!(store.contains_key("t:sessions:bob:p1"));

        // Second call is served from the cache
        let sessions: Vec<String> = cache
            .get_or_load(&bob, "p1", || async { Ok(Vec::new()) })
            .await
            .unwrap();
        assert_eq!(sessions, vec!["s1"]);
    }

    #[tokio::test]
    async fn test_invalidate_is_idempotent() {
        let (store, cache) = cache();
        let bob = IdentityName::from("bob");
        cache.put(&bob, "p1", &vec!["s1"]).await.unwrap();

        assert!(cache.invalidate(&bob, "p1").await.unwrap());
        let after_once = store.len();
        assert!(!cache.invalidate(&bob, "p1").await.unwrap());
        assert_eq!(store.len(), after_once);
        assert!(cache.get::<Vec<String>>(&bob, "p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_leaves_colon_lookalike_alone() {
        let (_store, cache) = cache();
        let carol = IdentityName::from("carol");
        cache.put(&carol, "team:p1", &vec!["s1"]).await.unwrap();

        assert!(!cache
            .invalidate(&IdentityName::from("carol:team"), "p1")
            .await
            .unwrap());
        assert_eq!(
            cache.get::<Vec<String>>(&carol, "team:p1").await.unwrap(),
            Some(vec!["s1".to_string()])
        );
    }
}
