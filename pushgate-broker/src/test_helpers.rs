//! Shared fixtures for broker unit tests

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use pushgate_core::config::IdentityCacheConfig;
use pushgate_core::kv::{KeyBuilder, KeyValueStore, MemoryStore};
use pushgate_core::models::ConnectionId;
use pushgate_core::{Error as CoreError, IdentityCache, MemoryIdentityStore, SessionListCache};

use crate::fanout::FanoutBroker;
use crate::lifecycle::ConnectHandler;
use crate::registry::ConnectionRegistry;
use crate::transport::{PushError, PushSender, PushTransport};

/// In-memory stack sharing one store, with key prefix `t`
pub struct Stack {
    pub store: MemoryStore,
    pub users: MemoryIdentityStore,
    pub keys: KeyBuilder,
    pub registry: ConnectionRegistry,
    pub transport: ScriptedTransport,
}

impl Stack {
    pub fn new() -> Self {
        let store = MemoryStore::new();
        let keys = KeyBuilder::new("t");
        let registry = ConnectionRegistry::new(Arc::new(store.clone()), keys.clone());
        Self {
            store,
            users: MemoryIdentityStore::new(),
            keys,
            registry,
            transport: ScriptedTransport::default(),
        }
    }

    pub fn identity_cache(&self) -> IdentityCache {
        IdentityCache::new(
            Arc::new(self.store.clone()),
            Arc::new(self.users.clone()),
            self.keys.clone(),
            &IdentityCacheConfig::default(),
        )
    }

    pub fn session_cache(&self) -> SessionListCache {
        SessionListCache::new(Arc::new(self.store.clone()), self.keys.clone())
    }

    pub fn connect_handler(&self) -> ConnectHandler {
        ConnectHandler::new(self.identity_cache(), self.registry.clone())
    }

    pub fn broker(&self) -> FanoutBroker {
        FanoutBroker::new(
            self.registry.clone(),
            PushSender::new(Arc::new(self.transport.clone())),
            self.session_cache(),
        )
    }
}

/// Wraps a [`MemoryStore`] and fails operations on chosen key prefixes
#[derive(Clone)]
pub struct FailingStore {
    inner: MemoryStore,
    failing_writes: Arc<Mutex<Vec<String>>>,
    failing_reads: Arc<Mutex<Vec<String>>>,
}

impl FailingStore {
    pub fn new(inner: MemoryStore) -> Self {
        Self {
            inner,
            failing_writes: Arc::default(),
            failing_reads: Arc::default(),
        }
    }

    /// Writes and deletes under `prefix` fail
    pub fn fail_writes_to(&self, prefix: &str) {
        self.failing_writes.lock().push(prefix.to_string());
    }

    /// Reads and scans under `prefix` fail
    pub fn fail_reads_to(&self, prefix: &str) {
        self.failing_reads.lock().push(prefix.to_string());
    }

    fn check(list: &Mutex<Vec<String>>, key: &str) -> pushgate_core::Result<()> {
        if list.lock().iter().any(|p| key.starts_with(p)) {
            return Err(CoreError::Internal(format!("injected failure for {key}")));
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, key: &str) -> pushgate_core::Result<Option<String>> {
        Self::check(&self.failing_reads, key)?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> pushgate_core::Result<()> {
        Self::check(&self.failing_writes, key)?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> pushgate_core::Result<bool> {
        Self::check(&self.failing_writes, key)?;
        self.inner.delete(key).await
    }

    async fn add_to_set(&self, key: &str, member: &str) -> pushgate_core::Result<()> {
        Self::check(&self.failing_writes, key)?;
        self.inner.add_to_set(key, member).await
    }

    async fn remove_from_set(&self, key: &str, member: &str) -> pushgate_core::Result<()> {
        Self::check(&self.failing_writes, key)?;
        self.inner.remove_from_set(key, member).await
    }

    async fn set_members(&self, key: &str) -> pushgate_core::Result<Vec<String>> {
        Self::check(&self.failing_reads, key)?;
        self.inner.set_members(key).await
    }

    async fn scan_keys(&self, pattern: &str) -> pushgate_core::Result<Vec<String>> {
        Self::check(&self.failing_reads, pattern)?;
        self.inner.scan_keys(pattern).await
    }
}

/// Scripted response for one connection
#[derive(Debug, Clone)]
pub enum Script {
    Gone,
    Fail,
    /// Succeed after a delay
    Slow(Duration),
}

/// Records every post and answers per connection as scripted.
/// Unscripted connections succeed.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    scripts: Arc<DashMap<ConnectionId, Script>>,
    posts: Arc<Mutex<Vec<(ConnectionId, Vec<u8>)>>>,
}

impl ScriptedTransport {
    pub fn script(&self, connection_id: &str, script: Script) {
        self.scripts.insert(ConnectionId::from(connection_id), script);
    }

    /// Every attempt in call order
    pub fn posts(&self) -> Vec<(ConnectionId, Vec<u8>)> {
        self.posts.lock().clone()
    }

    /// Connection ids attempted, sorted
    pub fn attempted(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.posts().into_iter().map(|(id, _)| id).collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl PushTransport for ScriptedTransport {
    async fn post(&self, connection_id: &ConnectionId, data: &[u8]) -> Result<(), PushError> {
        self.posts
            .lock()
            .push((connection_id.clone(), data.to_vec()));

        let script = self.scripts.get(connection_id).map(|s| s.clone());
        match script {
            None => Ok(()),
            Some(Script::Gone) => Err(PushError::Gone),
            Some(Script::Fail) => Err(PushError::Transport("scripted failure".to_string())),
            Some(Script::Slow(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }
}
