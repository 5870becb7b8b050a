use std::sync::Arc;
use tracing::{debug, info, warn};

use pushgate_core::kv::{KeyBuilder, KeyValueStore};
use pushgate_core::models::{ConnectionId, ConnectionRecord, IdentityName};

use crate::Result;

/// Registry of open connections, shared by every worker through the KV store.
///
/// Two kinds of keys are kept:
/// - one record per connection (`{prefix}:conn:{id}`)
/// - one index set per identity (`{prefix}:identity:{name}:conns`)
///
/// Writes are ordered so an id only sits in an index while its record exists:
/// registration writes the record before the index, eviction removes the index
/// membership before the record. A crash between the two steps leaves at most
/// an orphaned record, which broadcast delivery will eventually evict.
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn KeyValueStore>,
    keys: KeyBuilder,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, keys: KeyBuilder) -> Self {
        Self { store, keys }
    }

    /// Register a new connection
    pub async fn register(&self, record: &ConnectionRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        self.store
            .set(&self.keys.connection(&record.connection_id), &json)
            .await?;
        self.store
            .add_to_set(
                &self.keys.identity_connections(&record.identity_name),
                record.connection_id.as_str(),
            )
            .await?;

        info!(
            connection_id = %record.connection_id,
            identity = %record.identity_name,
            "Connection registered"
        );
        Ok(())
    }

    /// Get connection record
    pub async fn get(&self, connection_id: &ConnectionId) -> Result<Option<ConnectionRecord>> {
        match self.store.get(&self.keys.connection(connection_id)).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Connection ids currently indexed under an identity.
    ///
    /// An identity with no open connections yields an empty list.
    pub async fn connections_for(&self, identity: &IdentityName) -> Result<Vec<ConnectionId>> {
        let members = self
            .store
            .set_members(&self.keys.identity_connections(identity))
            .await?;
        Ok(members.into_iter().map(ConnectionId::from).collect())
    }

    /// Every connection with a record, found by a full key scan.
    ///
    /// Linear in the total number of connections.
    pub async fn all_connections(&self) -> Result<Vec<ConnectionId>> {
        let keys = self.store.scan_keys(&self.keys.connection_pattern()).await?;
        Ok(keys
            .iter()
            .filter_map(|key| self.keys.connection_id_from_key(key))
            .collect())
    }

    /// Remove a connection and its index membership.
    ///
    /// `known_identity` lets the caller clean the index even when the record
    /// is already gone (addressed delivery knows which index it read from).
    /// Returns whether anything was removed; evicting twice is harmless.
    pub async fn evict(
        &self,
        connection_id: &ConnectionId,
        known_identity: Option<&IdentityName>,
    ) -> Result<bool> {
        let record_key = self.keys.connection(connection_id);

        let recorded_identity = match self.store.get(&record_key).await? {
            Some(json) => match serde_json::from_str::<ConnectionRecord>(&json) {
                Ok(record) => Some(record.identity_name),
                Err(e) => {
                    warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Unreadable connection record, deleting it anyway"
                    );
                    None
                }
            },
            None => None,
        };

        let mut identities: Vec<&IdentityName> = Vec::with_capacity(2);
        if let Some(identity) = recorded_identity.as_ref() {
            identities.push(identity);
        }
        if let Some(identity) = known_identity {
            if !identities.contains(&identity) {
                identities.push(identity);
            }
        }

        for identity in &identities {
            self.store
                .remove_from_set(
                    &self.keys.identity_connections(identity),
                    connection_id.as_str(),
                )
                .await?;
        }
        let existed = self.store.delete(&record_key).await?;

        if existed {
            info!(
                connection_id = %connection_id,
                identity = ?recorded_identity.as_ref().map(IdentityName::as_str),
                "Connection evicted"
            );
        } else {
            debug!(connection_id = %connection_id, "Evicting unknown connection (no record)");
        }
        Ok(existed)
    }

    /// Explicit removal on disconnect
    pub async fn unregister(&self, connection_id: &ConnectionId) -> Result<bool> {
        self.evict(connection_id, None).await
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
