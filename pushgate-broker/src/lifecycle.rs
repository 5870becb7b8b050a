//! Connect-time registration.

use serde::Serialize;
use tracing::{info, warn};

use pushgate_core::metrics::registry::REGISTRATIONS;
use pushgate_core::models::{ConnectionId, ConnectionRecord, IdentityName, SubjectId};
use pushgate_core::IdentityCache;

use crate::registry::ConnectionRegistry;

/// What happened to the registration. The transport accepts the connection
/// in every case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Registration {
    Registered { identity: IdentityName },
    /// The subject is unknown; the connection stays open but receives nothing
    Unresolved,
    /// Identity lookup or registry write failed
    Failed { reason: String },
}

/// Acknowledgement returned to the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectAck {
    pub accepted: bool,
    pub registration: Registration,
}

impl ConnectAck {
    const fn accepted(registration: Registration) -> Self {
        Self {
            accepted: true,
            registration,
        }
    }

    #[must_use]
    pub const fn is_registered(&self) -> bool {
        matches!(self.registration, Registration::Registered { .. })
    }
}

/// Handles the transport's "connection opened" trigger
#[derive(Clone, Debug)]
pub struct ConnectHandler {
    identities: IdentityCache,
    registry: ConnectionRegistry,
}

impl ConnectHandler {
    #[must_use]
    pub const fn new(identities: IdentityCache, registry: ConnectionRegistry) -> Self {
        Self {
            identities,
            registry,
        }
    }

    /// Resolve the caller's identity and register the connection under it.
    ///
    /// Never rejects: failures are reported in the acknowledgement and logged.
    pub async fn on_connect(&self, connection_id: ConnectionId, subject_id: SubjectId) -> ConnectAck {
        let identity = match self.identities.resolve(&subject_id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                REGISTRATIONS.with_label_values(&["unresolved"]).inc();
                warn!(
                    connection_id = %connection_id,
                    subject_id = %subject_id,
                    "No identity for subject, connection left unregistered"
                );
                return ConnectAck::accepted(Registration::Unresolved);
            }
            Err(e) => {
                REGISTRATIONS.with_label_values(&["failed"]).inc();
                warn!(
                    connection_id = %connection_id,
                    subject_id = %subject_id,
                    error = %e,
                    "Identity resolution failed, connection left unregistered"
                );
                return ConnectAck::accepted(Registration::Failed {
                    reason: e.to_string(),
                });
            }
        };

        let record = ConnectionRecord::new(connection_id, subject_id, identity.clone());
        match self.registry.register(&record).await {
            Ok(()) => {
                REGISTRATIONS.with_label_values(&["registered"]).inc();
                ConnectAck::accepted(Registration::Registered { identity })
            }
            Err(e) => {
                REGISTRATIONS.with_label_values(&["failed"]).inc();
                warn!(
                    connection_id = %record.connection_id,
                    identity = %identity,
                    error = %e,
                    "Registry write failed, connection left unregistered"
                );
                ConnectAck::accepted(Registration::Failed {
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Handles the transport's "connection closed" trigger
    pub async fn on_disconnect(&self, connection_id: &ConnectionId) -> crate::Result<bool> {
        let removed = self.registry.unregister(connection_id).await?;
        info!(connection_id = %connection_id, removed = removed, "Connection closed");
        Ok(removed)
    }
}
