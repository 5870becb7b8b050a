use std::sync::Arc;
use tracing::debug;

use pushgate_core::models::ConnectionId;

use super::{PushError, PushTransport};
use crate::{Error, Result};

/// Result of a push that did not fail transiently
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Delivered,
    /// The connection is permanently closed; its registry entry should go
    Gone,
}

/// Wraps the transport's push primitive and separates "gone" from errors.
#[derive(Clone)]
pub struct PushSender {
    transport: Arc<dyn PushTransport>,
}

impl PushSender {
    pub fn new(transport: Arc<dyn PushTransport>) -> Self {
        Self { transport }
    }

    /// Push `payload` to one connection.
    ///
    /// A closed connection is an expected outcome, not an error. Anything else
    /// the transport reports comes back as [`Error::Transport`] and the
    /// connection is left alone.
    pub async fn send(&self, connection_id: &ConnectionId, payload: &[u8]) -> Result<SendOutcome> {
        match self.transport.post(connection_id, payload).await {
            Ok(()) => Ok(SendOutcome::Delivered),
            Err(PushError::Gone) => {
                debug!(connection_id = %connection_id, "Connection gone");
                Ok(SendOutcome::Gone)
            }
            Err(PushError::Transport(reason)) => Err(Error::Transport(reason)),
        }
    }
}

impl std::fmt::Debug for PushSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushSender").finish_non_exhaustive()
    }
}
