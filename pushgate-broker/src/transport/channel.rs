//! In-process transport: each open connection is an mpsc receiver held by
//! whoever owns the socket.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use pushgate_core::models::ConnectionId;

use super::{PushError, PushTransport};

#[derive(Clone, Default)]
pub struct ChannelTransport {
    connections: Arc<DashMap<ConnectionId, mpsc::UnboundedSender<Bytes>>>,
}

impl ChannelTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a connection and return the receiving end of its stream
    pub fn open(&self, connection_id: ConnectionId) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id, tx);
        rx
    }

    /// Forget a connection. Later posts to it report `Gone`.
    pub fn close(&self, connection_id: &ConnectionId) -> bool {
        self.connections.remove(connection_id).is_some()
    }

    #[must_use]
    pub fn is_open(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }
}

#[async_trait]
impl PushTransport for ChannelTransport {
    async fn post(&self, connection_id: &ConnectionId, data: &[u8]) -> Result<(), PushError> {
        let Some(tx) = self.connections.get(connection_id).map(|tx| tx.clone()) else {
            return Err(PushError::Gone);
        };

        if tx.send(Bytes::copy_from_slice(data)).is_err() {
            // Receiver dropped without an explicit close
            self.connections.remove(connection_id);
            return Err(PushError::Gone);
        }
        Ok(())
    }
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("connections", &self.connections.len())
            .finish()
    }
}
