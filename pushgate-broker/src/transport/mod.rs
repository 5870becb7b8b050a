//! Per-connection push primitive and the sender built on it.

pub mod channel;
pub mod http;
pub mod sender;

use async_trait::async_trait;
use thiserror::Error;

use pushgate_core::models::ConnectionId;

pub use channel::ChannelTransport;
pub use http::HttpGatewayTransport;
pub use sender::{PushSender, SendOutcome};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PushError {
    /// The connection no longer exists on the transport
    #[error("connection gone")]
    Gone,

    #[error("{0}")]
    Transport(String),
}

/// Push bytes to a single open connection. There is no reply channel.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn post(&self, connection_id: &ConnectionId, data: &[u8]) -> Result<(), PushError>;
}
