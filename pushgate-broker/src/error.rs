//! Error types for the broker

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] pushgate_core::Error),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),
}

impl Error {
    /// The caller sent something that can never be accepted
    #[must_use]
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::Core(pushgate_core::Error::InvalidInput(_)))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
