//! Durable at-least-once work queue between ingestion and fan-out.
//!
//! A message handed out by [`EventQueue::receive`] stays owned by the queue
//! until it is acknowledged. If the consumer does not acknowledge it within
//! the visibility timeout it becomes receivable again, so every consumer must
//! tolerate seeing the same message more than once.

pub mod memory;
pub mod redis_stream;

use async_trait::async_trait;
use std::time::Duration;

use crate::Result;

pub use memory::MemoryQueue;
pub use redis_stream::RedisStreamQueue;

/// Token used to acknowledge a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Receipt(pub String);

impl std::fmt::Display for Receipt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A message handed to a consumer
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub receipt: Receipt,
    pub body: String,
    /// Set when this is a redelivery after a visibility timeout
    pub redelivered: bool,
}

#[async_trait]
pub trait EventQueue: Send + Sync {
    /// Append a serialized event. Returns the queue-assigned message id.
    async fn enqueue(&self, body: &str) -> Result<String>;

    /// Take up to `max` messages, waiting up to `wait` when none are ready.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueuedMessage>>;

    /// Mark a message as done. Acknowledging twice is harmless.
    async fn ack(&self, receipt: &Receipt) -> Result<()>;
}
