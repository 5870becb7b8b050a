use std::sync::Arc;
use tracing::info;

use pushgate_core::models::{Event, EventId};

use crate::queue::EventQueue;
use crate::Result;

/// Entry point for internal producers.
///
/// Only validates and enqueues; it never looks at the registry or the
/// transport, and says nothing about delivery to any connection.
#[derive(Clone)]
pub struct EventIngestor {
    queue: Arc<dyn EventQueue>,
    max_event_bytes: usize,
}

impl EventIngestor {
    pub fn new(queue: Arc<dyn EventQueue>, max_event_bytes: usize) -> Self {
        Self {
            queue,
            max_event_bytes,
        }
    }

    /// Validate, serialize and enqueue an event.
    ///
    /// Invalid events are rejected with `InvalidInput`; queue failures are
    /// returned as-is so the producer can retry.
    pub async fn submit(&self, event: Event) -> Result<EventId> {
        let body = event.encode(self.max_event_bytes)?;
        let message_id = self.queue.enqueue(&body).await?;

        info!(
            event_id = %event.id,
            kind = %event.kind,
            target = ?event.target_identity.as_ref().map(|t| t.as_str()),
            message_id = %message_id,
            "Event enqueued"
        );
        Ok(event.id)
    }
}

impl std::fmt::Debug for EventIngestor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventIngestor")
            .field("max_event_bytes", &self.max_event_bytes)
            .finish_non_exhaustive()
    }
}
