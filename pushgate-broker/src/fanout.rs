//! Fan-out of queued events to open connections.
//!
//! Per event: hooks first, then target resolution, then concurrent delivery
//! to every target. Delivery failures stay with their connection; only a
//! failure to resolve targets fails the event.

use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use pushgate_core::metrics::fanout::{DELIVERIES, EVENTS_PROCESSED};
use pushgate_core::models::{ConnectionId, Event, IdentityName};
use pushgate_core::SessionListCache;

use crate::hooks::Hook;
use crate::queue::QueuedMessage;
use crate::registry::ConnectionRegistry;
use crate::transport::{PushSender, SendOutcome};
use crate::Result;

/// Per-event delivery tally
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FanoutReport {
    pub targets: usize,
    pub delivered: usize,
    pub gone: usize,
    pub failed: usize,
}

/// What the worker should do with a queue message after handling it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    Processed(FanoutReport),
    /// The body is not an event and never will be
    Discarded,
}

#[derive(Debug, Clone, Copy)]
enum Delivery {
    Delivered,
    Gone,
    Failed,
}

#[derive(Clone, Debug)]
pub struct FanoutBroker {
    registry: ConnectionRegistry,
    sender: PushSender,
    sessions: SessionListCache,
}

impl FanoutBroker {
    #[must_use]
    pub const fn new(
        registry: ConnectionRegistry,
        sender: PushSender,
        sessions: SessionListCache,
    ) -> Self {
        Self {
            registry,
            sender,
            sessions,
        }
    }

    /// Decode and process one queue message.
    ///
    /// `Err` means the message must not be acknowledged.
    pub async fn handle_message(&self, message: &QueuedMessage) -> Result<Handled> {
        let event = match Event::decode(&message.body) {
            Ok(event) => event,
            Err(e) => {
                EVENTS_PROCESSED.with_label_values(&["undecodable"]).inc();
                error!(
                    receipt = %message.receipt,
                    error = %e,
                    "Discarding undecodable queue message"
                );
                return Ok(Handled::Discarded);
            }
        };

        if message.redelivered {
            debug!(event_id = %event.id, "Processing redelivered event");
        }

        match self.process(&event).await {
            Ok(report) => {
                EVENTS_PROCESSED.with_label_values(&["ok"]).inc();
                Ok(Handled::Processed(report))
            }
            Err(e) => {
                EVENTS_PROCESSED.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    /// Run hooks, resolve targets and deliver.
    pub async fn process(&self, event: &Event) -> Result<FanoutReport> {
        for hook in Hook::for_event(event) {
            hook.run(&self.sessions).await;
        }

        let targets = self.resolve_targets(event).await?;
        if targets.is_empty() {
            debug!(event_id = %event.id, kind = %event.kind, "No connections to deliver to");
            return Ok(FanoutReport::default());
        }

        let frame = event.client_frame()?;
        let target_identity = event.target_identity.as_ref();
        let results = join_all(
            targets
                .iter()
                .map(|connection_id| self.deliver(connection_id, target_identity, &frame)),
        )
        .await;

        let mut report = FanoutReport {
            targets: targets.len(),
            ..FanoutReport::default()
        };
        for result in results {
            match result {
                Delivery::Delivered => report.delivered += 1,
                Delivery::Gone => report.gone += 1,
                Delivery::Failed => report.failed += 1,
            }
        }

        info!(
            event_id = %event.id,
            kind = %event.kind,
            targets = report.targets,
            delivered = report.delivered,
            gone = report.gone,
            failed = report.failed,
            "Event fanned out"
        );
        Ok(report)
    }

    async fn resolve_targets(&self, event: &Event) -> Result<Vec<ConnectionId>> {
        match &event.target_identity {
            Some(identity) => self.registry.connections_for(identity).await,
            None => self.registry.all_connections().await,
        }
    }

    async fn deliver(
        &self,
        connection_id: &ConnectionId,
        target_identity: Option<&IdentityName>,
        frame: &[u8],
    ) -> Delivery {
        match self.sender.send(connection_id, frame).await {
            Ok(SendOutcome::Delivered) => {
                DELIVERIES.with_label_values(&["delivered"]).inc();
                Delivery::Delivered
            }
            Ok(SendOutcome::Gone) => {
                DELIVERIES.with_label_values(&["gone"]).inc();
                if let Err(e) = self.registry.evict(connection_id, target_identity).await {
                    warn!(
                        connection_id = %connection_id,
                        error = %e,
                        "Failed to evict gone connection"
                    );
                }
                Delivery::Gone
            }
            Err(e) => {
                DELIVERIES.with_label_values(&["failed"]).inc();
                warn!(connection_id = %connection_id, error = %e, "Delivery failed");
                Delivery::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Receipt;
    use crate::test_helpers::{FailingStore, Script, Stack};
    use pushgate_core::models::{ConnectionRecord, SubjectId};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    async fn connect(stack: &Stack, conn: &str, identity: &str) {
        stack
            .registry
            .register(&ConnectionRecord::new(
                ConnectionId::from(conn),
                SubjectId::from(format!("sub-{identity}")),
                IdentityName::from(identity),
            ))
            .await
            .unwrap();
    }

    fn ids(raw: &[&str]) -> Vec<ConnectionId> {
        raw.iter().map(|id| ConnectionId::from(*id)).collect()
    }

    #[tokio::test]
    async fn test_addressed_event_reaches_only_that_identity() {
        let stack = Stack::new();
        connect(&stack, "a1", "alice").await;
        connect(&stack, "a2", "alice").await;
        connect(&stack, "b1", "bob").await;

        let report = stack
            .broker()
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();

        assert_eq!(report.targets, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(stack.transport.attempted(), ids(&["a1", "a2"]));

        let (_, frame) = &stack.transport.posts()[0];
        let frame: Value = serde_json::from_slice(frame).unwrap();
        assert_eq!(frame, json!({"type": "chat", "payload": "hi"}));
    }

    #[tokio::test]
    async fn test_identity_without_connections_is_not_an_error() {
        let stack = Stack::new();
        connect(&stack, "b1", "bob").await;

        let report = stack
            .broker()
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();

        assert_eq!(report, FanoutReport::default());
        assert!(stack.transport.posts().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_reaches_every_registered_connection() {
        let stack = Stack::new();
        connect(&stack, "a1", "alice").await;
        connect(&stack, "b1", "bob").await;
        connect(&stack, "c1", "carol").await;

        let report = stack
            .broker()
            .process(&Event::new("notification", json!({"text": "maintenance"})))
            .await
            .unwrap();

        assert_eq!(report.delivered, 3);
        assert_eq!(stack.transport.attempted(), ids(&["a1", "b1", "c1"]));
    }

    #[tokio::test]
    async fn test_transient_failure_is_isolated() {
        let stack = Stack::new();
        connect(&stack, "c1", "alice").await;
        connect(&stack, "c2", "alice").await;
        connect(&stack, "c3", "alice").await;
        stack.transport.script("c2", Script::Fail);

        let report = stack
            .broker()
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(stack.transport.attempted(), ids(&["c1", "c2", "c3"]));
        // A transient failure leaves the connection registered
        assert!(stack
            .registry
            .get(&ConnectionId::from("c2"))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_connection_does_not_serialize_delivery() {
        let stack = Stack::new();
        connect(&stack, "c1", "alice").await;
        connect(&stack, "c2", "alice").await;
        stack.transport.script("c1", Script::Slow(Duration::from_secs(10)));
        stack.transport.script("c2", Script::Slow(Duration::from_secs(10)));

        let started = tokio::time::Instant::now();
        let report = stack
            .broker()
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert!(started.elapsed() < Duration::from_secs(20));
    }

    #[tokio::test]
    async fn test_gone_connection_is_evicted() {
        let stack = Stack::new();
        connect(&stack, "c1", "alice").await;
        connect(&stack, "c2", "alice").await;
        stack.transport.script("c1", Script::Gone);

        let report = stack
            .broker()
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();

        assert_eq!(report.gone, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(
            stack
                .registry
                .connections_for(&IdentityName::from("alice"))
                .await
                .unwrap(),
            ids(&["c2"])
        );
        assert!(!stack.store.contains_key("t:conn:c1"));
    }

    #[tokio::test]
    async fn test_gone_during_broadcast_is_evicted() {
        let stack = Stack::new();
        connect(&stack, "c1", "alice").await;
        stack.transport.script("c1", Script::Gone);

        let report = stack
            .broker()
            .process(&Event::new("notification", json!(null)))
            .await
            .unwrap();

        assert_eq!(report.gone, 1);
        assert!(stack.store.is_empty());
    }

    #[tokio::test]
    async fn test_eviction_failure_does_not_fail_event() {
        let stack = Stack::new();
        connect(&stack, "c1", "alice").await;
        stack.transport.script("c1", Script::Gone);

        let failing = FailingStore::new(stack.store.clone());
        failing.fail_writes_to("t:");
        let registry = ConnectionRegistry::new(Arc::new(failing), stack.keys.clone());
        let broker = FanoutBroker::new(
            registry,
            PushSender::new(Arc::new(stack.transport.clone())),
            stack.session_cache(),
        );

        let report = broker
            .process(&Event::new("chat", json!("hi")).to("alice"))
            .await
            .unwrap();
        assert_eq!(report.gone, 1);
    }

    #[tokio::test]
    async fn test_session_created_invalidates_then_delivers() {
        let stack = Stack::new();
        connect(&stack, "b1", "bob").await;
        let bob = IdentityName::from("bob");
        stack
            .session_cache()
            .put(&bob, "p1", &vec!["old"])
            .await
            .unwrap();

        let event = Event::new("sessions", json!({"event": "created", "sessionId": "sX"}))
            .to("bob")
            .with_project("p1");
        let report = stack.broker().process(&event).await.unwrap();

        assert_eq!(report.delivered, 1);
        assert!(!stack.store.contains_key("t:sessions:bob:p1"));

        // Redelivery leaves the cache in the same state
        let before = stack.store.len();
        stack.broker().process(&event).await.unwrap();
        assert_eq!(stack.store.len(), before);
        assert!(!stack.store.contains_key("t:sessions:bob:p1"));
    }

    #[tokio::test]
    async fn test_hook_failure_does_not_block_delivery() {
        let stack = Stack::new();
        connect(&stack, "b1", "bob").await;

        let failing = FailingStore::new(stack.store.clone());
        failing.fail_writes_to("t:sessions:");
        let broker = FanoutBroker::new(
            stack.registry.clone(),
            PushSender::new(Arc::new(stack.transport.clone())),
            SessionListCache::new(Arc::new(failing), stack.keys.clone()),
        );

        let event = Event::new("sessions", json!({"event": "created"}))
            .to("bob")
            .with_project("p1");
        let report = broker.process(&event).await.unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_unreachable_registry_fails_event() {
        let stack = Stack::new();
        let failing = FailingStore::new(stack.store.clone());
        failing.fail_reads_to("t:");
        let broker = FanoutBroker::new(
            ConnectionRegistry::new(Arc::new(failing), stack.keys.clone()),
            PushSender::new(Arc::new(stack.transport.clone())),
            stack.session_cache(),
        );

        let message = QueuedMessage {
            receipt: Receipt("1-0".to_string()),
            body: Event::new("chat", json!("hi")).to("alice").encode(4096).unwrap(),
            redelivered: false,
        };
        assert!(broker.handle_message(&message).await.is_err());
    }

    #[tokio::test]
    async fn test_undecodable_message_is_discarded() {
        let stack = Stack::new();
        let message = QueuedMessage {
            receipt: Receipt("1-0".to_string()),
            body: "{not json".to_string(),
            redelivered: true,
        };

        assert_eq!(
            stack.broker().handle_message(&message).await.unwrap(),
            Handled::Discarded
        );
    }
}
