use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{EventQueue, QueuedMessage, Receipt};
use crate::Result;

struct InFlight {
    body: String,
    visible_at: Instant,
}

#[derive(Default)]
struct State {
    ready: VecDeque<(String, String, bool)>,
    in_flight: HashMap<String, InFlight>,
}

/// In-process queue with the same visibility-timeout contract as the Redis
/// stream queue. Single node only.
#[derive(Clone)]
pub struct MemoryQueue {
    state: Arc<Mutex<State>>,
    notify: Arc<Notify>,
    next_id: Arc<AtomicU64>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    #[must_use]
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            notify: Arc::new(Notify::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            visibility_timeout,
        }
    }

    /// Messages waiting to be received
    pub async fn ready_len(&self) -> usize {
        self.state.lock().await.ready.len()
    }

    /// Messages received but not yet acknowledged
    pub async fn in_flight_len(&self) -> usize {
        self.state.lock().await.in_flight.len()
    }

    fn take_ready(&self, state: &mut State, max: usize) -> Vec<QueuedMessage> {
        let now = Instant::now();

        // Expired leases go back to the front of the queue
        let expired: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, lease)| lease.visible_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(lease) = state.in_flight.remove(&id) {
                state.ready.push_front((id, lease.body, true));
            }
        }

        let mut taken = Vec::new();
        while taken.len() < max {
            let Some((id, body, redelivered)) = state.ready.pop_front() else {
                break;
            };
            state.in_flight.insert(
                id.clone(),
                InFlight {
                    body: body.clone(),
                    visible_at: now + self.visibility_timeout,
                },
            );
            taken.push(QueuedMessage {
                receipt: Receipt(id),
                body,
                redelivered,
            });
        }
        taken
    }
}

#[async_trait]
impl EventQueue for MemoryQueue {
    async fn enqueue(&self, body: &str) -> Result<String> {
        let id = format!("mem-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        self.state
            .lock()
            .await
            .ready
            .push_back((id.clone(), body.to_string(), false));
        self.notify.notify_one();
        Ok(id)
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueuedMessage>> {
        let deadline = Instant::now() + wait;
        loop {
            // Register interest before checking so an enqueue in between is not missed
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().await;
                let taken = self.take_ready(&mut state, max);
                if !taken.is_empty() {
                    return Ok(taken);
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                // One last look so expired leases are picked up at the deadline
                let mut state = self.state.lock().await;
                return Ok(self.take_ready(&mut state, max));
            }
        }
    }

    async fn ack(&self, receipt: &Receipt) -> Result<()> {
        self.state.lock().await.in_flight.remove(&receipt.0);
        Ok(())
    }
}

impl std::fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("visibility_timeout", &self.visibility_timeout)
            .finish_non_exhaustive()
    }
}
