//! Queue consumer tasks driving the fan-out broker

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pushgate_core::config::BrokerConfig;

use crate::fanout::{FanoutBroker, Handled};
use crate::queue::{EventQueue, QueuedMessage};

/// Initial backoff after a failed receive
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Maximum backoff after repeated receive failures
const MAX_BACKOFF_SECS: u64 = 30;

/// Pool of tasks that pull events off the queue and fan them out.
///
/// Messages are acknowledged only after processing finished (or the body
/// turned out to be undecodable); anything else is left for the queue to
/// redeliver.
pub struct BrokerWorkers {
    queue: Arc<dyn EventQueue>,
    broker: FanoutBroker,
    config: BrokerConfig,
    cancel_token: CancellationToken,
}

impl BrokerWorkers {
    pub fn new(queue: Arc<dyn EventQueue>, broker: FanoutBroker, config: BrokerConfig) -> Self {
        Self {
            queue,
            broker,
            config,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for external shutdown signaling
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    pub fn shutdown(&self) {
        info!("Shutting down broker workers");
        self.cancel_token.cancel();
    }

    /// Spawn the configured number of worker tasks
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        let count = self.config.workers.max(1);
        info!(workers = count, batch_size = self.config.batch_size, "Starting broker workers");

        (0..count)
            .map(|worker| {
                let queue = Arc::clone(&self.queue);
                let broker = self.broker.clone();
                let config = self.config.clone();
                let cancel = self.cancel_token.clone();
                tokio::spawn(async move { run_worker(worker, queue, broker, config, cancel).await })
            })
            .collect()
    }
}

async fn run_worker(
    worker: usize,
    queue: Arc<dyn EventQueue>,
    broker: FanoutBroker,
    config: BrokerConfig,
    cancel: CancellationToken,
) {
    let batch_size = config.batch_size.max(1);
    let poll_wait = Duration::from_millis(config.poll_wait_ms);
    let mut backoff_secs = INITIAL_BACKOFF_SECS;

    loop {
        let received = tokio::select! {
            () = cancel.cancelled() => break,
            received = queue.receive(batch_size, poll_wait) => received,
        };

        let messages = match received {
            Ok(messages) => {
                backoff_secs = INITIAL_BACKOFF_SECS;
                messages
            }
            Err(e) => {
                error!(
                    worker = worker,
                    error = %e,
                    backoff_secs = backoff_secs,
                    "Failed to receive from queue, retrying"
                );
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                }
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                continue;
            }
        };

        // A batch in hand is finished even when shutdown is requested meanwhile
        for message in &messages {
            handle(worker, queue.as_ref(), &broker, message).await;
        }
    }

    info!(worker = worker, "Broker worker stopped");
}

async fn handle(worker: usize, queue: &dyn EventQueue, broker: &FanoutBroker, message: &QueuedMessage) {
    match broker.handle_message(message).await {
        Ok(handled) => {
            if let Handled::Processed(report) = handled {
                debug!(worker = worker, receipt = %message.receipt, ?report, "Message processed");
            }
            if let Err(e) = queue.ack(&message.receipt).await {
                // The message comes back after the visibility timeout; processing is idempotent
                warn!(receipt = %message.receipt, error = %e, "Failed to acknowledge message");
            }
        }
        Err(e) => {
            warn!(
                worker = worker,
                receipt = %message.receipt,
                error = %e,
                "Processing failed, leaving message for redelivery"
            );
        }
    }
}
