use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{
    StreamAutoClaimOptions, StreamAutoClaimReply, StreamId, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use pushgate_core::config::QueueConfig;

use super::{EventQueue, QueuedMessage, Receipt};
use crate::{Error, Result};

/// Stream field holding the serialized event
const BODY_FIELD: &str = "body";

/// Redis Stream consumed through a consumer group.
///
/// Pending entries that stay un-acknowledged past the visibility timeout are
/// taken over with `XAUTOCLAIM` by whichever consumer polls next. The stream
/// is never length-trimmed; an entry is deleted only once it is acknowledged.
#[derive(Clone)]
pub struct RedisStreamQueue {
    client: Client,
    conn: ConnectionManager,
    stream_key: String,
    group: String,
    consumer: String,
    visibility_timeout: Duration,
    op_timeout: Duration,
}

impl RedisStreamQueue {
    /// Connect and make sure the consumer group exists.
    pub async fn connect(
        redis_url: &str,
        config: &QueueConfig,
        consumer: impl Into<String>,
        op_timeout: Duration,
    ) -> Result<Self> {
        let client = Client::open(redis_url)?;
        let conn = tokio::time::timeout(op_timeout, ConnectionManager::new(client.clone()))
            .await
            .map_err(|_| Error::Timeout("connecting to Redis".to_string()))??;

        let queue = Self {
            client,
            conn,
            stream_key: config.stream_key.clone(),
            group: config.group.clone(),
            consumer: consumer.into(),
            visibility_timeout: Duration::from_millis(config.visibility_timeout_ms),
            op_timeout,
        };
        queue.ensure_group().await?;
        Ok(queue)
    }

    /// Create the stream and consumer group if missing.
    pub async fn ensure_group(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let created: redis::RedisResult<()> = self
            .bounded_raw(
                "XGROUP CREATE",
                conn.xgroup_create_mkstream(&self.stream_key, &self.group, "0"),
            )
            .await?;

        match created {
            Ok(()) => {
                info!(
                    stream = %self.stream_key,
                    group = %self.group,
                    "Created consumer group"
                );
                Ok(())
            }
            Err(e) if e.code() == Some("BUSYGROUP") => {
                debug!(group = %self.group, "Consumer group already exists");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn bounded_raw<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = T>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| Error::Timeout(format!("Redis {op}")))
    }

    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        Ok(self.bounded_raw(op, fut).await??)
    }

    fn to_messages(&self, entries: Vec<StreamId>, redelivered: bool) -> Vec<QueuedMessage> {
        entries
            .into_iter()
            .map(|entry| {
                // An empty body fails to decode and is acked away by the consumer
                let body = entry.get::<String>(BODY_FIELD).unwrap_or_else(|| {
                    warn!(
                        stream = %self.stream_key,
                        id = %entry.id,
                        "Stream entry without body field"
                    );
                    String::new()
                });
                QueuedMessage {
                    receipt: Receipt(entry.id),
                    body,
                    redelivered,
                }
            })
            .collect()
    }

    /// Take over entries another consumer left pending too long
    async fn claim_stale(&self, max: usize) -> Result<Vec<QueuedMessage>> {
        let mut conn = self.conn.clone();
        let min_idle_ms = u64::try_from(self.visibility_timeout.as_millis()).unwrap_or(u64::MAX);
        let reply: StreamAutoClaimReply = self
            .bounded(
                "XAUTOCLAIM",
                conn.xautoclaim_options(
                    &self.stream_key,
                    &self.group,
                    &self.consumer,
                    min_idle_ms,
                    "0-0",
                    StreamAutoClaimOptions::default().count(max),
                ),
            )
            .await?;

        if !reply.claimed.is_empty() {
            info!(
                consumer = %self.consumer,
                count = reply.claimed.len(),
                "Reclaimed stale queue entries"
            );
        }
        Ok(self.to_messages(reply.claimed, true))
    }

    async fn read_new(&self, max: usize, wait: Duration) -> Result<Vec<QueuedMessage>> {
        // Blocking reads get their own connection so they never stall the shared one
        let mut conn = self
            .bounded("connect", self.client.get_multiplexed_async_connection())
            .await?;
        let block_ms = usize::try_from(wait.as_millis()).unwrap_or(usize::MAX);
        let options = StreamReadOptions::default()
            .group(&self.group, &self.consumer)
            .count(max)
            .block(block_ms);

        let reply: Option<StreamReadReply> = tokio::time::timeout(
            self.op_timeout + wait,
            conn.xread_options(&[&self.stream_key], &[">"], &options),
        )
        .await
        .map_err(|_| Error::Timeout("Redis XREADGROUP".to_string()))??;

        Ok(reply
            .map(|reply| {
                reply
                    .keys
                    .into_iter()
                    .flat_map(|key| self.to_messages(key.ids, false))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[async_trait]
impl EventQueue for RedisStreamQueue {
    async fn enqueue(&self, body: &str) -> Result<String> {
        let mut conn = self.conn.clone();
        self.bounded(
            "XADD",
            conn.xadd(&self.stream_key, "*", &[(BODY_FIELD, body)]),
        )
        .await
    }

    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<QueuedMessage>> {
        let reclaimed = self.claim_stale(max).await?;
        if !reclaimed.is_empty() {
            return Ok(reclaimed);
        }
        self.read_new(max, wait).await
    }

    async fn ack(&self, receipt: &Receipt) -> Result<()> {
        let mut conn = self.conn.clone();
        let ids = [receipt.0.as_str()];
        let acked: usize = self
            .bounded("XACK", conn.xack(&self.stream_key, &self.group, &ids))
            .await?;
        if acked > 0 {
            let _: usize = self
                .bounded("XDEL", conn.xdel(&self.stream_key, &ids))
                .await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for RedisStreamQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamQueue")
            .field("stream_key", &self.stream_key)
            .field("group", &self.group)
            .field("consumer", &self.consumer)
            .field("visibility_timeout", &self.visibility_timeout)
            .finish_non_exhaustive()
    }
}
