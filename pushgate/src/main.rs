mod http;
mod server;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};

use pushgate_broker::{
    BrokerWorkers, ConnectHandler, ConnectionRegistry, EventIngestor, EventQueue, FanoutBroker,
    HttpGatewayTransport, MemoryQueue, PushSender, RedisStreamQueue,
};
use pushgate_core::{
    logging, Config, IdentityCache, IdentityStore, KeyBuilder, KeyValueStore,
    MemoryIdentityStore, MemoryStore, PgIdentityStore, RedisStore, SessionListCache,
};

use http::AppState;
use server::PushgateServer;

#[derive(Parser, Debug)]
#[command(name = "pushgate")]
#[command(about = "Realtime push fan-out service", long_about = None)]
struct Args {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(long, short, env = "PUSHGATE_CONFIG")]
    config: Option<String>,

    /// Queue consumer name (auto-generated from hostname if not provided)
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,
}

/// Generate a unique consumer name for this instance
fn generate_node_id() -> String {
    let hostname = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());

    format!("{hostname}-{}", nanoid::nanoid!(6))
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        anyhow::bail!(
            "Configuration validation failed with {} error(s)",
            errors.len()
        );
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Pushgate starting...");
    info!("HTTP address: {}", config.http_address());

    let node_id = args
        .node_id
        .or_else(|| Some(config.queue.consumer.clone()).filter(|c| !c.is_empty()))
        .unwrap_or_else(generate_node_id);
    info!(node_id = %node_id, "Queue consumer name");

    // 3. Shared key-value store
    let store: Arc<dyn KeyValueStore> = if config.redis.url.is_empty() {
        warn!("Redis not configured, using in-process store (single node only)");
        Arc::new(MemoryStore::new())
    } else {
        Arc::new(
            RedisStore::connect(&config.redis.url, config.redis_timeout())
                .await
                .context("Failed to connect to Redis")?,
        )
    };
    let keys = KeyBuilder::from_config(&config);

    // 4. System of record for identities
    let records: Arc<dyn IdentityStore> = if config.database.url.is_empty() {
        warn!("Database not configured, no subject will resolve to an identity");
        Arc::new(MemoryIdentityStore::new())
    } else {
        Arc::new(
            PgIdentityStore::connect(&config.database)
                .await
                .context("Failed to connect to database")?,
        )
    };

    // 5. Event queue
    let queue: Arc<dyn EventQueue> = if config.redis.url.is_empty() {
        Arc::new(MemoryQueue::new(config.visibility_timeout()))
    } else {
        Arc::new(
            RedisStreamQueue::connect(
                &config.redis.url,
                &config.queue,
                node_id,
                config.redis_timeout(),
            )
            .await
            .context("Failed to set up Redis event stream")?,
        )
    };

    // 6. Services
    let registry = ConnectionRegistry::new(Arc::clone(&store), keys.clone());
    let identities = IdentityCache::new(
        Arc::clone(&store),
        records,
        keys.clone(),
        &config.identity_cache,
    );
    let sessions = SessionListCache::new(Arc::clone(&store), keys);
    let transport = HttpGatewayTransport::new(&config.transport)
        .context("Failed to create push gateway client")?;
    info!(endpoint = %config.transport.endpoint, "Push gateway configured");

    let broker = FanoutBroker::new(
        registry.clone(),
        PushSender::new(Arc::new(transport)),
        sessions,
    );
    let workers = BrokerWorkers::new(Arc::clone(&queue), broker, config.broker.clone());

    let state = AppState {
        connect: ConnectHandler::new(identities, registry),
        ingestor: EventIngestor::new(queue, config.queue.max_event_bytes),
    };

    // 7. Run until shutdown
    PushgateServer::new(config, state, workers).start().await
}
