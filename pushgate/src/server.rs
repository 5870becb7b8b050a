//! Server lifecycle management
//!
//! Runs the HTTP server and the broker worker pool side by side and shuts
//! both down on SIGTERM or Ctrl+C.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use pushgate_broker::BrokerWorkers;
use pushgate_core::Config;

use crate::http::{create_router, AppState};

pub struct PushgateServer {
    config: Config,
    state: AppState,
    workers: BrokerWorkers,
}

impl PushgateServer {
    pub const fn new(config: Config, state: AppState, workers: BrokerWorkers) -> Self {
        Self {
            config,
            state,
            workers,
        }
    }

    /// Start everything and wait for a shutdown signal
    pub async fn start(self) -> anyhow::Result<()> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let worker_handles = self.workers.start();
        let http_handle = self.start_http_server(shutdown_rx).await?;

        info!("All components started");

        tokio::select! {
            _ = http_handle => {
                error!("HTTP server stopped unexpectedly");
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
            }
        }

        let _ = shutdown_tx.send(true);

        // Workers finish the batch in hand; anything unacked is redelivered later
        self.workers.shutdown();
        for handle in worker_handles {
            if let Err(e) = handle.await {
                error!("Broker worker task failed: {}", e);
            }
        }

        info!("Pushgate shut down complete");
        Ok(())
    }

    async fn start_http_server(
        &self,
        shutdown_rx: watch::Receiver<bool>,
    ) -> anyhow::Result<JoinHandle<()>> {
        let http_address = self.config.http_address();
        let router = create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind HTTP address {http_address}: {e}"))?;
        info!("HTTP server listening on {}", http_address);

        let handle = tokio::spawn(async move {
            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        });

        Ok(handle)
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
