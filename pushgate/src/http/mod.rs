//! HTTP surface: transport triggers, event submission, health and metrics

pub mod connections;
pub mod error;
pub mod events;
pub mod health;

use axum::{
    routing::{delete, post},
    Router,
};
use tower_http::trace::TraceLayer;

use pushgate_broker::{ConnectHandler, EventIngestor};

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone, Debug)]
pub struct AppState {
    pub connect: ConnectHandler,
    pub ingestor: EventIngestor,
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/connections", post(connections::connect))
        .route(
            "/connections/{connection_id}",
            delete(connections::disconnect),
        )
        .route("/events", post(events::submit))
        .merge(health::create_health_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
