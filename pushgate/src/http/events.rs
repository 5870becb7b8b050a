//! Internal event submission

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use pushgate_core::models::{Event, EventContext, EventId, IdentityName};

use super::{AppResult, AppState};

/// Producer-facing event shape; id and timestamp are assigned here
#[derive(Debug, Deserialize)]
pub struct SubmitEventRequest {
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, alias = "targetIdentity")]
    pub target_identity: Option<String>,
    #[serde(default)]
    pub context: EventContext,
}

impl From<SubmitEventRequest> for Event {
    fn from(req: SubmitEventRequest) -> Self {
        let mut event = Self::new(req.kind, req.payload);
        event.target_identity = req.target_identity.map(IdentityName::from);
        event.context = req.context;
        event
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitEventResponse {
    pub event_id: EventId,
}

/// `POST /events`
///
/// Accepted means enqueued, nothing more.
pub async fn submit(
    State(state): State<AppState>,
    body: Result<Json<SubmitEventRequest>, JsonRejection>,
) -> AppResult<(StatusCode, Json<SubmitEventResponse>)> {
    let Json(req) = body?;
    let event_id = state.ingestor.submit(Event::from(req)).await?;
    Ok((StatusCode::ACCEPTED, Json(SubmitEventResponse { event_id })))
}
