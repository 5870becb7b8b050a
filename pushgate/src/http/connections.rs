//! Connect and disconnect triggers from the push transport

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use pushgate_core::models::{ConnectionId, SubjectId};

use super::{AppError, AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    #[serde(alias = "connectionId")]
    pub connection_id: String,
    #[serde(alias = "subjectId")]
    pub subject_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConnectResponse {
    pub accepted: bool,
    pub registered: bool,
}

/// `POST /connections`
///
/// The connection is accepted whatever happens to its registration.
pub async fn connect(
    State(state): State<AppState>,
    body: Result<Json<ConnectRequest>, JsonRejection>,
) -> AppResult<Json<ConnectResponse>> {
    let Json(req) = body?;
    if req.connection_id.trim().is_empty() || req.subject_id.trim().is_empty() {
        return Err(AppError::bad_request(
            "connection_id and subject_id must not be empty",
        ));
    }

    let ack = state
        .connect
        .on_connect(
            ConnectionId::from(req.connection_id),
            SubjectId::from(req.subject_id),
        )
        .await;

    Ok(Json(ConnectResponse {
        accepted: ack.accepted,
        registered: ack.is_registered(),
    }))
}

/// `DELETE /connections/{connection_id}`
pub async fn disconnect(
    State(state): State<AppState>,
    Path(connection_id): Path<String>,
) -> AppResult<StatusCode> {
    state
        .connect
        .on_disconnect(&ConnectionId::from(connection_id))
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
