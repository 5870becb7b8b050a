use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{EventId, IdentityName};
use crate::{Error, Result};

/// Event kind tag.
///
/// Known kinds get their own variant so hook dispatch can match exhaustively;
/// anything else a producer sends is carried through as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    Sessions,
    Chat,
    Notification,
    Tables,
    Documents,
    Custom(String),
}

impl EventKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Sessions => "sessions",
            Self::Chat => "chat",
            Self::Notification => "notification",
            Self::Tables => "tables",
            Self::Documents => "documents",
            Self::Custom(kind) => kind,
        }
    }
}

impl From<String> for EventKind {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "sessions" => Self::Sessions,
            "chat" => Self::Chat,
            "notification" => Self::Notification,
            "tables" => Self::Tables,
            "documents" => Self::Documents,
            _ => Self::Custom(kind),
        }
    }
}

impl From<&str> for EventKind {
    fn from(kind: &str) -> Self {
        Self::from(kind.to_string())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Custom(kind) => kind,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form context attached by the producer, consumed by hooks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventContext {
    #[serde(
        default,
        alias = "projectId",
        skip_serializing_if = "Option::is_none"
    )]
    pub project_id: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A delivery unit placed on the queue. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub id: EventId,
    pub kind: EventKind,
    #[serde(default)]
    pub payload: Value,
    /// Absent means broadcast to every registered connection
    #[serde(
        default,
        alias = "targetIdentity",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_identity: Option<IdentityName>,
    #[serde(default)]
    pub context: EventContext,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Event {
    #[must_use]
    pub fn new(kind: impl Into<EventKind>, payload: Value) -> Self {
        Self {
            id: EventId::new(),
            kind: kind.into(),
            payload,
            target_identity: None,
            context: EventContext::default(),
            created_at: Utc::now(),
        }
    }

    /// Address the event to a single identity
    #[must_use]
    pub fn to(mut self, identity: impl Into<IdentityName>) -> Self {
        self.target_identity = Some(identity.into());
        self
    }

    #[must_use]
    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.context.project_id = Some(project_id.into());
        self
    }

    /// Check the event shape before it is enqueued.
    pub fn validate(&self) -> Result<()> {
        if self.kind.as_str().trim().is_empty() {
            return Err(Error::InvalidInput("event kind must not be empty".to_string()));
        }
        if let Some(target) = &self.target_identity {
            if target.as_str().trim().is_empty() {
                return Err(Error::InvalidInput(
                    "target identity must not be empty when present".to_string(),
                ));
            }
        }
        if let Some(project_id) = &self.context.project_id {
            if project_id.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "context project id must not be empty when present".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Serialize for the queue, enforcing the size limit.
    pub fn encode(&self, max_bytes: usize) -> Result<String> {
        self.validate()?;
        let body = serde_json::to_string(self)?;
        if body.len() > max_bytes {
            return Err(Error::InvalidInput(format!(
                "event is {} bytes, limit is {max_bytes}",
                body.len()
            )));
        }
        Ok(body)
    }

    pub fn decode(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Bytes pushed to each target connection
    pub fn client_frame(&self) -> Result<Vec<u8>> {
        let frame = ClientFrame {
            kind: self.kind.as_str(),
            payload: &self.payload,
        };
        Ok(serde_json::to_vec(&frame)?)
    }
}

/// Wire shape seen by clients
#[derive(Debug, Serialize)]
pub struct ClientFrame<'a> {
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub payload: &'a Value,
}

/// Lifecycle phase carried by `sessions` events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Created,
    Updated,
    Deleted,
    #[serde(other)]
    Other,
}

/// Payload of a `sessions` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub event: SessionPhase,
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,
}

impl SessionPayload {
    /// Returns `None` when the payload does not have the session shape.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}
