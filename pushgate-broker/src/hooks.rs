//! Side effects run before an event is delivered.
//!
//! Every hook may run more than once for the same event, so each one must be
//! idempotent. A failing hook is logged and counted, never propagated.

use tracing::{debug, warn};

use pushgate_core::metrics::fanout::HOOK_FAILURES;
use pushgate_core::models::{Event, EventKind, IdentityName, SessionPayload, SessionPhase};
use pushgate_core::SessionListCache;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hook {
    /// Drop the cached session listing of `(identity, project)`
    InvalidateSessionList {
        identity: IdentityName,
        project_id: String,
    },
}

impl Hook {
    /// Hooks triggered by an event
    #[must_use]
    pub fn for_event(event: &Event) -> Vec<Self> {
        match &event.kind {
            EventKind::Sessions => session_hooks(event).into_iter().collect(),
            EventKind::Chat
            | EventKind::Notification
            | EventKind::Tables
            | EventKind::Documents
            | EventKind::Custom(_) => Vec::new(),
        }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InvalidateSessionList { .. } => "invalidate_session_list",
        }
    }

    /// Run the hook. Returns whether it succeeded.
    pub async fn run(&self, sessions: &SessionListCache) -> bool {
        let result = match self {
            Self::InvalidateSessionList {
                identity,
                project_id,
            } => sessions.invalidate(identity, project_id).await.map(|_| ()),
        };

        match result {
            Ok(()) => {
                debug!(hook = self.name(), "Hook ran");
                true
            }
            Err(e) => {
                HOOK_FAILURES.with_label_values(&[self.name()]).inc();
                warn!(hook = self.name(), error = %e, "Hook failed, continuing with delivery");
                false
            }
        }
    }
}

/// A session-created event addressed to an identity within a project
fn session_hooks(event: &Event) -> Option<Hook> {
    let payload = SessionPayload::from_value(&event.payload)?;
    if payload.event != SessionPhase::Created {
        return None;
    }
    let identity = event.target_identity.clone()?;
    let project_id = event.context.project_id.clone()?;
    Some(Hook::InvalidateSessionList {
        identity,
        project_id,
    })
}
