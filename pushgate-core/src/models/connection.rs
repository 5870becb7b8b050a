use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ConnectionId, IdentityName, SubjectId};

/// One open transport session as stored in the registry.
///
/// Written once at connect time and never updated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: ConnectionId,
    pub subject_id: SubjectId,
    pub identity_name: IdentityName,
    pub connected_at: DateTime<Utc>,
}

impl ConnectionRecord {
    #[must_use]
    pub fn new(
        connection_id: ConnectionId,
        subject_id: SubjectId,
        identity_name: IdentityName,
    ) -> Self {
        Self {
            connection_id,
            subject_id,
            identity_name,
            connected_at: Utc::now(),
        }
    }
}
