//! Key layout shared by every worker.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};

use crate::models::{ConnectionId, IdentityName, SubjectId};
use crate::Config;

/// Characters escaped inside a key segment that sits next to another segment
const SEGMENT: &AsciiSet = &CONTROLS.add(b':').add(b'%');

/// Builds every key the push layer stores in the shared KV store.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    prefix: String,
}

impl KeyBuilder {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.redis.key_prefix.clone())
    }

    /// Connection record
    ///
    /// Type: String (JSON `ConnectionRecord`)
    #[must_use]
    pub fn connection(&self, connection_id: &ConnectionId) -> String {
        format!("{}:conn:{}", self.prefix, connection_id.as_str())
    }

    /// Pattern matching every connection record, for broadcast scans
    #[must_use]
    pub fn connection_pattern(&self) -> String {
        format!("{}:conn:*", self.prefix)
    }

    /// Recover the connection id from a connection record key
    #[must_use]
    pub fn connection_id_from_key(&self, key: &str) -> Option<ConnectionId> {
        key.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix(":conn:"))
            .filter(|id| !id.is_empty())
            .map(ConnectionId::from)
    }

    /// Identity → open connections index
    ///
    /// Type: Set
    /// Members: `connection_id`
    #[must_use]
    pub fn identity_connections(&self, identity: &IdentityName) -> String {
        format!("{}:identity:{}:conns", self.prefix, identity.as_str())
    }

    /// Identity cache entry (subject → identity name)
    ///
    /// Type: String, no TTL
    #[must_use]
    pub fn subject_identity(&self, subject_id: &SubjectId) -> String {
        format!("{}:subject:{}", self.prefix, subject_id.as_str())
    }

    /// Derived session list for one identity inside one project
    ///
    /// Type: String (JSON), owned by the read-through cache
    ///
    /// Both segments are percent-encoded so a `:` in either one cannot shift
    /// the boundary between them.
    #[must_use]
    pub fn session_list(&self, identity: &IdentityName, project_id: &str) -> String {
        format!(
            "{}:sessions:{}:{}",
            self.prefix,
            utf8_percent_encode(identity.as_str(), SEGMENT),
            utf8_percent_encode(project_id, SEGMENT)
        )
    }
}

impl Default for KeyBuilder {
    fn default() -> Self {
        Self::new("pushgate")
    }
}
