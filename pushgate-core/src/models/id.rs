use nanoid::nanoid;
use serde::{Deserialize, Serialize};

/// Declares a transparent string identifier with the usual conversions.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Opaque id assigned by the transport to one open session
    ConnectionId
);

string_id!(
    /// Stable subject identifier from the authenticated caller
    SubjectId
);

string_id!(
    /// Resolved login name; the routing key for addressed delivery
    IdentityName
);

string_id!(
    /// Producer-side event id (nanoid)
    EventId
);

impl EventId {
    #[must_use]
    pub fn new() -> Self {
        Self(nanoid!(16))
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}
