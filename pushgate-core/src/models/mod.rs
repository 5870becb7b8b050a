pub mod connection;
pub mod event;
pub mod id;

pub use connection::ConnectionRecord;
pub use event::{ClientFrame, Event, EventContext, EventKind, SessionPayload, SessionPhase};
pub use id::{ConnectionId, EventId, IdentityName, SubjectId};
