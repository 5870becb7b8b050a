pub mod error;
pub mod fanout;
pub mod hooks;
pub mod ingest;
pub mod lifecycle;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod workers;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use error::{Error, Result};
pub use fanout::{FanoutBroker, FanoutReport, Handled};
pub use hooks::Hook;
pub use ingest::EventIngestor;
pub use lifecycle::{ConnectAck, ConnectHandler, Registration};
pub use queue::{EventQueue, MemoryQueue, QueuedMessage, Receipt, RedisStreamQueue};
pub use registry::ConnectionRegistry;
pub use transport::{
    ChannelTransport, HttpGatewayTransport, PushError, PushSender, PushTransport, SendOutcome,
};
pub use workers::BrokerWorkers;
