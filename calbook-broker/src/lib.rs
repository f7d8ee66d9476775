//! Message-broker channel that survives disconnects.
//!
//! A [`Producer`] publishes to one exchange/routing key; a [`Consumer`] runs
//! a fixed number of workers over one delivery stream. Both keep their
//! connection alive the same way:
//!
//! ```text
//! Disconnected ──connect──▶ Connecting ──ok──▶ Connected
//!      ▲                        │                  │
//!      │                        └──err─────────────┤ close notice (failure)
//!      └──────────── backoff 1s, 2s, 4s … 15s ◀────┘
//!                         budget spent ──▶ Failed
//! clean close / stop ──▶ Stopped
//! ```
//!
//! The broker itself sits behind the [`Connector`] / [`Session`] seam:
//! [`AmqpConnector`] talks to RabbitMQ, [`MemoryBroker`] runs in-process.

pub mod amqp;
pub mod backoff;
pub mod consumer;
pub mod error;
mod link;
pub mod memory;
pub mod producer;
pub mod state;
pub mod topology;
pub mod transport;

pub use amqp::AmqpConnector;
pub use backoff::{Backoff, BackoffPolicy};
pub use consumer::{Consumer, Handler};
pub use error::{BrokerError, BrokerResult};
pub use memory::MemoryBroker;
pub use producer::Producer;
pub use state::ChannelState;
pub use topology::Topology;
pub use transport::{Acknowledger, CloseNotifier, CloseReason, Connector, Deliveries, Delivery, Session};

/// Content type declared on every published message.
pub const CONTENT_TYPE_JSON: &str = "application/json";
