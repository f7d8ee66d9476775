//! The seam between the reconnect machinery and a concrete broker client.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::BrokerResult;
use crate::topology::Topology;

/// Why a connection went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Closed normally; the channel stops instead of reconnecting. Over AMQP
    /// this is a server close with reply code 200.
    Clean,
    Failure(String),
}

#[derive(Debug)]
pub(crate) struct CloseNotice {
    pub generation: u64,
    pub reason: CloseReason,
}

/// Handed to [`Connector::connect`]; the connector reports the close of the
/// connection it opened through it.
///
/// Each connection attempt gets its own generation, so notices from a
/// connection that has already been replaced are ignored.
#[derive(Debug, Clone)]
pub struct CloseNotifier {
    generation: u64,
    tx: mpsc::UnboundedSender<CloseNotice>,
}

impl CloseNotifier {
    pub(crate) fn new(generation: u64, tx: mpsc::UnboundedSender<CloseNotice>) -> Self {
        CloseNotifier { generation, tx }
    }

    pub fn notify(&self, reason: CloseReason) {
        // The receiver is gone once the channel itself is dropped.
        let _ = self.tx.send(CloseNotice {
            generation: self.generation,
            reason,
        });
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection and one channel on it.
    async fn connect(&self, notifier: CloseNotifier) -> BrokerResult<Arc<dyn Session>>;
}

/// One live connection plus its channel.
#[async_trait]
pub trait Session: Send + Sync {
    /// Declare exchange, queue and binding.
    async fn declare(&self, topology: &Topology) -> BrokerResult<()>;

    /// Cap the number of unacknowledged deliveries.
    async fn set_prefetch(&self, count: u16) -> BrokerResult<()>;

    async fn publish(&self, topology: &Topology, payload: &[u8]) -> BrokerResult<()>;

    /// Start consuming the topology's queue with manual acknowledgement.
    async fn consume(&self, topology: &Topology, consumer_tag: &str) -> BrokerResult<Deliveries>;

    /// Close the channel, then the connection.
    async fn close(&self) -> BrokerResult<()>;
}

pub type Deliveries = BoxStream<'static, BrokerResult<Delivery>>;

/// Settles a single delivery.
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self) -> BrokerResult<()>;

    /// Reject without requeueing.
    async fn reject(&self) -> BrokerResult<()>;
}

/// A received message that has to be acked or rejected exactly once.
pub struct Delivery {
    body: Vec<u8>,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(body: Vec<u8>, acker: impl Acknowledger + 'static) -> Self {
        Delivery {
            body,
            acker: Box::new(acker),
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub async fn ack(self) -> BrokerResult<()> {
        self.acker.ack().await
    }

    pub async fn reject(self) -> BrokerResult<()> {
        self.acker.reject().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("body", &String::from_utf8_lossy(&self.body))
            .finish_non_exhaustive()
    }
}
