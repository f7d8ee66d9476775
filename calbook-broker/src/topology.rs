use calbook_core::constants::{DEFAULT_EXCHANGE, DEFAULT_QUEUE, DEFAULT_ROUTING_KEY};

/// Where messages go: a durable direct exchange bound to a durable queue.
///
/// Producers and consumers both declare the full topology before use, so
/// either side may start first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Topology {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Topology::new(DEFAULT_EXCHANGE, DEFAULT_QUEUE, DEFAULT_ROUTING_KEY)
    }
}
