use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{BrokerError, BrokerResult};
use crate::link::{Link, LinkEvent};
use crate::state::ChannelState;
use crate::topology::Topology;
use crate::transport::{CloseReason, Connector, Session};

/// Publishes to one exchange and routing key, reconnecting on failure.
///
/// Publishing never waits for a reconnect: while the channel is not
/// connected, [`Producer::publish`] fails with [`BrokerError::NotConnected`].
pub struct Producer {
    link: Link,
}

impl Producer {
    pub fn new(connector: impl Connector, topology: Topology, policy: BackoffPolicy) -> Self {
        Producer {
            link: Link::new(Arc::new(connector), topology, policy),
        }
    }

    pub fn state(&self) -> ChannelState {
        self.link.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.link.subscribe_state()
    }

    pub fn topology(&self) -> &Topology {
        self.link.topology()
    }

    /// Connect and stay connected until stopped.
    ///
    /// The first connection attempt is not retried. Later failures are
    /// retried with backoff; once the budget is spent this returns
    /// [`BrokerError::ReconnectExhausted`] and the state is `Failed`.
    pub async fn keep_connection(&self) -> BrokerResult<()> {
        self.link.establish(ready).await?;
        info!(exchange = %self.topology().exchange, "producer connected");

        loop {
            match self.link.next_event().await {
                LinkEvent::Shutdown => return Ok(()),
                LinkEvent::Closed(CloseReason::Clean) => {
                    info!("broker closed the producer connection");
                    self.link.finish().await;
                    return Ok(());
                }
                LinkEvent::Closed(CloseReason::Failure(reason)) => {
                    warn!(%reason, "producer connection lost");
                    self.link.mark_disconnected().await;

                    match self.link.reestablish(ready).await {
                        Ok(()) => info!("producer reconnected"),
                        Err(BrokerError::Stopped) => return Ok(()),
                        Err(e) => {
                            error!(error = %e, "producer giving up on broker");
                            return Err(e);
                        }
                    }
                }
            }
        }
    }

    pub async fn publish(&self, payload: &[u8]) -> BrokerResult<()> {
        let topology = self.link.topology();
        self.link
            .with_session(|session| async move { session.publish(topology, payload).await })
            .await
    }

    pub async fn publish_json<T: Serialize>(&self, message: &T) -> BrokerResult<()> {
        let payload =
            serde_json::to_vec(message).map_err(|e| BrokerError::Serialization(e.to_string()))?;
        self.publish(&payload).await
    }

    /// Stop reconnecting, let in-flight publishes finish, then close the
    /// channel and the connection.
    pub async fn graceful_stop(&self) -> BrokerResult<()> {
        self.link.shutdown().await
    }
}

fn ready(_session: Arc<dyn Session>) -> std::future::Ready<BrokerResult<()>> {
    std::future::ready(Ok(()))
}
