use async_trait::async_trait;
use calbook_core::constants::DEFAULT_PREFETCH;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{BrokerError, BrokerResult};
use crate::link::{Link, LinkEvent, stopped};
use crate::state::ChannelState;
use crate::topology::Topology;
use crate::transport::{CloseReason, Connector, Deliveries, Delivery, Session};

/// Receives decoded messages. A message is acknowledged once `handle`
/// returns.
#[async_trait]
pub trait Handler<T: Send + 'static>: Send + Sync + 'static {
    async fn handle(&self, message: T);
}

/// Consumes one queue with a fixed pool of workers, reconnecting on failure.
pub struct Consumer {
    link: Link,
    prefetch: u16,
    consumer_tag: String,
}

impl Consumer {
    pub fn new(connector: impl Connector, topology: Topology, policy: BackoffPolicy) -> Self {
        Consumer {
            link: Link::new(Arc::new(connector), topology, policy),
            prefetch: DEFAULT_PREFETCH,
            consumer_tag: String::new(),
        }
    }

    /// Overrides [`DEFAULT_PREFETCH`].
    pub fn with_prefetch(mut self, prefetch: u16) -> Self {
        self.prefetch = prefetch;
        self
    }

    /// Empty lets the broker pick a tag.
    pub fn with_consumer_tag(mut self, tag: impl Into<String>) -> Self {
        self.consumer_tag = tag.into();
        self
    }

    pub fn state(&self) -> ChannelState {
        self.link.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.link.subscribe_state()
    }

    /// Ask [`Consumer::consume`] to wind down. Workers finish the message
    /// they are handling and pull no more.
    pub fn stop(&self) {
        self.link.request_stop();
    }

    /// Run `workers` workers over the queue until stopped, a clean close,
    /// or the reconnect budget is spent.
    ///
    /// Messages that do not decode as `T` are rejected without requeue.
    /// Returns only after every worker has exited and the channel and
    /// connection are closed.
    pub async fn consume<T, H>(&self, workers: usize, handler: H) -> BrokerResult<()>
    where
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        let workers = workers.max(1);
        let handler = Arc::new(handler);
        let mut tasks = JoinSet::new();

        let setup = |session: Arc<dyn Session>| {
            let topology = self.link.topology().clone();
            let tag = self.consumer_tag.clone();
            let prefetch = self.prefetch;
            async move {
                session.set_prefetch(prefetch).await?;
                session.consume(&topology, &tag).await
            }
        };

        let deliveries = self.link.establish(&setup).await?;
        info!(
            queue = %self.link.topology().queue,
            workers,
            prefetch = self.prefetch,
            "consumer connected"
        );
        self.spawn_workers(&mut tasks, workers, deliveries, &handler);

        let result = loop {
            match self.link.next_event().await {
                LinkEvent::Shutdown => break Ok(()),
                LinkEvent::Closed(CloseReason::Clean) => {
                    info!("broker closed the consumer connection");
                    break Ok(());
                }
                LinkEvent::Closed(CloseReason::Failure(reason)) => {
                    warn!(%reason, "consumer connection lost");
                    self.link.mark_disconnected().await;

                    match self.link.reestablish(&setup).await {
                        Ok(deliveries) => {
                            info!("consumer reconnected");
                            self.spawn_workers(&mut tasks, workers, deliveries, &handler);
                        }
                        Err(BrokerError::Stopped) => break Ok(()),
                        Err(e) => {
                            error!(error = %e, "consumer giving up on broker");
                            break Err(e);
                        }
                    }
                }
            }
        };

        self.link.request_stop();
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "consumer worker panicked");
            }
        }
        if let Err(e) = self.link.close_session().await {
            warn!(error = %e, "closing consumer channel failed");
        }
        result
    }

    fn spawn_workers<T, H>(
        &self,
        tasks: &mut JoinSet<()>,
        count: usize,
        deliveries: Deliveries,
        handler: &Arc<H>,
    ) where
        T: DeserializeOwned + Send + 'static,
        H: Handler<T>,
    {
        let deliveries = Arc::new(Mutex::new(deliveries));
        for id in 0..count {
            let worker = Worker {
                id,
                deliveries: Arc::clone(&deliveries),
                handler: Arc::clone(handler),
                stop: self.link.stop_signal(),
                message: PhantomData,
            };
            tasks.spawn(worker.run());
        }
    }
}

struct Worker<T, H> {
    id: usize,
    deliveries: Arc<Mutex<Deliveries>>,
    handler: Arc<H>,
    stop: watch::Receiver<bool>,
    message: PhantomData<fn() -> T>,
}

impl<T, H> Worker<T, H>
where
    T: DeserializeOwned + Send + 'static,
    H: Handler<T>,
{
    async fn run(mut self) {
        loop {
            // Stop is only observed between messages.
            let next = tokio::select! {
                biased;
                _ = stopped(&mut self.stop) => break,
                next = next_delivery(&self.deliveries) => next,
            };

            match next {
                Some(Ok(delivery)) => self.process(delivery).await,
                Some(Err(e)) => {
                    warn!(worker = self.id, error = %e, "delivery stream failed");
                    break;
                }
                None => {
                    debug!(worker = self.id, "delivery stream ended");
                    break;
                }
            }
        }
    }

    async fn process(&self, delivery: Delivery) {
        match serde_json::from_slice::<T>(delivery.body()) {
            Ok(message) => {
                self.handler.handle(message).await;
                if let Err(e) = delivery.ack().await {
                    warn!(worker = self.id, error = %e, "failed to acknowledge delivery");
                }
            }
            Err(e) => {
                let err = BrokerError::MalformedMessage(e.to_string());
                warn!(
                    worker = self.id,
                    error = %err,
                    body = %String::from_utf8_lossy(delivery.body()),
                    "rejecting message"
                );
                if let Err(e) = delivery.reject().await {
                    warn!(worker = self.id, error = %e, "failed to reject delivery");
                }
            }
        }
    }
}

async fn next_delivery(deliveries: &Mutex<Deliveries>) -> Option<BrokerResult<Delivery>> {
    deliveries.lock().await.next().await
}
