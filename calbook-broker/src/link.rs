//! Connection supervision shared by the producer and the consumer.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock, mpsc, watch};
use tracing::{debug, info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::{BrokerError, BrokerResult};
use crate::state::ChannelState;
use crate::topology::Topology;
use crate::transport::{CloseNotice, CloseNotifier, CloseReason, Connector, Session};

pub(crate) enum LinkEvent {
    Closed(CloseReason),
    Shutdown,
}

pub(crate) struct Link {
    connector: Arc<dyn Connector>,
    topology: Topology,
    policy: BackoffPolicy,
    state: watch::Sender<ChannelState>,
    /// Readers are in-flight operations; taking the write lock waits for them.
    session: RwLock<Option<Arc<dyn Session>>>,
    generation: AtomicU64,
    notices_tx: mpsc::UnboundedSender<CloseNotice>,
    notices_rx: Mutex<mpsc::UnboundedReceiver<CloseNotice>>,
    stop: watch::Sender<bool>,
}

impl Link {
    pub fn new(connector: Arc<dyn Connector>, topology: Topology, policy: BackoffPolicy) -> Self {
        let (notices_tx, notices_rx) = mpsc::unbounded_channel();
        Link {
            connector,
            topology,
            policy,
            state: watch::Sender::new(ChannelState::Disconnected),
            session: RwLock::new(None),
            generation: AtomicU64::new(0),
            notices_tx,
            notices_rx: Mutex::new(notices_rx),
            stop: watch::Sender::new(false),
        }
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ChannelState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!(exchange = %self.topology.exchange, from = %previous, to = %state, "channel state changed");
        }
    }

    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop.subscribe()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop.borrow()
    }

    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    /// One connection attempt: connect, declare, then run `setup` on the
    /// fresh session.
    pub async fn establish<R, F, Fut>(&self, setup: F) -> BrokerResult<R>
    where
        F: Fn(Arc<dyn Session>) -> Fut,
        Fut: Future<Output = BrokerResult<R>>,
    {
        if self.is_stopping() {
            return Err(BrokerError::Stopped);
        }
        self.set_state(ChannelState::Connecting);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let notifier = CloseNotifier::new(generation, self.notices_tx.clone());

        let session = match self.connector.connect(notifier).await {
            Ok(session) => session,
            Err(e) => {
                self.set_state(ChannelState::Disconnected);
                return Err(e);
            }
        };

        let prepared = match session.declare(&self.topology).await {
            Ok(()) => setup(Arc::clone(&session)).await,
            Err(e) => Err(e),
        };
        let value = match prepared {
            Ok(value) => value,
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    debug!(error = %close_err, "closing half-open session failed");
                }
                self.set_state(ChannelState::Disconnected);
                return Err(e);
            }
        };

        let mut slot = self.session.write().await;
        if self.is_stopping() {
            drop(slot);
            if let Err(e) = session.close().await {
                debug!(error = %e, "closing session opened during shutdown failed");
            }
            self.set_state(ChannelState::Stopped);
            return Err(BrokerError::Stopped);
        }
        *slot = Some(session);
        self.set_state(ChannelState::Connected);
        Ok(value)
    }

    /// Reconnect with backoff until an attempt succeeds, the budget runs out
    /// or a stop is requested.
    pub async fn reestablish<R, F, Fut>(&self, setup: F) -> BrokerResult<R>
    where
        F: Fn(Arc<dyn Session>) -> Fut,
        Fut: Future<Output = BrokerResult<R>>,
    {
        let mut backoff = self.policy.start();
        let mut stop = self.stop_signal();

        loop {
            let Some(delay) = backoff.next_delay() else {
                self.set_state(ChannelState::Failed);
                return Err(BrokerError::ReconnectExhausted {
                    attempts: backoff.attempts(),
                    elapsed: backoff.elapsed(),
                });
            };

            info!(
                exchange = %self.topology.exchange,
                attempt = backoff.attempts(),
                delay_ms = delay.as_millis() as u64,
                "reconnecting to broker"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = stopped(&mut stop) => return Err(BrokerError::Stopped),
            }

            match self.establish(&setup).await {
                Ok(value) => return Ok(value),
                Err(BrokerError::Stopped) => return Err(BrokerError::Stopped),
                Err(e) => warn!(error = %e, "reconnect attempt failed"),
            }
        }
    }

    /// Wait for the current connection to close or for a stop request.
    pub async fn next_event(&self) -> LinkEvent {
        let mut notices = self.notices_rx.lock().await;
        let mut stop = self.stop_signal();

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => return LinkEvent::Shutdown,
                notice = notices.recv() => match notice {
                    Some(notice) if notice.generation == self.generation.load(Ordering::SeqCst) => {
                        return LinkEvent::Closed(notice.reason);
                    }
                    Some(notice) => {
                        debug!(generation = notice.generation, "ignoring close notice from a replaced connection");
                    }
                    None => return LinkEvent::Shutdown,
                },
            }
        }
    }

    /// Forget a session whose connection is already gone.
    pub async fn mark_disconnected(&self) {
        self.session.write().await.take();
        self.set_state(ChannelState::Disconnected);
    }

    /// Run `op` against the live session, or fail with `NotConnected`
    /// without waiting for a reconnect.
    pub async fn with_session<R, F, Fut>(&self, op: F) -> BrokerResult<R>
    where
        F: FnOnce(Arc<dyn Session>) -> Fut,
        Fut: Future<Output = BrokerResult<R>>,
    {
        if self.state() != ChannelState::Connected {
            return Err(BrokerError::NotConnected);
        }
        let slot = self.session.read().await;
        let session = slot.as_ref().map(Arc::clone).ok_or(BrokerError::NotConnected)?;
        op(session).await
    }

    /// Close the live session, waiting for in-flight operations first.
    pub async fn close_session(&self) -> BrokerResult<()> {
        let session = self.session.write().await.take();
        let result = match session {
            Some(session) => session.close().await,
            None => Ok(()),
        };
        if self.state() != ChannelState::Failed {
            self.set_state(ChannelState::Stopped);
        }
        result
    }

    /// Stop supervising and close the live session.
    pub async fn shutdown(&self) -> BrokerResult<()> {
        self.request_stop();
        self.close_session().await
    }

    /// The broker closed the connection cleanly.
    pub async fn finish(&self) {
        self.request_stop();
        self.session.write().await.take();
        self.set_state(ChannelState::Stopped);
    }
}

/// Resolves once a stop has been requested or the sender is gone.
pub(crate) async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *stop.borrow_and_update();
        if stopping {
            return;
        }
        if stop.changed().await.is_err() {
            return;
        }
    }
}
