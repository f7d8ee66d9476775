//! In-process broker with a single queue.
//!
//! Used to run the scheduler and sender without RabbitMQ and to drive the
//! reconnect paths in tests: connections can be refused, severed or closed
//! cleanly from the broker side.

use async_trait::async_trait;
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tracing::debug;

use crate::error::{BrokerError, BrokerResult};
use crate::topology::Topology;
use crate::transport::{
    Acknowledger, CloseNotifier, CloseReason, Connector, Deliveries, Delivery, Session,
};

#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<BrokerState>,
    wakeup: Notify,
    released: Notify,
}

#[derive(Default)]
struct BrokerState {
    next_session: u64,
    connects: usize,
    refuse_connects: usize,
    hold_publishes: bool,
    held_publishes: usize,
    sessions: HashMap<u64, CloseNotifier>,
    declared: Vec<Topology>,
    prefetch: Option<u16>,
    queue: VecDeque<Vec<u8>>,
    published: Vec<Vec<u8>>,
    acked: Vec<Vec<u8>>,
    rejected: Vec<Vec<u8>>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.inner.lock().refuse_connects = count;
    }

    /// Drop every open connection as if the network went away.
    pub fn sever(&self) {
        self.close_all(CloseReason::Failure("connection reset by broker".into()));
    }

    /// Close every open connection normally.
    pub fn shutdown(&self) {
        self.close_all(CloseReason::Clean);
    }

    fn close_all(&self, reason: CloseReason) {
        let sessions: Vec<CloseNotifier> = {
            let mut state = self.inner.lock();
            state.sessions.drain().map(|(_, notifier)| notifier).collect()
        };
        for notifier in sessions {
            notifier.notify(reason.clone());
        }
        self.inner.wakeup.notify_waiters();
    }

    /// Park every publish until [`MemoryBroker::release_publishes`].
    pub fn hold_publishes(&self) {
        self.inner.lock().hold_publishes = true;
    }

    pub fn release_publishes(&self) {
        self.inner.lock().hold_publishes = false;
        self.inner.released.notify_waiters();
    }

    /// Publishes currently parked by [`MemoryBroker::hold_publishes`].
    pub fn held_publishes(&self) -> usize {
        self.inner.lock().held_publishes
    }

    /// Queue a raw message as if another publisher had sent it.
    pub fn inject(&self, body: impl Into<Vec<u8>>) {
        self.inner.lock().queue.push_back(body.into());
        self.inner.wakeup.notify_waiters();
    }

    /// Everything published through this broker, in order.
    pub fn published(&self) -> Vec<Vec<u8>> {
        self.inner.lock().published.clone()
    }

    pub fn acknowledged(&self) -> Vec<Vec<u8>> {
        self.inner.lock().acked.clone()
    }

    pub fn rejected(&self) -> Vec<Vec<u8>> {
        self.inner.lock().rejected.clone()
    }

    /// Messages waiting for a consumer.
    pub fn queued(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Successful connection attempts so far.
    pub fn connects(&self) -> usize {
        self.inner.lock().connects
    }

    pub fn open_connections(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn declared(&self) -> Vec<Topology> {
        self.inner.lock().declared.clone()
    }

    pub fn prefetch(&self) -> Option<u16> {
        self.inner.lock().prefetch
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self, session: u64) -> BrokerResult<MutexGuard<'_, BrokerState>> {
        let state = self.lock();
        if state.sessions.contains_key(&session) {
            Ok(state)
        } else {
            Err(BrokerError::Transport("connection is closed".into()))
        }
    }

    async fn publish_gate(&self) {
        let mut parked = false;
        loop {
            let released = self.released.notified();
            tokio::pin!(released);
            released.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.hold_publishes {
                    if parked {
                        state.held_publishes -= 1;
                    }
                    return;
                }
                if !parked {
                    state.held_publishes += 1;
                    parked = true;
                }
            }

            released.await;
        }
    }

    /// Next queued message for `session`, or `None` once it is closed.
    async fn next_message(&self, session: u64) -> Option<Vec<u8>> {
        loop {
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if !state.sessions.contains_key(&session) {
                    return None;
                }
                if let Some(body) = state.queue.pop_front() {
                    return Some(body);
                }
            }

            notified.await;
        }
    }
}

#[async_trait]
impl Connector for MemoryBroker {
    async fn connect(&self, notifier: CloseNotifier) -> BrokerResult<Arc<dyn Session>> {
        let mut state = self.inner.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(BrokerError::Transport("connection refused".into()));
        }

        state.next_session += 1;
        state.connects += 1;
        let id = state.next_session;
        state.sessions.insert(id, notifier);
        debug!(session = id, "memory broker accepted connection");

        Ok(Arc::new(MemorySession {
            id,
            inner: Arc::clone(&self.inner),
        }))
    }
}

struct MemorySession {
    id: u64,
    inner: Arc<Inner>,
}

#[async_trait]
impl Session for MemorySession {
    async fn declare(&self, topology: &Topology) -> BrokerResult<()> {
        let mut state = self.inner.ensure_open(self.id)?;
        if !state.declared.contains(topology) {
            state.declared.push(topology.clone());
        }
        Ok(())
    }

    async fn set_prefetch(&self, count: u16) -> BrokerResult<()> {
        self.inner.ensure_open(self.id)?.prefetch = Some(count);
        Ok(())
    }

    async fn publish(&self, _topology: &Topology, payload: &[u8]) -> BrokerResult<()> {
        self.inner.publish_gate().await;
        {
            let mut state = self.inner.ensure_open(self.id)?;
            state.published.push(payload.to_vec());
            state.queue.push_back(payload.to_vec());
        }
        self.inner.wakeup.notify_waiters();
        Ok(())
    }

    async fn consume(&self, _topology: &Topology, _consumer_tag: &str) -> BrokerResult<Deliveries> {
        drop(self.inner.ensure_open(self.id)?);

        let stream = futures::stream::unfold(
            (Arc::clone(&self.inner), self.id),
            |(inner, id)| async move {
                let body = inner.next_message(id).await?;
                let acker = MemoryAcker {
                    inner: Arc::clone(&inner),
                    body: body.clone(),
                };
                Some((Ok(Delivery::new(body, acker)), (inner, id)))
            },
        );
        Ok(stream.boxed())
    }

    async fn close(&self) -> BrokerResult<()> {
        self.inner.lock().sessions.remove(&self.id);
        self.inner.wakeup.notify_waiters();
        Ok(())
    }
}

struct MemoryAcker {
    inner: Arc<Inner>,
    body: Vec<u8>,
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&self) -> BrokerResult<()> {
        self.inner.lock().acked.push(self.body.clone());
        Ok(())
    }

    async fn reject(&self) -> BrokerResult<()> {
        self.inner.lock().rejected.push(self.body.clone());
        Ok(())
    }
}
