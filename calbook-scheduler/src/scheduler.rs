use calbook_broker::{BrokerError, Producer};
use calbook_core::{CalendarResult, EventStorage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinError;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::error::{SchedulerError, SchedulerResult};

/// Outcome of one pass over the due reminders.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Reminders popped from storage.
    pub due: usize,
    pub published: usize,
    /// Popped but not published; these are not retried.
    pub dropped: usize,
}

pub struct Scheduler<S> {
    storage: Arc<S>,
    producer: Arc<Producer>,
    interval: Duration,
    stop: watch::Sender<bool>,
    tick_lock: Mutex<()>,
}

impl<S: EventStorage> Scheduler<S> {
    pub fn new(storage: Arc<S>, producer: Arc<Producer>, interval: Duration) -> Self {
        Scheduler {
            storage,
            producer,
            interval,
            stop: watch::Sender::new(false),
            tick_lock: Mutex::new(()),
        }
    }

    pub fn producer(&self) -> &Arc<Producer> {
        &self.producer
    }

    /// Tick every interval until stopped or until the producer gives up.
    ///
    /// The producer's connection is supervised alongside; a fatal broker
    /// error ends the loop and is returned. The first tick fires one
    /// interval after start.
    pub async fn run(&self) -> SchedulerResult<()> {
        let mut supervisor = tokio::spawn({
            let producer = Arc::clone(&self.producer);
            async move { producer.keep_connection().await }
        });
        let mut stop = self.stop.subscribe();
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval = ?self.interval, "scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut stop) => break,
                joined = &mut supervisor => {
                    let outcome = supervision_outcome(joined);
                    match &outcome {
                        Ok(()) => info!("producer stopped, scheduler exiting"),
                        Err(e) => error!(error = %e, "producer failed, scheduler exiting"),
                    }
                    return outcome;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "skipping tick");
                    }
                }
            }
        }

        // Stopped: the producer winds down through `stop`.
        supervision_outcome(supervisor.await)
    }

    /// Publish every reminder due before `now`.
    ///
    /// Reminders are marked as sent when popped, so a failed publish drops
    /// the reminder instead of repeating it on the next tick. Once `stop`
    /// has been called nothing is popped.
    pub async fn tick(&self, now: DateTime<Utc>) -> CalendarResult<TickReport> {
        let _in_flight = self.tick_lock.lock().await;
        if *self.stop.borrow() {
            debug!("stopping, tick skipped");
            return Ok(TickReport::default());
        }

        let due = self.storage.pop_due_notifications(now).await?;
        let mut report = TickReport {
            due: due.len(),
            ..TickReport::default()
        };

        for event in &due {
            let payload = match serde_json::to_vec(event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "dropping notification: serialization failed");
                    report.dropped += 1;
                    continue;
                }
            };

            match self.producer.publish(&payload).await {
                Ok(()) => {
                    debug!(event_id = %event.id, user = %event.user, "notification published");
                    report.published += 1;
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "dropping notification: publish failed");
                    report.dropped += 1;
                }
            }
        }

        if report.due > 0 {
            info!(
                due = report.due,
                published = report.published,
                dropped = report.dropped,
                "tick finished"
            );
        }
        Ok(report)
    }

    /// Stop ticking, close the producer once its in-flight publish is done,
    /// then wait for the running tick to finish.
    pub async fn stop(&self) -> SchedulerResult<()> {
        self.stop.send_replace(true);
        self.producer.graceful_stop().await?;
        let _idle = self.tick_lock.lock().await;
        Ok(())
    }
}

fn supervision_outcome(
    joined: Result<Result<(), BrokerError>, JoinError>,
) -> SchedulerResult<()> {
    match joined {
        Ok(Ok(())) | Ok(Err(BrokerError::Stopped)) => Ok(()),
        Ok(Err(e)) => Err(SchedulerError::Broker(e)),
        Err(e) => Err(SchedulerError::Supervisor(e.to_string())),
    }
}

async fn stopped(stop: &mut watch::Receiver<bool>) {
    loop {
        let stopping = *stop.borrow_and_update();
        if stopping || stop.changed().await.is_err() {
            return;
        }
    }
}
