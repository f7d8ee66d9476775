//! Exponential reconnect schedule with an elapsed-time budget.

use std::time::Duration;
use tokio::time::Instant;

/// Delays grow from `initial` by `multiplier` up to `max_interval`. A delay
/// that would push the total time spent past `max_elapsed` is never taken.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub multiplier: f64,
    pub max_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy {
            initial: Duration::from_secs(1),
            multiplier: 2.0,
            max_interval: Duration::from_secs(15),
            max_elapsed: Duration::from_secs(60),
        }
    }
}

impl BackoffPolicy {
    /// Start a schedule whose budget is measured from now.
    pub fn start(&self) -> Backoff {
        Backoff {
            policy: *self,
            next: self.initial.min(self.max_interval),
            started: Instant::now(),
            attempts: 0,
        }
    }

    /// The delays this policy yields when every attempt fails instantly.
    pub fn schedule(&self) -> Vec<Duration> {
        let mut backoff = self.start();
        let mut elapsed = Duration::ZERO;
        let mut delays = Vec::new();

        while let Some(delay) = backoff.next_delay_after(elapsed) {
            elapsed += delay;
            delays.push(delay);
        }
        delays
    }

    fn grow(&self, current: Duration) -> Duration {
        let multiplier = self.multiplier.max(1.0);
        let grown = current.as_secs_f64() * multiplier;
        if grown >= self.max_interval.as_secs_f64() {
            self.max_interval
        } else {
            Duration::from_secs_f64(grown)
        }
    }
}

/// One run of a [`BackoffPolicy`].
#[derive(Debug)]
pub struct Backoff {
    policy: BackoffPolicy,
    next: Duration,
    started: Instant,
    attempts: u32,
}

impl Backoff {
    /// The next delay, or `None` once the budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.next_delay_after(self.started.elapsed())
    }

    fn next_delay_after(&mut self, elapsed: Duration) -> Option<Duration> {
        let delay = self.next;
        if elapsed + delay > self.policy.max_elapsed {
            return None;
        }

        self.next = self.policy.grow(delay);
        self.attempts += 1;
        Some(delay)
    }

    /// Delays handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
