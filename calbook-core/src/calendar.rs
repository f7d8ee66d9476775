//! Conflict engine guarding event writes.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::date_range::{DateRange, Period};
use crate::error::{CalendarError, CalendarResult};
use crate::event::Event;
use crate::overlap::has_free_time;
use crate::storage::EventStorage;

/// Enforces that no two events of the same user overlap.
///
/// Create and update read the user's whole calendar, check the candidate
/// against it and then write. The read and the write are serialized per user
/// with an in-process lock, so two concurrent writers in this process can
/// never both pass the check. Several processes sharing one database are
/// not coordinated: each can still admit an overlapping event in the window
/// between its read and its write.
pub struct Calendar<S> {
    storage: S,
    locks: UserLocks,
}

impl<S: EventStorage> Calendar<S> {
    pub fn new(storage: S) -> Self {
        Calendar {
            storage,
            locks: UserLocks::default(),
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Store a new event if its time is free and return the assigned id.
    pub async fn create_event(&self, event: &Event) -> CalendarResult<String> {
        event.validate()?;
        let _guard = self.locks.acquire(&event.user).await;

        let existing = self.whole_calendar(&event.user).await?;
        if !has_free_time(&existing, event.start, event.end()) {
            tracing::debug!(user = %event.user, start = %event.start, "create rejected: time busy");
            return Err(CalendarError::TimeBusy);
        }

        let id = self.storage.create_event(event).await?;
        tracing::info!(%id, user = %event.user, start = %event.start, "event created");
        Ok(id)
    }

    /// Replace event `id` with `event`, re-checking the no-overlap rule
    /// against the user's other events.
    pub async fn update_event(&self, id: &str, event: &Event) -> CalendarResult<()> {
        event.validate()?;
        let _guard = self.locks.acquire(&event.user).await;

        let mut existing = self.whole_calendar(&event.user).await?;
        let position = existing
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| CalendarError::NotFound(id.to_string()))?;
        existing.swap_remove(position);

        if !has_free_time(&existing, event.start, event.end()) {
            tracing::debug!(%id, user = %event.user, "update rejected: time busy");
            return Err(CalendarError::TimeBusy);
        }

        self.storage.update_event(id, event).await?;
        tracing::info!(%id, user = %event.user, start = %event.start, "event updated");
        Ok(())
    }

    /// Removing an event cannot introduce an overlap, so nothing is checked.
    pub async fn remove_event(&self, id: &str) -> CalendarResult<()> {
        self.storage.delete_event(id).await?;
        tracing::info!(%id, "event removed");
        Ok(())
    }

    pub async fn list_events(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<Event>> {
        self.storage.list_events(user, from, to).await
    }

    /// Events of `user` in the day, week or month starting at `date`.
    pub async fn list_period(
        &self,
        user: &str,
        period: Period,
        date: NaiveDate,
    ) -> CalendarResult<Vec<Event>> {
        let range = DateRange::for_period(period, date)?;
        self.list_events(user, range.from, range.to).await
    }

    async fn whole_calendar(&self, user: &str) -> CalendarResult<Vec<Event>> {
        let horizon = DateRange::horizon();
        self.storage.list_events(user, horizon.from, horizon.to).await
    }
}

/// One async mutex per user. The guard returned by `acquire` releases the
/// user on drop, whichever way the caller returns.
#[derive(Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl UserLocks {
    async fn acquire(&self, user: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            // Forget users nobody is holding or waiting on.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(user.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}
