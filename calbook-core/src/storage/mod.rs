//! Storage contract the calendar depends on, and its engines.
//!
//! Engines own the persisted records, including the notification flag that
//! only `pop_due_notifications` may flip.

mod memory;
mod sqlite;

pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::CalendarResult;
use crate::event::Event;

#[async_trait]
pub trait EventStorage: Send + Sync {
    /// Events of `user` whose start lies in `[from, to)`, in no particular order.
    async fn list_events(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<Event>>;

    /// Persist `event` under a freshly generated id and return that id.
    async fn create_event(&self, event: &Event) -> CalendarResult<String>;

    /// Replace the event stored under `id`. Fails with `NotFound` if absent.
    async fn update_event(&self, id: &str, event: &Event) -> CalendarResult<()>;

    /// Fails with `NotFound` if absent.
    async fn delete_event(&self, id: &str) -> CalendarResult<()>;

    /// Atomically select every event with `notified = false` and
    /// `notify_at < now`, mark them notified, and return them.
    ///
    /// No event is ever returned by two calls. On failure nothing is marked.
    async fn pop_due_notifications(&self, now: DateTime<Utc>) -> CalendarResult<Vec<Event>>;
}

#[async_trait]
impl<S: EventStorage + ?Sized> EventStorage for Arc<S> {
    async fn list_events(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<Event>> {
        (**self).list_events(user, from, to).await
    }

    async fn create_event(&self, event: &Event) -> CalendarResult<String> {
        (**self).create_event(event).await
    }

    async fn update_event(&self, id: &str, event: &Event) -> CalendarResult<()> {
        (**self).update_event(id, event).await
    }

    async fn delete_event(&self, id: &str) -> CalendarResult<()> {
        (**self).delete_event(id).await
    }

    async fn pop_due_notifications(&self, now: DateTime<Utc>) -> CalendarResult<Vec<Event>> {
        (**self).pop_due_notifications(now).await
    }
}

/// Fresh opaque id for a new event.
pub(crate) fn new_event_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
