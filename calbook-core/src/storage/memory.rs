//! In-memory storage engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{EventStorage, new_event_id};
use crate::error::{CalendarError, CalendarResult};
use crate::event::Event;

struct StoredEvent {
    event: Event,
    notified: bool,
}

/// Keeps events in a map behind one lock. Every operation holds the lock
/// for its whole duration, so `pop_due_notifications` is a single unit.
#[derive(Default)]
pub struct MemoryStorage {
    events: Mutex<HashMap<String, StoredEvent>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

#[async_trait]
impl EventStorage for MemoryStorage {
    async fn list_events(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<Event>> {
        let events = self.events.lock().await;

        Ok(events
            .values()
            .map(|stored| &stored.event)
            .filter(|e| e.user == user && from <= e.start && e.start < to)
            .cloned()
            .collect())
    }

    async fn create_event(&self, event: &Event) -> CalendarResult<String> {
        let id = new_event_id();
        let mut stored = event.clone();
        stored.id = id.clone();

        self.events.lock().await.insert(
            id.clone(),
            StoredEvent {
                event: stored,
                notified: false,
            },
        );
        Ok(id)
    }

    async fn update_event(&self, id: &str, event: &Event) -> CalendarResult<()> {
        let mut events = self.events.lock().await;
        let stored = events
            .get_mut(id)
            .ok_or_else(|| CalendarError::NotFound(id.to_string()))?;

        // A moved reminder has to fire again.
        if stored.event.notify_at() != event.notify_at() {
            stored.notified = false;
        }
        stored.event = Event {
            id: id.to_string(),
            ..event.clone()
        };
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> CalendarResult<()> {
        self.events
            .lock()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| CalendarError::NotFound(id.to_string()))
    }

    async fn pop_due_notifications(&self, now: DateTime<Utc>) -> CalendarResult<Vec<Event>> {
        let mut events = self.events.lock().await;

        let due = events
            .values_mut()
            .filter(|stored| !stored.notified && stored.event.notify_at() < now)
            .map(|stored| {
                stored.notified = true;
                stored.event.clone()
            })
            .collect();
        Ok(due)
    }
}
