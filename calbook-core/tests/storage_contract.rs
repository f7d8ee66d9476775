//! Behaviour every storage engine must share.

use calbook_core::storage::{MemoryStorage, SqliteStorage};
use calbook_core::{CalendarError, Event, EventStorage};
use chrono::{DateTime, Duration, TimeZone, Utc};

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 2, 29, hour, 0, 0).unwrap()
}

fn event(user: &str, start_hour: u32, notify_hours: i64) -> Event {
    Event::new("meeting", user, at(start_hour), Duration::hours(1))
        .with_notify_before(Duration::hours(notify_hours))
}

async fn lists_by_user_and_half_open_range(storage: &impl EventStorage) {
    storage.create_event(&event("kira", 10, 1)).await.unwrap();
    storage.create_event(&event("kira", 12, 1)).await.unwrap();
    storage.create_event(&event("bob", 10, 1)).await.unwrap();

    let events = storage.list_events("kira", at(10), at(12)).await.unwrap();
    assert_eq!(events.len(), 1, "start == to is excluded");
    assert_eq!(events[0].start, at(10));
    assert_eq!(events[0].user, "kira");
}

async fn create_assigns_fresh_ids(storage: &impl EventStorage) {
    let first = storage.create_event(&event("kira", 10, 1)).await.unwrap();
    let second = storage.create_event(&event("kira", 10, 1)).await.unwrap();
    assert_ne!(first, second);
}

async fn update_and_delete_unknown_ids(storage: &impl EventStorage) {
    let err = storage.update_event("nope", &event("kira", 10, 1)).await.unwrap_err();
    assert!(matches!(err, CalendarError::NotFound(_)));

    let err = storage.delete_event("nope").await.unwrap_err();
    assert!(matches!(err, CalendarError::NotFound(_)));
}

async fn update_replaces_fields(storage: &impl EventStorage) {
    let id = storage.create_event(&event("kira", 10, 1)).await.unwrap();

    let changed = event("kira", 14, 2).with_description("moved");
    storage.update_event(&id, &changed).await.unwrap();

    let events = storage.list_events("kira", at(0), at(23)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].start, at(14));
    assert_eq!(events[0].description, "moved");
    assert_eq!(events[0].notify_before, Duration::hours(2));
}

async fn pop_never_returns_an_event_twice(storage: &impl EventStorage) {
    // notify_at: 09:00 and 11:00
    let early = storage.create_event(&event("kira", 10, 1)).await.unwrap();
    storage.create_event(&event("kira", 12, 1)).await.unwrap();

    let due = storage.pop_due_notifications(at(10)).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, early);

    assert!(storage.pop_due_notifications(at(10)).await.unwrap().is_empty());

    let later = storage.pop_due_notifications(at(12)).await.unwrap();
    assert_eq!(later.len(), 1);
    assert_ne!(later[0].id, early);

    assert!(storage.pop_due_notifications(at(23)).await.unwrap().is_empty());
}

async fn pop_uses_strict_comparison(storage: &impl EventStorage) {
    storage.create_event(&event("kira", 10, 1)).await.unwrap();

    assert!(storage.pop_due_notifications(at(9)).await.unwrap().is_empty());
    assert_eq!(
        storage
            .pop_due_notifications(at(9) + Duration::milliseconds(1))
            .await
            .unwrap()
            .len(),
        1
    );
}

async fn moving_the_reminder_rearms_it(storage: &impl EventStorage) {
    let id = storage.create_event(&event("kira", 10, 1)).await.unwrap();
    assert_eq!(storage.pop_due_notifications(at(10)).await.unwrap().len(), 1);

    // Same reminder instant: stays notified.
    storage
        .update_event(&id, &event("kira", 10, 1).with_description("renamed"))
        .await
        .unwrap();
    assert!(storage.pop_due_notifications(at(23)).await.unwrap().is_empty());

    // Different reminder instant: due again.
    storage.update_event(&id, &event("kira", 15, 1)).await.unwrap();
    let due = storage.pop_due_notifications(at(23)).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].id, id);
}

macro_rules! storage_contract {
    ($engine:ident, $make:expr) => {
        mod $engine {
            use super::*;

            #[tokio::test]
            async fn test_lists_by_user_and_half_open_range() {
                lists_by_user_and_half_open_range(&$make).await;
            }

            #[tokio::test]
            async fn test_create_assigns_fresh_ids() {
                create_assigns_fresh_ids(&$make).await;
            }

            #[tokio::test]
            async fn test_update_and_delete_unknown_ids() {
                update_and_delete_unknown_ids(&$make).await;
            }

            #[tokio::test]
            async fn test_update_replaces_fields() {
                update_replaces_fields(&$make).await;
            }

            #[tokio::test]
            async fn test_pop_never_returns_an_event_twice() {
                pop_never_returns_an_event_twice(&$make).await;
            }

            #[tokio::test]
            async fn test_pop_uses_strict_comparison() {
                pop_uses_strict_comparison(&$make).await;
            }

            #[tokio::test]
            async fn test_moving_the_reminder_rearms_it() {
                moving_the_reminder_rearms_it(&$make).await;
            }
        }
    };
}

storage_contract!(memory, MemoryStorage::new());
storage_contract!(sqlite, SqliteStorage::open_in_memory().unwrap());

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("events.db");

    let id = {
        let storage = SqliteStorage::open(&path).unwrap();
        let id = storage.create_event(&event("kira", 10, 1)).await.unwrap();
        storage.pop_due_notifications(at(10)).await.unwrap();
        id
    };

    let storage = SqliteStorage::open(&path).unwrap();
    let events = storage.list_events("kira", at(0), at(23)).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(storage.is_notified(&id).unwrap(), Some(true));
    assert!(storage.pop_due_notifications(at(23)).await.unwrap().is_empty());
}
