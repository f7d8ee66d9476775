use calbook_core::storage::{MemoryStorage, SqliteStorage};
use calbook_core::{Calendar, CalendarError, Event, EventStorage, Period};
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use std::sync::Arc;

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2020, 2, 29, hour, 0, 0).unwrap()
}

fn event(user: &str, start_hour: u32, hours: i64) -> Event {
    Event::new("meeting", user, at(start_hour), Duration::hours(hours))
        .with_description("cool meeting")
        .with_notify_before(Duration::hours(3))
}

async fn all_events<S: EventStorage>(calendar: &Calendar<S>, user: &str) -> Vec<Event> {
    calendar
        .list_events(user, at(0), at(0) + Duration::days(2))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_create_into_free_calendar_is_retrievable() {
    let calendar = Calendar::new(MemoryStorage::new());

    let id = calendar.create_event(&event("kira", 15, 2)).await.unwrap();
    assert!(!id.is_empty());

    let events = all_events(&calendar, "kira").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].title, "meeting");
    assert_eq!(events[0].notify_before, Duration::hours(3));
}

#[tokio::test]
async fn test_boundary_and_overlap_scenario() {
    let calendar = Calendar::new(MemoryStorage::new());
    calendar.create_event(&event("kira", 15, 2)).await.unwrap();

    // Touching the end of 15:00-17:00 is fine.
    calendar.create_event(&event("kira", 17, 2)).await.unwrap();

    for (start, hours, label) in [(14, 2, "high half"), (16, 2, "low half"), (15, 2, "full")] {
        let err = calendar
            .create_event(&event("kira", start, hours))
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::TimeBusy), "{label}: {err}");
    }

    assert_eq!(all_events(&calendar, "kira").await.len(), 2);
}

#[tokio::test]
async fn test_other_users_do_not_conflict() {
    let calendar = Calendar::new(MemoryStorage::new());
    calendar.create_event(&event("kira", 15, 2)).await.unwrap();
    calendar.create_event(&event("bob", 15, 2)).await.unwrap();

    assert_eq!(all_events(&calendar, "bob").await.len(), 1);
}

#[tokio::test]
async fn test_update_into_busy_time_fails() {
    let calendar = Calendar::new(MemoryStorage::new());
    let first = calendar.create_event(&event("kira", 11, 2)).await.unwrap();
    calendar.create_event(&event("kira", 16, 2)).await.unwrap();

    let err = calendar
        .update_event(&first, &event("kira", 15, 2))
        .await
        .unwrap_err();
    assert!(matches!(err, CalendarError::TimeBusy));

    let events = all_events(&calendar, "kira").await;
    let unchanged = events.iter().find(|e| e.id == first).unwrap();
    assert_eq!(unchanged.start, at(11));
}

#[tokio::test]
async fn test_update_may_overlap_its_own_old_slot() {
    let calendar = Calendar::new(MemoryStorage::new());
    let id = calendar.create_event(&event("kira", 15, 2)).await.unwrap();

    calendar.update_event(&id, &event("kira", 16, 2)).await.unwrap();

    let events = all_events(&calendar, "kira").await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].id, id);
    assert_eq!(events[0].start, at(16));
}

#[tokio::test]
async fn test_update_unknown_id_is_not_found() {
    let calendar = Calendar::new(MemoryStorage::new());
    calendar.create_event(&event("kira", 16, 2)).await.unwrap();

    let err = calendar
        .update_event("missing", &event("kira", 9, 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CalendarError::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn test_update_checks_against_the_new_owner() {
    let calendar = Calendar::new(MemoryStorage::new());
    let id = calendar.create_event(&event("kira", 9, 1)).await.unwrap();

    // The id is looked up among bob's events, where it does not exist.
    let err = calendar.update_event(&id, &event("bob", 9, 1)).await.unwrap_err();
    assert!(matches!(err, CalendarError::NotFound(_)));
}

#[tokio::test]
async fn test_remove_event() {
    let calendar = Calendar::new(MemoryStorage::new());
    let id = calendar.create_event(&event("kira", 15, 2)).await.unwrap();

    calendar.remove_event(&id).await.unwrap();
    assert!(all_events(&calendar, "kira").await.is_empty());

    let err = calendar.remove_event(&id).await.unwrap_err();
    assert!(matches!(err, CalendarError::NotFound(_)));

    // The slot is free again.
    calendar.create_event(&event("kira", 15, 2)).await.unwrap();
}

#[tokio::test]
async fn test_invalid_event_is_rejected_before_storage() {
    let calendar = Calendar::new(MemoryStorage::new());
    let mut bad = event("kira", 15, 2);
    bad.duration = Duration::hours(-1);

    let err = calendar.create_event(&bad).await.unwrap_err();
    assert!(matches!(err, CalendarError::InvalidEvent(_)));
    assert!(calendar.storage().is_empty().await);
}

#[tokio::test]
async fn test_pre_epoch_event_cannot_hide_from_conflict_checks() {
    let calendar = Calendar::new(MemoryStorage::new());
    let night_before = Event::new(
        "party",
        "kira",
        Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap(),
        Duration::hours(3),
    );

    let err = calendar.create_event(&night_before).await.unwrap_err();
    assert!(matches!(err, CalendarError::InvalidEvent(_)));

    let first_hour = Event::new(
        "party",
        "kira",
        DateTime::<Utc>::UNIX_EPOCH,
        Duration::hours(1),
    );
    calendar.create_event(&first_hour).await.unwrap();
    assert_eq!(calendar.storage().len().await, 1);
}

#[tokio::test]
async fn test_list_period() {
    let calendar = Calendar::new(MemoryStorage::new());
    calendar.create_event(&event("kira", 15, 1)).await.unwrap();
    let next_week = Event::new(
        "retro",
        "kira",
        Utc.with_ymd_and_hms(2020, 3, 5, 10, 0, 0).unwrap(),
        Duration::hours(1),
    );
    calendar.create_event(&next_week).await.unwrap();

    let date = NaiveDate::from_ymd_opt(2020, 2, 29).unwrap();
    let day = calendar.list_period("kira", Period::Day, date).await.unwrap();
    assert_eq!(day.len(), 1);

    let week = calendar.list_period("kira", Period::Week, date).await.unwrap();
    assert_eq!(week.len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_overlapping_creates_admit_one() {
    let calendar = Arc::new(Calendar::new(Arc::new(SqliteStorage::open_in_memory().unwrap())));

    let mut tasks = Vec::new();
    for start in [15, 16, 15, 16] {
        let calendar = Arc::clone(&calendar);
        tasks.push(tokio::spawn(async move {
            calendar.create_event(&event("kira", start, 2)).await
        }));
    }

    let mut created = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(CalendarError::TimeBusy) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(all_events(&*calendar, "kira").await.len(), 1);
}
