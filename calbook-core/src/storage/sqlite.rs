//! SQLite storage engine.
//!
//! Instants are stored as unix milliseconds and durations as seconds.
//! `notify_before` is not stored; it is recovered as `start - notify_at`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::{EventStorage, new_event_id};
use crate::error::{CalendarError, CalendarResult};
use crate::event::Event;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS events (
    id        TEXT PRIMARY KEY,
    title     TEXT NOT NULL,
    start_at  INTEGER NOT NULL,
    duration  INTEGER NOT NULL,
    descr     TEXT NOT NULL DEFAULT '',
    user_name TEXT NOT NULL,
    notify_at INTEGER NOT NULL,
    notified  INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS events_user_start ON events (user_name, start_at);
CREATE INDEX IF NOT EXISTS events_due ON events (notified, notify_at);
";

const EVENT_COLUMNS: &str = "id, title, start_at, duration, descr, user_name, notify_at";

pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the database file at `path`.
    pub fn open(path: &Path) -> CalendarResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CalendarError::Storage(format!(
                    "Could not create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let conn = Connection::open(path)?;
        tracing::debug!(path = %path.display(), "opened event database");
        Self::init(conn)
    }

    /// A private database that lives as long as this value.
    pub fn open_in_memory() -> CalendarResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> CalendarResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStorage {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> CalendarResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| CalendarError::Storage(format!("database lock poisoned: {e}")))
    }

    /// Whether the event has already been handed to the scheduler.
    pub fn is_notified(&self, id: &str) -> CalendarResult<Option<bool>> {
        let conn = self.lock()?;
        let notified = conn
            .query_row(
                "SELECT notified FROM events WHERE id = ?1",
                params![id],
                |row| row.get::<_, bool>(0),
            )
            .optional()?;
        Ok(notified)
    }
}

#[async_trait]
impl EventStorage for SqliteStorage {
    async fn list_events(
        &self,
        user: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> CalendarResult<Vec<Event>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events
             WHERE user_name = ?1 AND start_at >= ?2 AND start_at < ?3"
        ))?;

        let events = stmt
            .query_map(
                params![user, from.timestamp_millis(), to.timestamp_millis()],
                event_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn create_event(&self, event: &Event) -> CalendarResult<String> {
        let id = new_event_id();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO events (id, title, start_at, duration, descr, user_name, notify_at, notified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0)",
            params![
                id,
                event.title,
                event.start.timestamp_millis(),
                event.duration.num_seconds(),
                event.description,
                event.user,
                event.notify_at().timestamp_millis(),
            ],
        )?;
        Ok(id)
    }

    async fn update_event(&self, id: &str, event: &Event) -> CalendarResult<()> {
        let conn = self.lock()?;
        // SET expressions see the old row, so `notify_at = ?6` compares
        // against the previous reminder instant.
        let changed = conn.execute(
            "UPDATE events
             SET title = ?1, start_at = ?2, duration = ?3, descr = ?4, user_name = ?5,
                 notified = CASE WHEN notify_at = ?6 THEN notified ELSE 0 END,
                 notify_at = ?6
             WHERE id = ?7",
            params![
                event.title,
                event.start.timestamp_millis(),
                event.duration.num_seconds(),
                event.description,
                event.user,
                event.notify_at().timestamp_millis(),
                id,
            ],
        )?;

        if changed == 0 {
            return Err(CalendarError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_event(&self, id: &str) -> CalendarResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute("DELETE FROM events WHERE id = ?1", params![id])?;

        if changed == 0 {
            return Err(CalendarError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn pop_due_notifications(&self, now: DateTime<Utc>) -> CalendarResult<Vec<Event>> {
        let mut conn = self.lock()?;
        // Dropping the transaction without commit rolls every step back.
        let tx = conn.transaction()?;

        let due = {
            let mut select = tx.prepare(&format!(
                "SELECT {EVENT_COLUMNS} FROM events WHERE notified = 0 AND notify_at < ?1"
            ))?;
            select
                .query_map(params![now.timestamp_millis()], event_from_row)?
                .collect::<Result<Vec<_>, _>>()?
        };

        {
            let mut mark = tx.prepare("UPDATE events SET notified = 1 WHERE id = ?1")?;
            for event in &due {
                mark.execute(params![event.id])?;
            }
        }

        tx.commit()?;
        Ok(due)
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let start_ms: i64 = row.get(2)?;
    let duration_secs: i64 = row.get(3)?;
    let notify_at_ms: i64 = row.get(6)?;

    let start = DateTime::from_timestamp_millis(start_ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(2, start_ms))?;
    let duration = Duration::try_seconds(duration_secs)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(3, duration_secs))?;
    let notify_at = DateTime::from_timestamp_millis(notify_at_ms)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(6, notify_at_ms))?;

    Ok(Event {
        id: row.get(0)?,
        title: row.get(1)?,
        start,
        duration,
        description: row.get(4)?,
        user: row.get(5)?,
        notify_before: start - notify_at,
    })
}
