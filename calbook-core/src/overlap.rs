//! Half-open interval rule that keeps a user's events apart.
//!
//! An event occupies `[start, end)`: it includes its start instant and
//! excludes its end, so an event ending at 17:00 and another starting at
//! 17:00 can both be booked.

use chrono::{DateTime, Utc};

use crate::event::Event;

/// Whether `existing` intersects the candidate range `[start, end)`.
pub fn conflicts(existing: &Event, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    existing.start < end && start < existing.end()
}

/// True when no event in `events` intersects `[start, end)`.
pub fn has_free_time<'a, I>(events: I, start: DateTime<Utc>, end: DateTime<Utc>) -> bool
where
    I: IntoIterator<Item = &'a Event>,
{
    !events
        .into_iter()
        .any(|existing| conflicts(existing, start, end))
}
