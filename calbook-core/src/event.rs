//! Calendar event type.
//!
//! The same JSON shape is used on the HTTP surface and as the body of
//! notification messages, so durations are plain seconds on the wire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::date_range::DateRange;
use crate::error::{CalendarError, CalendarResult};

/// A time-bounded event owned by a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Assigned by the storage engine on create; empty until then.
    #[serde(default)]
    pub id: String,
    pub title: String,
    pub user: String,
    pub start: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    #[serde(default)]
    pub description: String,
    /// How long before `start` the owner should be notified.
    #[serde(with = "duration_secs", default = "Duration::zero")]
    pub notify_before: Duration,
}

impl Event {
    pub fn new(
        title: impl Into<String>,
        user: impl Into<String>,
        start: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        Event {
            id: String::new(),
            title: title.into(),
            user: user.into(),
            start,
            duration,
            description: String::new(),
            notify_before: Duration::zero(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_notify_before(mut self, notify_before: Duration) -> Self {
        self.notify_before = notify_before;
        self
    }

    /// Exclusive end of the event.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }

    /// The instant at which a notification for this event becomes due.
    pub fn notify_at(&self) -> DateTime<Utc> {
        self.start - self.notify_before
    }

    /// Reject events that cannot be stored meaningfully.
    pub fn validate(&self) -> CalendarResult<()> {
        if self.user.trim().is_empty() {
            return Err(CalendarError::InvalidEvent("user must not be empty".into()));
        }
        if self.title.trim().is_empty() {
            return Err(CalendarError::InvalidEvent("title must not be empty".into()));
        }
        if self.duration < Duration::zero() {
            return Err(CalendarError::InvalidEvent(format!(
                "duration must not be negative (got {}s)",
                self.duration.num_seconds()
            )));
        }
        if self.notify_before < Duration::zero() {
            return Err(CalendarError::InvalidEvent(format!(
                "notify_before must not be negative (got {}s)",
                self.notify_before.num_seconds()
            )));
        }

        // Conflict checks only see starts inside the horizon.
        let horizon = DateRange::horizon();
        if !horizon.contains(self.start) {
            return Err(CalendarError::InvalidEvent(format!(
                "start must lie between {} and {} (got {})",
                horizon.from, horizon.to, self.start
            )));
        }
        if self.start.checked_add_signed(self.duration).is_none() {
            return Err(CalendarError::InvalidEvent(format!(
                "duration too large ({}s)",
                self.duration.num_seconds()
            )));
        }
        if self.start.checked_sub_signed(self.notify_before).is_none() {
            return Err(CalendarError::InvalidEvent(format!(
                "notify_before too large ({}s)",
                self.notify_before.num_seconds()
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} is starting at {}", self.title, self.start.format("%H:%M:%S"))
    }
}

/// Serialize `chrono::Duration` as whole seconds.
pub mod duration_secs {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(duration.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = i64::deserialize(deserializer)?;
        Duration::try_seconds(secs)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {secs}s")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn meeting() -> Event {
        Event::new(
            "standup",
            "kira",
            Utc.with_ymd_and_hms(2020, 2, 29, 15, 30, 0).unwrap(),
            Duration::hours(2),
        )
        .with_description("cool meeting")
        .with_notify_before(Duration::hours(3))
    }

    #[test]
    fn test_derived_instants() {
        let event = meeting();
        assert_eq!(event.end(), Utc.with_ymd_and_hms(2020, 2, 29, 17, 30, 0).unwrap());
        assert_eq!(
            event.notify_at(),
            Utc.with_ymd_and_hms(2020, 2, 29, 12, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_json_uses_seconds_for_durations() {
        let json = serde_json::to_value(meeting()).unwrap();
        assert_eq!(json["duration"], 7200);
        assert_eq!(json["notify_before"], 10800);
        assert_eq!(json["start"], "2020-02-29T15:30:00Z");
    }

    #[test]
    fn test_json_defaults_for_optional_fields() {
        let event: Event = serde_json::from_str(
            r#"{"title":"t","user":"u","start":"2020-02-29T15:30:00Z","duration":60}"#,
        )
        .unwrap();
        assert!(event.id.is_empty());
        assert!(event.description.is_empty());
        assert_eq!(event.notify_before, Duration::zero());
    }

    #[test]
    fn test_validate_rejects_blank_user_and_negative_duration() {
        let mut event = meeting();
        event.user = "  ".into();
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));

        let mut event = meeting();
        event.duration = Duration::minutes(-5);
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));

        assert!(meeting().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unrepresentable_instants() {
        let huge = Duration::try_seconds(9_000_000_000_000).unwrap();

        let mut event = meeting();
        event.duration = huge;
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));

        let event = meeting().with_notify_before(huge);
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));
    }

    #[test]
    fn test_validate_rejects_start_outside_horizon() {
        let mut event = meeting();
        event.start = Utc.with_ymd_and_hms(1969, 12, 31, 23, 0, 0).unwrap();
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));

        event.start = Utc.with_ymd_and_hms(4097, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(event.validate(), Err(CalendarError::InvalidEvent(_))));

        event.start = DateTime::<Utc>::UNIX_EPOCH;
        assert!(event.validate().is_ok());
    }
}
