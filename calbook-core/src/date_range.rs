//! Date ranges for listing events.

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::{HORIZON_END_SECS, HORIZON_START};
use crate::error::{CalendarError, CalendarResult};

/// Half-open range `[from, to)` of event start instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Listing periods offered to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Day,
    Week,
    Month,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange { from, to }
    }

    /// The whole calendar: from the epoch to a far-future sentinel.
    ///
    /// Used when a user's full set of events must be checked, since no
    /// narrower bound can be assumed for a candidate event.
    pub fn horizon() -> Self {
        DateRange {
            from: HORIZON_START,
            to: DateTime::from_timestamp(HORIZON_END_SECS, 0).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    /// The range covering `period` starting at midnight UTC of `date`.
    pub fn for_period(period: Period, date: NaiveDate) -> CalendarResult<Self> {
        let from = date.and_time(chrono::NaiveTime::MIN).and_utc();
        let to = match period {
            Period::Day => from.checked_add_signed(Duration::days(1)),
            Period::Week => from.checked_add_signed(Duration::days(7)),
            Period::Month => from.checked_add_months(Months::new(1)),
        }
        .ok_or_else(|| CalendarError::InvalidEvent(format!("date out of range: {date}")))?;

        Ok(DateRange { from, to })
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.from <= instant && instant < self.to
    }
}

impl FromStr for Period {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Period::Day),
            "week" => Ok(Period::Week),
            "month" => Ok(Period::Month),
            other => Err(CalendarError::InvalidEvent(format!(
                "unknown period '{other}'. Expected day, week or month"
            ))),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Period::Day => "day",
            Period::Week => "week",
            Period::Month => "month",
        };
        write!(f, "{name}")
    }
}
