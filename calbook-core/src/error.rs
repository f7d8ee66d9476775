//! Error types for calbook.

use thiserror::Error;

/// Errors that can occur in calendar operations.
#[derive(Error, Debug)]
pub enum CalendarError {
    #[error("This time is busy")]
    TimeBusy,

    #[error("Event not found: {0}")]
    NotFound(String),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for CalendarError {
    fn from(err: rusqlite::Error) -> Self {
        CalendarError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for CalendarError {
    fn from(err: serde_json::Error) -> Self {
        CalendarError::Serialization(err.to_string())
    }
}

/// Result type alias for calendar operations.
pub type CalendarResult<T> = Result<T, CalendarError>;
