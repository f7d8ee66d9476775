//! Error types for the broker channel.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker transport error: {0}")]
    Transport(String),

    #[error("Not connected to the broker")]
    NotConnected,

    #[error("Gave up reconnecting after {attempts} attempts in {elapsed:?}")]
    ReconnectExhausted { attempts: u32, elapsed: Duration },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Channel is stopping")]
    Stopped,
}

impl From<lapin::Error> for BrokerError {
    fn from(err: lapin::Error) -> Self {
        BrokerError::Transport(err.to_string())
    }
}

/// Result type alias for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
