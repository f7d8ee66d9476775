//! Core types for calbook.
//!
//! This crate provides the pieces shared by the server, the scheduler and the
//! sender:
//! - `Event` and the half-open interval rule that keeps a user's events apart
//! - `Calendar`, the conflict engine that guards every event write
//! - the `EventStorage` contract with an in-memory and a SQLite engine
//! - `ServiceConfig`, loaded from `~/.config/calbook/config.toml`

pub mod calendar;
pub mod config;
pub mod constants;
pub mod date_range;
pub mod error;
pub mod event;
pub mod overlap;
pub mod storage;

pub use calendar::Calendar;
pub use date_range::{DateRange, Period};
pub use error::{CalendarError, CalendarResult};
pub use event::Event;
pub use storage::EventStorage;
