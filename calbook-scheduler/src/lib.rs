//! Reminder scheduler: pops due notifications from storage on a fixed
//! interval and publishes each one through a reconnecting [`Producer`].
//!
//! [`Producer`]: calbook_broker::Producer

pub mod error;
pub mod scheduler;

pub use error::{SchedulerError, SchedulerResult};
pub use scheduler::{Scheduler, TickReport};
