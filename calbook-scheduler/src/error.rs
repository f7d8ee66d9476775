use calbook_broker::BrokerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("Producer supervisor failed: {0}")]
    Supervisor(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;
