use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Lane not found: {0}")]
    LaneNotFound(String),

    #[error("Lane {0} already declared with different arguments")]
    LaneMismatch(String),

    #[error("Invalid lane name: {0:?}")]
    InvalidLaneName(String),

    #[error("Unknown delivery tag: {0}")]
    UnknownDeliveryTag(u64),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Persistence error: {0}")]
    Persistence(#[from] lanequeue_persistence::PersistenceError),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
