pub mod config;
pub mod handler;
pub mod lane_worker;
pub mod worker;

pub use config::WorkerConfig;
pub use handler::{HandlerError, SimulatedWork, TaskHandler};
pub use lane_worker::{LaneStats, LaneWorker, Settlement};
pub use worker::Worker;

use lanequeue_client::ClientError;
use lanequeue_core::LaneKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Broker error: {0}")]
    Client(#[from] ClientError),

    #[error("Delivery stream of the {0} lane closed")]
    StreamClosed(LaneKind),

    #[error("Lane task failed: {0}")]
    LaneTask(#[from] tokio::task::JoinError),
}

impl WorkerError {
    /// The broker went away or cannot be reached right now; the lane can
    /// resume on a new channel once it is back.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WorkerError::StreamClosed(_)
                | WorkerError::Client(
                    ClientError::ChannelClosed
                        | ClientError::ConnectionError(_)
                        | ClientError::ProtocolError(_)
                        | ClientError::IoError(_)
                )
        )
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
