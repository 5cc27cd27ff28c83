use async_trait::async_trait;
use lanequeue_core::Task;
use rand::Rng;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("task failed: {0}")]
    Failed(String),
}

/// Executes one task. A returned error leaves the message unacknowledged and
/// it is rejected instead.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn execute(&self, task: &Task) -> Result<(), HandlerError>;
}

/// Stand-in for real work: logs the task and sleeps a random whole number
/// of seconds below `max_delay_secs`.
#[derive(Debug, Clone)]
pub struct SimulatedWork {
    max_delay_secs: u64,
}

impl SimulatedWork {
    pub fn new(max_delay_secs: u64) -> Self {
        SimulatedWork { max_delay_secs }
    }

    pub fn delay(&self) -> Duration {
        if self.max_delay_secs == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs(rand::thread_rng().gen_range(0..self.max_delay_secs))
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        SimulatedWork::new(3)
    }
}

#[async_trait]
impl TaskHandler for SimulatedWork {
    async fn execute(&self, task: &Task) -> Result<(), HandlerError> {
        info!(title = %task.title, priority = %task.priority, "Processing task");
        let delay = self.delay();
        tokio::time::sleep(delay).await;
        info!(title = %task.title, elapsed = ?delay, "Task done");
        Ok(())
    }
}
