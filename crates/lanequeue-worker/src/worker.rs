use crate::config::WorkerConfig;
use crate::handler::TaskHandler;
use crate::lane_worker::{LaneStats, LaneWorker};
use crate::{Result, WorkerError};
use lanequeue_client::{Channel, Connection, RetryPolicy};
use lanequeue_core::LaneKind;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Runs one lane loop per lane, each on its own broker channel.
///
/// A lane whose session is lost reopens its channel and consumes again; the
/// broker has already requeued whatever it left unacknowledged. Only an
/// unreachable broker at startup or a broker refusal ends the worker with an
/// error, which stops the other lane too.
///
/// Shutdown cancels the loops' waits, lets in-flight deliveries finish and
/// settle, then closes the channels.
pub struct Worker {
    config: WorkerConfig,
    handler: Arc<dyn TaskHandler>,
    shutdown: CancellationToken,
}

impl Worker {
    pub fn new(config: WorkerConfig, handler: Arc<dyn TaskHandler>) -> Self {
        Worker {
            config,
            handler,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops the worker when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Trigger shutdown
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Connect, declare the lanes, and consume until shutdown
    pub async fn run(&self) -> Result<()> {
        let connection = Connection::connect(
            self.config.broker.address.clone(),
            self.config.broker.connect_retry.clone(),
        )
        .await?;

        let mut loops = JoinSet::new();
        for kind in LaneKind::ALL {
            let lane = LaneSupervisor {
                kind,
                connection: connection.clone(),
                retry: self.config.broker.connect_retry.clone(),
                handler: self.handler.clone(),
                prefetch: self.config.prefetch,
                requeue_failed: self.config.requeue_failed,
                cancel: self.shutdown.child_token(),
            };
            loops.spawn(async move { (kind, lane.run().await) });
        }

        info!(" [*] Waiting for messages. To exit press CTRL+C");

        let mut result = Ok(());
        while let Some(joined) = loops.join_next().await {
            match joined {
                Ok((kind, Ok(stats))) => log_stats(kind, stats),
                Ok((kind, Err(e))) => {
                    error!(lane = %kind.lane_name(), "Lane loop failed: {}", e);
                    self.shutdown.cancel();
                    if result.is_ok() {
                        result = Err(e);
                    }
                }
                Err(e) => {
                    error!("Lane loop panicked: {}", e);
                    self.shutdown.cancel();
                    if result.is_ok() {
                        result = Err(WorkerError::LaneTask(e));
                    }
                }
            }
        }

        info!("Worker stopped");
        result
    }
}

/// Keeps one lane consumed across broker sessions
struct LaneSupervisor {
    kind: LaneKind,
    connection: Connection,
    retry: RetryPolicy,
    handler: Arc<dyn TaskHandler>,
    prefetch: u16,
    requeue_failed: bool,
    cancel: CancellationToken,
}

impl LaneSupervisor {
    async fn run(self) -> Result<LaneStats> {
        let lane = self.kind.lane_name();
        let mut total = LaneStats::default();
        let mut losses = 0u32;

        loop {
            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                opened = self.open() => opened,
            };

            let before = total;
            let outcome = match opened {
                Ok(channel) => {
                    let outcome = self.consume(&channel, &mut total).await;
                    channel.close().await;
                    outcome
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(()) => break,
                Err(e) if e.is_recoverable() => {
                    if self.cancel.is_cancelled() {
                        break;
                    }
                    // Backoff restarts once a session made progress
                    if total != before {
                        losses = 0;
                    }
                    let delay = self.retry.calculate_delay(losses);
                    losses = losses.saturating_add(1);
                    warn!(lane = %lane, "Broker unavailable ({}), reconnecting in {:?}", e, delay);

                    tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }

        Ok(total)
    }

    /// Open a channel and declare the lane with its dead-letter lane
    async fn open(&self) -> Result<Channel> {
        let channel = self.connection.open_channel().await?;
        channel.declare_lane(self.kind.dead_letter_spec()).await?;
        channel.declare_lane(self.kind.spec()).await?;
        Ok(channel)
    }

    /// Consume on one channel until cancelled or the session ends
    async fn consume(&self, channel: &Channel, total: &mut LaneStats) -> Result<()> {
        let consumer = channel.consume(self.kind.lane_name(), self.prefetch).await?;
        let mut lane_worker = LaneWorker::new(
            self.kind,
            consumer,
            self.handler.clone(),
            self.cancel.clone(),
        )
        .requeue_failed(self.requeue_failed);

        let result = lane_worker.run().await;
        total.merge(lane_worker.stats());
        result
    }
}

fn log_stats(kind: LaneKind, stats: LaneStats) {
    info!(
        lane = %kind.lane_name(),
        acked = stats.acked,
        rejected = stats.rejected,
        failed = stats.failed,
        "Lane loop finished"
    );
}
