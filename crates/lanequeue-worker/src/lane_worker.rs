//! The consume loop of one lane.
//!
//! Each delivery is decoded, executed and settled exactly once before the
//! next one is awaited. A batch is settled as a whole: it is acked after its
//! last member ran, or nacked as soon as one member fails.

use crate::handler::{HandlerError, TaskHandler};
use crate::{Result, WorkerError};
use lanequeue_client::{Delivery, DeliveryStream};
use lanequeue_core::{Batch, LaneKind, Task};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Executed and acknowledged
    Acked,
    /// Could not be decoded; rejected without requeue
    Rejected,
    /// Execution failed; rejected with the configured requeue flag
    Failed,
}

/// Counters reported when a loop exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneStats {
    pub acked: u64,
    pub rejected: u64,
    pub failed: u64,
}

impl LaneStats {
    pub(crate) fn merge(&mut self, other: LaneStats) {
        self.acked += other.acked;
        self.rejected += other.rejected;
        self.failed += other.failed;
    }

    fn record(&mut self, settlement: Settlement) {
        match settlement {
            Settlement::Acked => self.acked += 1,
            Settlement::Rejected => self.rejected += 1,
            Settlement::Failed => self.failed += 1,
        }
    }
}

/// Decodes, executes and settles deliveries of one lane kind
struct TaskRunner {
    kind: LaneKind,
    handler: Arc<dyn TaskHandler>,
    requeue_failed: bool,
}

pub struct LaneWorker<S> {
    deliveries: S,
    runner: TaskRunner,
    cancel: CancellationToken,
    stats: LaneStats,
}

impl<S: DeliveryStream> LaneWorker<S> {
    pub fn new(
        kind: LaneKind,
        deliveries: S,
        handler: Arc<dyn TaskHandler>,
        cancel: CancellationToken,
    ) -> Self {
        LaneWorker {
            deliveries,
            runner: TaskRunner {
                kind,
                handler,
                requeue_failed: false,
            },
            cancel,
            stats: LaneStats::default(),
        }
    }

    pub fn requeue_failed(mut self, requeue: bool) -> Self {
        self.runner.requeue_failed = requeue;
        self
    }

    /// Settlements so far
    pub fn stats(&self) -> LaneStats {
        self.stats
    }

    /// Consume until cancelled. Cancellation only interrupts the wait for a
    /// delivery; one already received is finished and settled first.
    pub async fn run(&mut self) -> Result<()> {
        let lane = self.runner.kind.lane_name();
        info!(lane = %lane, "Waiting for messages");

        loop {
            let delivery = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                delivery = self.deliveries.next_delivery() => delivery,
            };

            let Some(delivery) = delivery else {
                return Err(WorkerError::StreamClosed(self.runner.kind));
            };

            let settlement = self.runner.process(delivery).await?;
            self.stats.record(settlement);
        }

        info!(lane = %lane, stats = ?self.stats, "Lane loop stopped");
        Ok(())
    }

    /// Decode, execute and settle one delivery
    pub async fn process(&self, delivery: Delivery) -> Result<Settlement> {
        self.runner.process(delivery).await
    }
}

impl TaskRunner {
    async fn process(&self, delivery: Delivery) -> Result<Settlement> {
        debug!(
            lane = %self.kind.lane_name(),
            delivery_tag = delivery.delivery_tag,
            redelivered = delivery.redelivered,
            "Received message"
        );

        match self.kind {
            LaneKind::Single => self.process_single(delivery).await,
            LaneKind::Batch => self.process_batch(delivery).await,
        }
    }

    async fn process_single(&self, delivery: Delivery) -> Result<Settlement> {
        let task = match Task::from_json(&delivery.body) {
            Ok(task) => task,
            Err(e) => return self.reject(delivery, e).await,
        };

        if let Err(e) = self.execute(&task).await {
            return self.fail(delivery, e).await;
        }

        delivery.ack().await?;
        Ok(Settlement::Acked)
    }

    async fn process_batch(&self, delivery: Delivery) -> Result<Settlement> {
        let batch = match Batch::from_json(&delivery.body) {
            Ok(batch) => batch,
            Err(e) => return self.reject(delivery, e).await,
        };

        let size = batch.len();
        for task in batch.into_execution_order() {
            if let Err(e) = self.execute(&task).await {
                return self.fail(delivery, e).await;
            }
        }

        delivery.ack().await?;
        info!(size, "Batch acknowledged");
        Ok(Settlement::Acked)
    }

    async fn execute(&self, task: &Task) -> std::result::Result<(), HandlerError> {
        let span = info_span!(
            "process-task",
            "task.id" = %task.id.as_deref().unwrap_or_default(),
            "task.type" = self.kind.as_str(),
        );
        self.handler.execute(task).instrument(span).await
    }

    async fn reject(&self, delivery: Delivery, reason: impl std::fmt::Display) -> Result<Settlement> {
        warn!(
            lane = %self.kind.lane_name(),
            delivery_tag = delivery.delivery_tag,
            "Invalid task format: {}", reason
        );
        delivery.nack(false).await?;
        Ok(Settlement::Rejected)
    }

    async fn fail(&self, delivery: Delivery, reason: impl std::fmt::Display) -> Result<Settlement> {
        error!(
            lane = %self.kind.lane_name(),
            delivery_tag = delivery.delivery_tag,
            requeue = self.requeue_failed,
            "Execution failed: {}", reason
        );
        delivery.nack(self.requeue_failed).await?;
        Ok(Settlement::Failed)
    }
}
