use lanequeue_client::{ClientError, Publisher};
use lanequeue_core::{Batch, LaneKind, Task, TaskError, BATCH_LANE, CONTENT_TYPE_JSON, TASK_LANE};
use lanequeue_protocol::Publishing;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("failed to encode task: {0}")]
    Encode(#[from] TaskError),

    #[error("failed to publish: {0}")]
    Publish(#[from] ClientError),
}

pub type Result<T> = std::result::Result<T, DispatchError>;

/// A batch as it was published
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchedBatch {
    pub tasks: Batch,
    /// Delivery priority of the whole batch message
    pub priority: u8,
}

/// Turns validated submissions into persistent lane messages.
///
/// A publish returns only after the broker confirmed it; a failure is
/// handed back to the caller and never ends the process.
pub struct Dispatcher {
    publisher: Arc<dyn Publisher>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn Publisher>) -> Self {
        Dispatcher { publisher }
    }

    /// Declare both task lanes and their dead-letter lanes
    pub async fn declare_lanes(&self) -> Result<()> {
        for lane in LaneKind::all_specs() {
            debug!(lane = %lane.name, "Declaring lane");
            self.publisher.declare_lane(lane).await?;
        }
        Ok(())
    }

    /// Publish one task on the single-task lane, assigning an id if absent
    pub async fn dispatch_task(&self, mut task: Task) -> Result<Task> {
        task.ensure_id();
        let priority = task.delivery_priority();
        let body = task.to_json()?;

        self.publisher
            .publish(
                TASK_LANE,
                Publishing::persistent(priority, CONTENT_TYPE_JSON, body),
            )
            .await?;

        info!(
            task_id = %task.id.as_deref().unwrap_or_default(),
            title = %task.title,
            priority,
            "Sent task"
        );
        Ok(task)
    }

    /// Publish a batch as one message whose priority is the highest of its
    /// members. Member order on the wire is submission order.
    pub async fn dispatch_batch(&self, batch: Batch) -> Result<DispatchedBatch> {
        let batch: Batch = batch
            .into_tasks()
            .into_iter()
            .map(|mut task| {
                task.ensure_id();
                task
            })
            .collect::<Vec<_>>()
            .into();
        let priority = batch.delivery_priority();
        let body = batch.to_json()?;

        self.publisher
            .publish(
                BATCH_LANE,
                Publishing::persistent(priority, CONTENT_TYPE_JSON, body),
            )
            .await?;

        info!(size = batch.len(), priority, "Sent batch");
        Ok(DispatchedBatch {
            tasks: batch,
            priority,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingPublisher;
    use lanequeue_core::Priority;

    fn dispatcher() -> (Arc<RecordingPublisher>, Dispatcher) {
        let publisher = Arc::new(RecordingPublisher::default());
        (publisher.clone(), Dispatcher::new(publisher))
    }

    #[tokio::test]
    async fn test_declare_lanes() {
        let (publisher, dispatcher) = dispatcher();
        dispatcher.declare_lanes().await.unwrap();

        let names: Vec<String> = publisher.declared.lock().iter().map(|l| l.name.clone()).collect();
        assert!(names.contains(&"task_queue".to_string()));
        assert!(names.contains(&"batch_task_queue".to_string()));
        assert!(names.contains(&"task_queue.dead_letter".to_string()));
        assert!(names.contains(&"batch_task_queue.dead_letter".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_task() {
        let (publisher, dispatcher) = dispatcher();

        let task = dispatcher
            .dispatch_task(Task::new("write report", Priority::Medium))
            .await
            .unwrap();
        assert!(task.id.is_some());

        let published = publisher.published();
        assert_eq!(published.len(), 1);
        let (lane, publishing) = &published[0];
        assert_eq!(lane, TASK_LANE);
        assert_eq!(publishing.priority, 5);
        assert!(publishing.persistent);
        assert_eq!(publishing.content_type.as_deref(), Some(CONTENT_TYPE_JSON));
        assert_eq!(Task::from_json(&publishing.body).unwrap(), task);
    }

    #[tokio::test]
    async fn test_dispatch_task_keeps_existing_id() {
        let (_publisher, dispatcher) = dispatcher();
        let task = dispatcher
            .dispatch_task(Task::new("x", Priority::Low).with_id("fixed"))
            .await
            .unwrap();
        assert_eq!(task.id.as_deref(), Some("fixed"));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_priority_uses_zero() {
        let (publisher, dispatcher) = dispatcher();
        dispatcher
            .dispatch_task(Task::new("x", "urgent"))
            .await
            .unwrap();

        let (_, publishing) = &publisher.published()[0];
        assert_eq!(publishing.priority, 0);
        // the symbol travels unchanged
        assert!(String::from_utf8_lossy(&publishing.body).contains("\"urgent\""));
    }

    #[tokio::test]
    async fn test_dispatch_batch() {
        let (publisher, dispatcher) = dispatcher();

        let batch = Batch::new(vec![
            Task::new("a", Priority::Low),
            Task::new("b", Priority::High),
            Task::new("c", Priority::Medium),
        ]);
        let dispatched = dispatcher.dispatch_batch(batch).await.unwrap();
        assert_eq!(dispatched.priority, 10);
        assert!(dispatched.tasks.iter().all(|t| t.id.is_some()));

        let (lane, publishing) = &publisher.published()[0];
        assert_eq!(lane, BATCH_LANE);
        assert_eq!(publishing.priority, 10);

        let wire = Batch::from_json(&publishing.body).unwrap();
        let titles: Vec<_> = wire.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_publish_failure_is_returned() {
        let dispatcher = Dispatcher::new(Arc::new(RecordingPublisher::failing()));
        let err = dispatcher
            .dispatch_task(Task::new("x", Priority::High))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Publish(_)));
    }
}
