use crate::{Priority, Result, TaskError};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use uuid::Uuid;

/// Opaque task identifier, assigned by the producer
pub type TaskId = String;

/// Generate a fresh, globally unique task identifier
pub fn generate_task_id() -> TaskId {
    Uuid::new_v4().to_string()
}

/// A unit of work as it travels over HTTP and through the lanes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Absent on submission, always present once dispatched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TaskId>,

    pub title: String,

    #[serde(default)]
    pub priority: Priority,
}

impl Task {
    /// Create a task that has not been assigned an identifier yet
    pub fn new(title: impl Into<String>, priority: impl Into<Priority>) -> Self {
        Task {
            id: None,
            title: title.into(),
            priority: priority.into(),
        }
    }

    pub fn with_id(mut self, id: impl Into<TaskId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Assign a fresh identifier unless one is already present
    pub fn ensure_id(&mut self) -> &str {
        self.id.get_or_insert_with(generate_task_id)
    }

    /// Broker delivery priority of this task
    pub fn delivery_priority(&self) -> u8 {
        self.priority.delivery_priority()
    }

    /// Serialize to the single lane wire format (one JSON object)
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(TaskError::from)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(TaskError::from)
    }
}

/// Tasks submitted together, published as one message and acknowledged as one.
///
/// The wire format is a plain JSON array in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch(Vec<Task>);

impl Batch {
    pub fn new(tasks: Vec<Task>) -> Self {
        Batch(tasks)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Task> {
        self.0.iter()
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.0
    }

    /// Delivery priority of the whole batch: the highest member priority.
    ///
    /// Unknown members contribute 0, an empty batch yields 0.
    pub fn delivery_priority(&self) -> u8 {
        self.0
            .iter()
            .map(Task::delivery_priority)
            .max()
            .unwrap_or(0)
    }

    /// Members in execution order: rank descending, submission order kept
    /// among equal ranks.
    pub fn into_execution_order(self) -> Vec<Task> {
        let mut tasks = self.0;
        // sort_by_key is stable
        tasks.sort_by_key(|task| Reverse(task.priority.rank()));
        tasks
    }

    /// Serialize to the batch lane wire format (one JSON array)
    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(TaskError::from)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(TaskError::from)
    }
}

impl From<Vec<Task>> for Batch {
    fn from(tasks: Vec<Task>) -> Self {
        Batch(tasks)
    }
}

impl IntoIterator for Batch {
    type Item = Task;
    type IntoIter = std::vec::IntoIter<Task>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_task_creation() {
        let mut task = Task::new("resize image", Priority::High);
        assert!(task.id.is_none());

        let id = task.ensure_id().to_string();
        assert!(!id.is_empty());
        assert_eq!(task.ensure_id(), id);
        assert_eq!(task.id.as_deref(), Some(id.as_str()));
    }

    #[test]
    fn test_task_serialization() {
        let task = Task::new("send report", "medium").with_id("abc-123");

        let bytes = task.to_json().unwrap();
        let deserialized = Task::from_json(&bytes).unwrap();
        assert_eq!(task, deserialized);

        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"id": "abc-123", "title": "send report", "priority": "medium"})
        );
    }

    #[test]
    fn test_submission_shape() {
        let task = Task::from_json(br#"{"title":"x"}"#).unwrap();
        assert!(task.id.is_none());
        assert_eq!(task.priority, Priority::default());

        // id is omitted until assigned
        let json = String::from_utf8(Task::new("x", "low").to_json().unwrap()).unwrap();
        assert!(!json.contains("\"id\""));

        assert!(Task::from_json(br#"{"priority":"low"}"#).is_err());
    }

    #[test]
    fn test_batch_wire_format_is_array() {
        let batch = Batch::new(vec![
            Task::new("a", "low").with_id("1"),
            Task::new("b", "high").with_id("2"),
        ]);
        let value: serde_json::Value = serde_json::from_slice(&batch.to_json().unwrap()).unwrap();
        assert!(value.is_array());
        assert_eq!(value[0]["title"], "a");
        assert_eq!(value[1]["title"], "b");
        assert_eq!(Batch::from_json(&batch.to_json().unwrap()).unwrap(), batch);
    }

    #[test]
    fn test_batch_delivery_priority() {
        let batch = Batch::new(vec![Task::new("a", "low"), Task::new("b", "high")]);
        assert_eq!(batch.delivery_priority(), 10);

        let batch = Batch::new(vec![Task::new("a", "low"), Task::new("b", "medium")]);
        assert_eq!(batch.delivery_priority(), 5);

        let batch = Batch::new(vec![Task::new("a", "urgent")]);
        assert_eq!(batch.delivery_priority(), 0);

        assert_eq!(Batch::default().delivery_priority(), 0);
    }

    #[test]
    fn test_execution_order() {
        let batch = Batch::new(vec![Task::new("a", "low"), Task::new("b", "high")]);
        let order: Vec<_> = batch
            .into_execution_order()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_execution_order_keeps_ties_in_submission_order() {
        let batch = Batch::new(vec![
            Task::new("low-1", "low"),
            Task::new("high-1", "high"),
            Task::new("medium-1", "medium"),
            Task::new("high-2", "high"),
            Task::new("low-2", "low"),
            Task::new("medium-2", "medium"),
        ]);
        let order: Vec<_> = batch
            .into_execution_order()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(
            order,
            vec!["high-1", "high-2", "medium-1", "medium-2", "low-1", "low-2"]
        );
    }

    fn arb_priority() -> impl Strategy<Value = Priority> {
        prop_oneof![
            Just(Priority::High),
            Just(Priority::Medium),
            Just(Priority::Low),
            "[a-z]{0,5}".prop_map(Priority::from),
        ]
    }

    proptest! {
        #[test]
        fn prop_batch_priority_is_member_max(priorities in prop::collection::vec(arb_priority(), 1..32)) {
            let batch: Batch = priorities
                .iter()
                .cloned()
                .map(|p| Task::new("t", p))
                .collect::<Vec<_>>()
                .into();
            let expected = priorities.iter().map(Priority::delivery_priority).max().unwrap();
            prop_assert_eq!(batch.delivery_priority(), expected);
        }

        #[test]
        fn prop_execution_order_is_stable(priorities in prop::collection::vec(arb_priority(), 0..32)) {
            let tasks: Vec<_> = priorities
                .iter()
                .cloned()
                .enumerate()
                .map(|(i, p)| Task::new(i.to_string(), p))
                .collect();
            let sorted = Batch::new(tasks).into_execution_order();

            for pair in sorted.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.priority.rank() >= b.priority.rank());
                if a.priority.rank() == b.priority.rank() {
                    let (ia, ib): (usize, usize) = (a.title.parse().unwrap(), b.title.parse().unwrap());
                    prop_assert!(ia < ib);
                }
            }
            prop_assert_eq!(sorted.len(), priorities.len());
        }

        #[test]
        fn prop_task_json_round_trip(title in "\\PC{1,20}", priority in arb_priority()) {
            let task = Task::new(title, priority).with_id(generate_task_id());
            let back = Task::from_json(&task.to_json().unwrap()).unwrap();
            prop_assert_eq!(back, task);
        }
    }
}
