//! Decoding and validation of client submissions.
//!
//! Nothing here touches the network; the only side effect is identifier
//! assignment on accepted batches.

use crate::{generate_task_id, Batch, Priority, Task, TaskId, ValidationError};
use serde::{Deserialize, Serialize};

/// How the single-task path treats an empty title or unrecognized priority.
///
/// Batches always reject such members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriorityPolicy {
    /// Accept the task with a warning; it is delivered with priority 0
    #[default]
    Lenient,
    /// Reject the task exactly like a batch member
    Strict,
}

/// Submitted task shape. Every key is optional so that a missing title is
/// reported as such rather than as a decoding failure.
#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    title: String,
    #[serde(default)]
    priority: Priority,
    // Identifiers are assigned by the producer, any client value is dropped
    #[serde(default, rename = "id")]
    _id: Option<TaskId>,
}

impl From<RawTask> for Task {
    fn from(raw: RawTask) -> Self {
        Task::new(raw.title, raw.priority)
    }
}

/// A decoded single task plus the non-fatal problem found with it, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleSubmission {
    pub task: Task,
    pub warning: Option<ValidationError>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionValidator {
    policy: PriorityPolicy,
}

impl SubmissionValidator {
    pub fn new(policy: PriorityPolicy) -> Self {
        SubmissionValidator { policy }
    }

    /// Decode one task from a request body.
    ///
    /// Only an undecodable body is fatal under the lenient policy; an empty
    /// title or unknown priority comes back as the warning. The strict policy
    /// rejects both. The returned task has no identifier yet; the dispatcher
    /// assigns it.
    pub fn decode_task(&self, payload: &[u8]) -> Result<SingleSubmission, ValidationError> {
        let raw: RawTask = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedTask(e.to_string()))?;
        let task = Task::from(raw);

        let warning = check_title(&task, 0)
            .and_then(|_| check_priority(&task))
            .err();
        match (warning, self.policy) {
            (Some(err), PriorityPolicy::Strict) => Err(err),
            (warning, _) => Ok(SingleSubmission { task, warning }),
        }
    }

    /// Decode a batch from a request body.
    ///
    /// Checks run in order (empty array, then title, then priority per
    /// element) and the first violation rejects the whole batch. On success
    /// every member carries a fresh identifier.
    pub fn decode_batch(&self, payload: &[u8]) -> Result<Batch, ValidationError> {
        let raw: Vec<RawTask> = serde_json::from_slice(payload)
            .map_err(|e| ValidationError::MalformedBatch(e.to_string()))?;

        if raw.is_empty() {
            return Err(ValidationError::EmptyBatch);
        }

        let mut tasks = Vec::with_capacity(raw.len());
        for (index, raw) in raw.into_iter().enumerate() {
            let task = Task::from(raw);
            check_title(&task, index)?;
            check_priority(&task)?;
            tasks.push(task.with_id(generate_task_id()));
        }

        Ok(Batch::new(tasks))
    }
}

fn check_title(task: &Task, index: usize) -> Result<(), ValidationError> {
    if task.title.is_empty() {
        Err(ValidationError::MissingTitle { index })
    } else {
        Ok(())
    }
}

fn check_priority(task: &Task) -> Result<(), ValidationError> {
    if task.priority.is_known() {
        Ok(())
    } else {
        Err(ValidationError::InvalidPriority {
            title: task.title.clone(),
            value: task.priority.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn lenient() -> SubmissionValidator {
        SubmissionValidator::default()
    }

    #[test]
    fn test_single_task_valid() {
        let submission = lenient()
            .decode_task(br#"{"title":"x","priority":"high"}"#)
            .unwrap();
        assert_eq!(submission.task.title, "x");
        assert_eq!(submission.task.priority, Priority::High);
        assert!(submission.task.id.is_none());
        assert!(submission.warning.is_none());
    }

    #[test]
    fn test_single_task_unknown_priority_is_a_warning() {
        let submission = lenient()
            .decode_task(br#"{"title":"x","priority":"urgent"}"#)
            .unwrap();
        assert_eq!(submission.task.priority.delivery_priority(), 0);
        assert_eq!(
            submission.warning,
            Some(ValidationError::InvalidPriority {
                title: "x".to_string(),
                value: "urgent".to_string(),
            })
        );

        let submission = lenient().decode_task(br#"{"title":"x"}"#).unwrap();
        assert!(submission.warning.is_some());
        assert_eq!(submission.task.priority.delivery_priority(), 0);
    }

    #[test]
    fn test_single_task_strict_policy() {
        let strict = SubmissionValidator::new(PriorityPolicy::Strict);
        let err = strict
            .decode_task(br#"{"title":"x","priority":"urgent"}"#)
            .unwrap_err();
        assert!(matches!(err, ValidationError::InvalidPriority { .. }));

        assert!(strict.decode_task(br#"{"title":"x","priority":"low"}"#).is_ok());
    }

    #[test]
    fn test_single_task_malformed() {
        assert!(matches!(
            lenient().decode_task(b"not json"),
            Err(ValidationError::MalformedTask(_))
        ));
        assert!(matches!(
            lenient().decode_task(b"[]"),
            Err(ValidationError::MalformedTask(_))
        ));
    }

    #[test]
    fn test_single_task_missing_title() {
        let submission = lenient().decode_task(br#"{"priority":"low"}"#).unwrap();
        assert_eq!(submission.task.title, "");
        assert_eq!(
            submission.warning,
            Some(ValidationError::MissingTitle { index: 0 })
        );

        let strict = SubmissionValidator::new(PriorityPolicy::Strict);
        assert_eq!(
            strict.decode_task(br#"{"title":"","priority":"urgent"}"#),
            Err(ValidationError::MissingTitle { index: 0 })
        );
    }

    #[test]
    fn test_single_task_client_id_is_dropped() {
        let submission = lenient()
            .decode_task(br#"{"id":"mine","title":"x","priority":"low"}"#)
            .unwrap();
        assert!(submission.task.id.is_none());
    }

    #[test]
    fn test_batch_valid_assigns_unique_ids() {
        let batch = lenient()
            .decode_batch(br#"[{"title":"a","priority":"low"},{"title":"a","priority":"low"},{"title":"b","priority":"high"}]"#)
            .unwrap();
        assert_eq!(batch.len(), 3);

        let ids: HashSet<_> = batch.iter().map(|t| t.id.clone().unwrap()).collect();
        assert_eq!(ids.len(), 3);

        // wire order is submission order
        let titles: Vec<_> = batch.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "a", "b"]);
    }

    #[test]
    fn test_batch_empty_rejected() {
        assert_eq!(lenient().decode_batch(b"[]"), Err(ValidationError::EmptyBatch));
    }

    #[test]
    fn test_batch_missing_title_rejected() {
        let err = lenient()
            .decode_batch(br#"[{"title":"a","priority":"low"},{"priority":"high"}]"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingTitle { index: 1 });
        assert_eq!(err.to_string(), "each task must have a title");
    }

    #[test]
    fn test_batch_invalid_priority_rejected() {
        let err = lenient()
            .decode_batch(br#"[{"title":"a","priority":"low"},{"title":"b","priority":"urgent"}]"#)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid priority for task 'b': must be 'high', 'medium', or 'low'"
        );
    }

    #[test]
    fn test_batch_title_checked_before_priority() {
        let err = lenient()
            .decode_batch(br#"[{"title":"","priority":"urgent"}]"#)
            .unwrap_err();
        assert_eq!(err, ValidationError::MissingTitle { index: 0 });
    }

    #[test]
    fn test_batch_malformed() {
        assert!(matches!(
            lenient().decode_batch(br#"{"title":"a","priority":"low"}"#),
            Err(ValidationError::MalformedBatch(_))
        ));
        assert!(matches!(
            lenient().decode_batch(b"nope"),
            Err(ValidationError::MalformedBatch(_))
        ));
    }
}
