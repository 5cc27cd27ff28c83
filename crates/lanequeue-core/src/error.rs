use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TaskError>;

/// Reasons a submission is refused before it reaches a lane.
///
/// The messages are returned verbatim to HTTP callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid task format: {0}")]
    MalformedTask(String),

    #[error("invalid JSON format or not an array of tasks: {0}")]
    MalformedBatch(String),

    #[error("batch must contain at least one task")]
    EmptyBatch,

    #[error("each task must have a title")]
    MissingTitle { index: usize },

    #[error("invalid priority for task '{title}': must be 'high', 'medium', or 'low'")]
    InvalidPriority { title: String, value: String },
}
