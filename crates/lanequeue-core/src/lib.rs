mod error;
pub mod lane;
pub mod priority;
pub mod task;
pub mod validation;

pub use error::{Result, TaskError, ValidationError};
pub use lane::{LaneKind, LaneSpec, BATCH_LANE, MAX_LANE_PRIORITY, TASK_LANE};
pub use priority::Priority;
pub use task::{generate_task_id, Batch, Task, TaskId};
pub use validation::{PriorityPolicy, SingleSubmission, SubmissionValidator};

/// Content type of every task message published to a lane
pub const CONTENT_TYPE_JSON: &str = "application/json";
