use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest delivery priority a lane accepts; larger values are clamped
pub const MAX_LANE_PRIORITY: u8 = 10;

/// Lane carrying one task per message
pub const TASK_LANE: &str = "task_queue";

/// Lane carrying one batch (a JSON array of tasks) per message
pub const BATCH_LANE: &str = "batch_task_queue";

const DEAD_LETTER_SUFFIX: &str = ".dead_letter";

/// Declaration of a named delivery channel on the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LaneSpec {
    pub name: String,
    /// Persistent messages on a durable lane survive a broker restart
    pub durable: bool,
    pub max_priority: u8,
    /// Lane receiving messages rejected without requeue
    pub dead_letter: Option<String>,
}

impl LaneSpec {
    pub fn new(name: impl Into<String>) -> Self {
        LaneSpec {
            name: name.into(),
            durable: true,
            max_priority: MAX_LANE_PRIORITY,
            dead_letter: None,
        }
    }

    pub fn with_dead_letter(mut self, lane: impl Into<String>) -> Self {
        self.dead_letter = Some(lane.into());
        self
    }

    pub fn transient(mut self) -> Self {
        self.durable = false;
        self
    }

    /// Clamp a requested delivery priority to this lane's ceiling
    pub fn clamp(&self, priority: u8) -> u8 {
        priority.min(self.max_priority)
    }
}

/// The two independent lanes of the dispatch protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LaneKind {
    Single,
    Batch,
}

impl LaneKind {
    pub const ALL: [LaneKind; 2] = [LaneKind::Single, LaneKind::Batch];

    /// Broker name of the lane
    pub fn lane_name(&self) -> &'static str {
        match self {
            LaneKind::Single => TASK_LANE,
            LaneKind::Batch => BATCH_LANE,
        }
    }

    /// Short label used in logs and span attributes
    pub fn as_str(&self) -> &'static str {
        match self {
            LaneKind::Single => "single",
            LaneKind::Batch => "batch",
        }
    }

    pub fn dead_letter_name(&self) -> String {
        format!("{}{}", self.lane_name(), DEAD_LETTER_SUFFIX)
    }

    pub fn spec(&self) -> LaneSpec {
        LaneSpec::new(self.lane_name()).with_dead_letter(self.dead_letter_name())
    }

    pub fn dead_letter_spec(&self) -> LaneSpec {
        LaneSpec::new(self.dead_letter_name())
    }

    /// Every lane a producer or worker declares at startup, dead-letter
    /// lanes first so the main lanes can reference them.
    pub fn all_specs() -> Vec<LaneSpec> {
        let mut specs: Vec<LaneSpec> = Self::ALL.iter().map(LaneKind::dead_letter_spec).collect();
        specs.extend(Self::ALL.iter().map(LaneKind::spec));
        specs
    }
}

impl fmt::Display for LaneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
