use lanequeue_core::LaneSpec;
use lanequeue_persistence::StoredMessage;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use tokio::sync::Notify;

/// A message waiting in a lane, or handed out and not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub message: StoredMessage,
    /// Written to the message store when published
    pub persisted: bool,
    pub redelivered: bool,
}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        // Higher priority first
        match self.message.priority.cmp(&other.message.priority) {
            // Within same priority, lower sequence first (FIFO)
            Ordering::Equal => other.message.id.cmp(&self.message.id),
            ordering => ordering,
        }
    }
}

/// A named lane: a priority queue of ready messages.
///
/// Unacknowledged deliveries are owned by the consuming session, not by the
/// lane; they come back through [`Lane::push`] when requeued.
pub struct Lane {
    spec: LaneSpec,
    heap: Mutex<BinaryHeap<QueuedMessage>>,
    available: Notify,
}

impl Lane {
    pub fn new(spec: LaneSpec) -> Self {
        Lane {
            spec,
            heap: Mutex::new(BinaryHeap::new()),
            available: Notify::new(),
        }
    }

    pub fn spec(&self) -> &LaneSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Push a message into the lane, clamping its priority to the lane ceiling
    pub fn push(&self, mut queued: QueuedMessage) {
        queued.message.priority = self.spec.clamp(queued.message.priority);
        self.heap.lock().push(queued);
        self.available.notify_one();
    }

    /// Pop the highest priority message, if any
    pub fn pop(&self) -> Option<QueuedMessage> {
        self.heap.lock().pop()
    }

    /// Wait until a message is available and take it
    pub async fn next(&self) -> QueuedMessage {
        loop {
            let notified = self.available.notified();
            if let Some(queued) = self.pop() {
                // Another consumer may be parked while messages remain
                if !self.is_empty() {
                    self.available.notify_one();
                }
                return queued;
            }
            notified.await;
        }
    }

    pub fn len(&self) -> usize {
        self.heap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
