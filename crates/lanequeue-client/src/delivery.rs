use crate::Result;
use async_trait::async_trait;
use lanequeue_core::LaneSpec;
use lanequeue_protocol::{DeliverFrame, Publishing};
use std::fmt;
use std::sync::Arc;

/// Anything that can put a message on a lane and wait for the broker's
/// confirmation.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn declare_lane(&self, lane: LaneSpec) -> Result<()>;

    async fn publish(&self, lane: &str, publishing: Publishing) -> Result<()>;
}

/// Settles deliveries on the session they arrived on
#[async_trait]
pub trait Acknowledger: Send + Sync {
    async fn ack(&self, delivery_tag: u64) -> Result<()>;

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()>;
}

/// Source of deliveries for one consumer
#[async_trait]
pub trait DeliveryStream: Send {
    /// Next delivery, or `None` once the underlying session is gone
    async fn next_delivery(&mut self) -> Option<Delivery>;
}

/// A message received from a lane.
///
/// Settling consumes the delivery, so it is acked or nacked at most once.
/// A delivery dropped without settling stays unacknowledged until the
/// session closes, after which the broker redelivers it.
pub struct Delivery {
    pub delivery_tag: u64,
    pub lane: String,
    pub priority: u8,
    pub redelivered: bool,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
    acker: Arc<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(frame: DeliverFrame, acker: Arc<dyn Acknowledger>) -> Self {
        Delivery {
            delivery_tag: frame.delivery_tag,
            lane: frame.lane,
            priority: frame.priority,
            redelivered: frame.redelivered,
            content_type: frame.content_type,
            body: frame.body,
            acker,
        }
    }

    pub async fn ack(self) -> Result<()> {
        self.acker.ack(self.delivery_tag).await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.acker.nack(self.delivery_tag, requeue).await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("delivery_tag", &self.delivery_tag)
            .field("lane", &self.lane)
            .field("priority", &self.priority)
            .field("redelivered", &self.redelivered)
            .field("body_len", &self.body.len())
            .finish()
    }
}
