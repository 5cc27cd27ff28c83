use lanequeue_core::LaneSpec;
use serde::{Deserialize, Serialize};

/// Message types for the broker protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageType {
    DeclareLane = 1,
    Publish = 2,
    Consume = 3,
    Deliver = 4,
    Ack = 5,
    Nack = 6,
    Ok = 7,
    Error = 8,
}

impl MessageType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageType::DeclareLane),
            2 => Some(MessageType::Publish),
            3 => Some(MessageType::Consume),
            4 => Some(MessageType::Deliver),
            5 => Some(MessageType::Ack),
            6 => Some(MessageType::Nack),
            7 => Some(MessageType::Ok),
            8 => Some(MessageType::Error),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

/// Protocol messages.
///
/// Every client request (`DeclareLane`, `Publish`, `Consume`, `Ack`, `Nack`)
/// is answered by exactly one `Ok` or `Error`, in request order. `Deliver` is
/// pushed by the broker at any time once a session consumes a lane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Create a lane, or check that an existing one has the same arguments
    DeclareLane(DeclareLaneRequest),

    /// Append a message to a lane
    Publish(PublishRequest),

    /// Start receiving deliveries from a lane on this session
    Consume(ConsumeRequest),

    /// A message handed to a consumer
    Deliver(DeliverFrame),

    /// Consumer commit: the message is removed from its lane
    Ack(AckRequest),

    /// Consumer rejection: requeue or dead-letter the message
    Nack(NackRequest),

    /// Positive reply
    Ok(OkResponse),

    /// Negative reply
    Error(ErrorResponse),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::DeclareLane(_) => MessageType::DeclareLane,
            Message::Publish(_) => MessageType::Publish,
            Message::Consume(_) => MessageType::Consume,
            Message::Deliver(_) => MessageType::Deliver,
            Message::Ack(_) => MessageType::Ack,
            Message::Nack(_) => MessageType::Nack,
            Message::Ok(_) => MessageType::Ok,
            Message::Error(_) => MessageType::Error,
        }
    }

    pub fn ok() -> Self {
        Message::Ok(OkResponse { message: None })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Message::Error(ErrorResponse {
            error: error.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclareLaneRequest {
    pub lane: LaneSpec,
}

/// Message properties and body, as given by the publisher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Publishing {
    /// Delivery priority, clamped to the lane's ceiling by the broker
    pub priority: u8,
    /// Stored by the broker before the publish is confirmed
    pub persistent: bool,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl Publishing {
    pub fn persistent(priority: u8, content_type: &str, body: Vec<u8>) -> Self {
        Publishing {
            priority,
            persistent: true,
            content_type: Some(content_type.to_string()),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub lane: String,
    pub publishing: Publishing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeRequest {
    pub lane: String,
    /// Maximum unacknowledged deliveries outstanding for this consumer
    pub prefetch: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverFrame {
    /// Session-scoped handle used to ack or nack this delivery
    pub delivery_tag: u64,
    pub lane: String,
    pub priority: u8,
    /// Set when the message was delivered before and not acknowledged
    pub redelivered: bool,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AckRequest {
    pub delivery_tag: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NackRequest {
    pub delivery_tag: u64,
    pub requeue: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OkResponse {
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
