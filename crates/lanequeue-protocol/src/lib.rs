mod codec;
mod message;

pub use codec::MessageCodec;
pub use message::{
    AckRequest, ConsumeRequest, DeclareLaneRequest, DeliverFrame, ErrorResponse, Message,
    MessageType, NackRequest, OkResponse, PublishRequest, Publishing,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid message type: {0}")]
    InvalidMessageType(u8),

    #[error("Empty frame")]
    EmptyFrame,

    #[error("Message too large: {0} bytes")]
    MessageTooLarge(usize),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] bincode::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Maximum frame size: 11MB
pub const MAX_MESSAGE_SIZE: usize = 11 * 1024 * 1024;
