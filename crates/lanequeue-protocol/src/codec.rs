use crate::{Message, MessageType, ProtocolError, Result, MAX_MESSAGE_SIZE};
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for encoding/decoding messages with length-prefixed framing
///
/// Frame format: [4-byte length (big-endian)] [1-byte message type] [payload]
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageCodec;

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        // Need at least 5 bytes for length prefix + message type
        if src.len() < 5 {
            return Ok(None);
        }

        // Read length prefix without consuming
        let mut length_bytes = [0u8; 4];
        length_bytes.copy_from_slice(&src[0..4]);
        let length = u32::from_be_bytes(length_bytes) as usize;

        // Reject empty and oversized frames
        if length == 0 {
            return Err(ProtocolError::EmptyFrame);
        }
        if length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(length));
        }

        // Wait for complete message
        if src.len() < 4 + length {
            // Reserve space for the full message
            src.reserve(4 + length - src.len());
            return Ok(None);
        }

        // We have a complete message, consume it
        src.advance(4); // Skip length prefix

        // Read message type
        let msg_type_byte = src.get_u8();
        let msg_type = MessageType::from_u8(msg_type_byte)
            .ok_or(ProtocolError::InvalidMessageType(msg_type_byte))?;

        // Read payload
        let payload = src.split_to(length - 1); // Subtract message type byte

        // Deserialize based on message type
        let message = match msg_type {
            MessageType::DeclareLane => Message::DeclareLane(bincode::deserialize(&payload)?),
            MessageType::Publish => Message::Publish(bincode::deserialize(&payload)?),
            MessageType::Consume => Message::Consume(bincode::deserialize(&payload)?),
            MessageType::Deliver => Message::Deliver(bincode::deserialize(&payload)?),
            MessageType::Ack => Message::Ack(bincode::deserialize(&payload)?),
            MessageType::Nack => Message::Nack(bincode::deserialize(&payload)?),
            MessageType::Ok => Message::Ok(bincode::deserialize(&payload)?),
            MessageType::Error => Message::Error(bincode::deserialize(&payload)?),
        };

        Ok(Some(message))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<()> {
        // Serialize the payload
        let payload = match &item {
            Message::DeclareLane(req) => bincode::serialize(req)?,
            Message::Publish(req) => bincode::serialize(req)?,
            Message::Consume(req) => bincode::serialize(req)?,
            Message::Deliver(frame) => bincode::serialize(frame)?,
            Message::Ack(req) => bincode::serialize(req)?,
            Message::Nack(req) => bincode::serialize(req)?,
            Message::Ok(resp) => bincode::serialize(resp)?,
            Message::Error(resp) => bincode::serialize(resp)?,
        };

        // Check size
        let total_length = 1 + payload.len(); // message type + payload
        if total_length > MAX_MESSAGE_SIZE {
            return Err(ProtocolError::MessageTooLarge(total_length));
        }

        // Reserve space
        dst.reserve(4 + total_length);

        // Write length prefix (message type + payload)
        dst.put_u32(total_length as u32);

        // Write message type
        dst.put_u8(item.message_type().as_u8());

        // Write payload
        dst.put_slice(&payload);

        Ok(())
    }
}
