//! Client side of the lane broker protocol.
//!
//! A [`Connection`] knows where the broker is and how hard to try reaching
//! it. Every [`Channel`] it opens is its own broker session, so independent
//! consumers never share a stream. Producers and workers depend on the
//! [`Publisher`], [`DeliveryStream`] and [`Acknowledger`] seams rather than on
//! the concrete channel. [`ReconnectingPublisher`] reopens its channel when
//! the broker session is lost.

mod channel;
mod connection;
mod delivery;
mod publisher;
mod retry;

pub use channel::{Channel, Consumer};
pub use connection::Connection;
pub use delivery::{Acknowledger, Delivery, DeliveryStream, Publisher};
pub use publisher::ReconnectingPublisher;
pub use retry::RetryPolicy;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(#[from] lanequeue_protocol::ProtocolError),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Channel already has a consumer")]
    ConsumerTaken,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;
