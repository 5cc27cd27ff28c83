use crate::{Channel, ClientError, Connection, Publisher, Result};
use async_trait::async_trait;
use lanequeue_core::LaneSpec;
use lanequeue_protocol::Publishing;
use parking_lot::Mutex;
use tracing::{info, warn};

/// Publisher that survives the loss of its broker session.
///
/// Lanes declared through it are remembered and declared again on every new
/// channel. A request caught by a lost session still fails; the next one
/// opens a fresh channel through the [`Connection`] retry policy.
pub struct ReconnectingPublisher {
    connection: Connection,
    lanes: Mutex<Vec<LaneSpec>>,
    channel: tokio::sync::Mutex<Option<Channel>>,
}

impl ReconnectingPublisher {
    pub fn new(connection: Connection) -> Self {
        ReconnectingPublisher {
            connection,
            lanes: Mutex::new(Vec::new()),
            channel: tokio::sync::Mutex::new(None),
        }
    }

    /// The open channel, or a new one with every known lane redeclared
    async fn channel(&self) -> Result<Channel> {
        let mut current = self.channel.lock().await;
        if let Some(channel) = current.as_ref().filter(|channel| !channel.is_closed()) {
            return Ok(channel.clone());
        }

        if current.take().is_some() {
            info!("Broker session to {} lost, reopening", self.connection.address());
        }

        let channel = self.connection.open_channel().await?;
        let lanes = self.lanes.lock().clone();
        for lane in lanes {
            channel.declare_lane(lane).await?;
        }

        *current = Some(channel.clone());
        Ok(channel)
    }

    /// End the current session, if one is open
    pub async fn close(&self) {
        let channel = self.channel.lock().await.take();
        if let Some(channel) = channel {
            channel.close().await;
        }
    }
}

#[async_trait]
impl Publisher for ReconnectingPublisher {
    async fn declare_lane(&self, lane: LaneSpec) -> Result<()> {
        self.channel().await?.declare_lane(lane.clone()).await?;

        let mut lanes = self.lanes.lock();
        if !lanes.contains(&lane) {
            lanes.push(lane);
        }
        Ok(())
    }

    async fn publish(&self, lane: &str, publishing: Publishing) -> Result<()> {
        let result = self.channel().await?.publish(lane, publishing).await;
        if let Err(ClientError::ChannelClosed) = &result {
            warn!(lane = %lane, "Publish interrupted by a lost broker session");
        }
        result
    }
}
