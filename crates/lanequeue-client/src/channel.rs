use crate::{Acknowledger, ClientError, Delivery, DeliveryStream, Publisher, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use lanequeue_core::LaneSpec;
use lanequeue_protocol::{
    AckRequest, ConsumeRequest, DeclareLaneRequest, DeliverFrame, Message, MessageCodec,
    NackRequest, PublishRequest, Publishing,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

type Reply = oneshot::Sender<Result<Option<String>>>;

struct Request {
    message: Message,
    reply: Reply,
}

struct ChannelInner {
    requests: mpsc::UnboundedSender<Request>,
    deliveries: Mutex<Option<mpsc::UnboundedReceiver<DeliverFrame>>>,
    closed: CancellationToken,
    session: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.closed.cancel();
    }
}

/// One broker session.
///
/// Requests are answered in order by the broker, so replies are matched to
/// callers first-in first-out. Deliveries for the channel's consumer are
/// buffered from the moment the channel opens.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn open(stream: TcpStream) -> Self {
        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (deliveries_tx, deliveries) = mpsc::unbounded_channel();
        let closed = CancellationToken::new();

        let session = tokio::spawn(run_session(
            Framed::new(stream, MessageCodec),
            requests_rx,
            deliveries_tx,
            closed.clone(),
        ));

        Channel {
            inner: Arc::new(ChannelInner {
                requests,
                deliveries: Mutex::new(Some(deliveries)),
                closed,
                session: Mutex::new(Some(session)),
            }),
        }
    }

    async fn request(&self, message: Message) -> Result<Option<String>> {
        let (reply, response) = oneshot::channel();
        self.inner
            .requests
            .send(Request { message, reply })
            .map_err(|_| ClientError::ChannelClosed)?;
        response.await.map_err(|_| ClientError::ChannelClosed)?
    }

    /// Create the lane, or confirm it exists with the same arguments
    pub async fn declare_lane(&self, lane: LaneSpec) -> Result<()> {
        let name = lane.name.clone();
        self.request(Message::DeclareLane(DeclareLaneRequest { lane }))
            .await?;
        debug!(lane = %name, "Lane declared");
        Ok(())
    }

    /// Publish and wait for the broker's confirmation
    pub async fn publish(&self, lane: &str, publishing: Publishing) -> Result<()> {
        self.request(Message::Publish(PublishRequest {
            lane: lane.to_string(),
            publishing,
        }))
        .await?;
        Ok(())
    }

    /// Start consuming a lane. A channel carries a single consumer.
    pub async fn consume(&self, lane: &str, prefetch: u16) -> Result<Consumer> {
        let deliveries = self
            .inner
            .deliveries
            .lock()
            .take()
            .ok_or(ClientError::ConsumerTaken)?;

        self.request(Message::Consume(ConsumeRequest {
            lane: lane.to_string(),
            prefetch,
        }))
        .await?;

        debug!(lane = %lane, prefetch, "Consuming");
        Ok(Consumer {
            deliveries,
            channel: self.clone(),
        })
    }

    pub async fn ack(&self, delivery_tag: u64) -> Result<()> {
        self.request(Message::Ack(AckRequest { delivery_tag }))
            .await?;
        Ok(())
    }

    pub async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        self.request(Message::Nack(NackRequest {
            delivery_tag,
            requeue,
        }))
        .await?;
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.is_cancelled()
    }

    /// End the session. Unsettled deliveries go back to their lanes.
    pub async fn close(&self) {
        self.inner.closed.cancel();
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            let _ = session.await;
        }
    }
}

#[async_trait]
impl Publisher for Channel {
    async fn declare_lane(&self, lane: LaneSpec) -> Result<()> {
        Channel::declare_lane(self, lane).await
    }

    async fn publish(&self, lane: &str, publishing: Publishing) -> Result<()> {
        Channel::publish(self, lane, publishing).await
    }
}

#[async_trait]
impl Acknowledger for Channel {
    async fn ack(&self, delivery_tag: u64) -> Result<()> {
        Channel::ack(self, delivery_tag).await
    }

    async fn nack(&self, delivery_tag: u64, requeue: bool) -> Result<()> {
        Channel::nack(self, delivery_tag, requeue).await
    }
}

/// Deliveries of one lane, settled through the channel they came from
pub struct Consumer {
    deliveries: mpsc::UnboundedReceiver<DeliverFrame>,
    channel: Channel,
}

#[async_trait]
impl DeliveryStream for Consumer {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        let frame = self.deliveries.recv().await?;
        Some(Delivery::new(frame, Arc::new(self.channel.clone())))
    }
}

async fn run_session(
    framed: Framed<TcpStream, MessageCodec>,
    mut requests: mpsc::UnboundedReceiver<Request>,
    deliveries: mpsc::UnboundedSender<DeliverFrame>,
    closed: CancellationToken,
) {
    let (mut sink, mut frames) = framed.split();
    let mut pending: VecDeque<Reply> = VecDeque::new();

    loop {
        tokio::select! {
            _ = closed.cancelled() => break,
            request = requests.recv() => {
                let Some(Request { message, reply }) = request else { break };
                if let Err(e) = sink.send(message).await {
                    let _ = reply.send(Err(e.into()));
                    break;
                }
                pending.push_back(reply);
            }
            frame = frames.next() => {
                match frame {
                    Some(Ok(Message::Deliver(frame))) => {
                        // Receiver gone: nobody consumes, the broker redelivers on close
                        let _ = deliveries.send(frame);
                    }
                    Some(Ok(Message::Ok(ok))) => answer(&mut pending, Ok(ok.message)),
                    Some(Ok(Message::Error(e))) => {
                        answer(&mut pending, Err(ClientError::ServerError(e.error)))
                    }
                    Some(Ok(other)) => {
                        warn!("Unexpected {:?} frame from broker", other.message_type());
                    }
                    Some(Err(e)) => {
                        warn!("Broker session failed: {}", e);
                        break;
                    }
                    None => {
                        debug!("Broker closed the session");
                        break;
                    }
                }
            }
        }
    }

    closed.cancel();
    let _ = sink.close().await;
}

fn answer(pending: &mut VecDeque<Reply>, outcome: Result<Option<String>>) {
    match pending.pop_front() {
        Some(reply) => {
            let _ = reply.send(outcome);
        }
        None => warn!("Broker reply without a pending request"),
    }
}
