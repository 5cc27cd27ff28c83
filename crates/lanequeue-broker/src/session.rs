use crate::lane::{Lane, QueuedMessage};
use crate::metrics::BrokerMetrics;
use crate::{Broker, BrokerError};
use futures::{SinkExt, StreamExt};
use lanequeue_protocol::{
    AckRequest, ConsumeRequest, DeliverFrame, Message, MessageCodec, NackRequest, OkResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A delivery handed to the client and not yet settled. Holding the permit
/// keeps one prefetch slot of its consumer occupied.
struct Unacked {
    queued: QueuedMessage,
    _permit: OwnedSemaphorePermit,
}

type UnackedMap = Arc<Mutex<HashMap<u64, Unacked>>>;

/// One client connection.
///
/// Requests are handled in arrival order and each one is answered before the
/// next is read. Consumers run as separate tasks that push `Deliver` frames
/// through the same outbound queue, so replies and deliveries never tear.
pub(crate) struct Session {
    broker: Arc<Broker>,
    cancel: CancellationToken,
    unacked: UnackedMap,
    next_tag: Arc<AtomicU64>,
    consumers: JoinSet<()>,
}

impl Session {
    pub(crate) fn new(broker: Arc<Broker>, cancel: CancellationToken) -> Self {
        Session {
            broker,
            cancel,
            unacked: Arc::new(Mutex::new(HashMap::new())),
            next_tag: Arc::new(AtomicU64::new(1)),
            consumers: JoinSet::new(),
        }
    }

    pub(crate) async fn run(mut self, stream: TcpStream) -> anyhow::Result<()> {
        let (mut sink, mut frames) = Framed::new(stream, MessageCodec).split();
        let (outbound, mut rx) = mpsc::unbounded_channel::<Message>();

        let writer = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                if let Err(e) = sink.send(message).await {
                    debug!("Session write failed: {}", e);
                    break;
                }
            }
        });

        let result = loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break Ok(()),
                frame = frames.next() => frame,
            };

            match frame {
                Some(Ok(message)) => {
                    let reply = self.handle_message(message, &outbound);
                    if outbound.send(reply).is_err() {
                        break Ok(());
                    }
                }
                Some(Err(e)) => break Err(e.into()),
                None => break Ok(()),
            }
        };

        self.close().await;
        drop(outbound);
        let _ = writer.await;
        result
    }

    fn handle_message(&mut self, message: Message, outbound: &mpsc::UnboundedSender<Message>) -> Message {
        let outcome = match message {
            Message::DeclareLane(req) => self.broker.declare_lane(req.lane).map(|_| None),
            Message::Publish(req) => self
                .broker
                .publish(&req.lane, req.publishing)
                .map(|id| Some(id.to_string())),
            Message::Consume(req) => self.consume(req, outbound).map(|_| None),
            Message::Ack(req) => self.ack(req).map(|_| None),
            Message::Nack(req) => self.nack(req).map(|_| None),
            other => {
                warn!("Unexpected {:?} frame from client", other.message_type());
                return Message::error("Unsupported message type");
            }
        };

        match outcome {
            Ok(message) => Message::Ok(OkResponse { message }),
            Err(e) => {
                warn!("Request failed: {}", e);
                Message::error(e.to_string())
            }
        }
    }

    fn consume(
        &mut self,
        req: ConsumeRequest,
        outbound: &mpsc::UnboundedSender<Message>,
    ) -> Result<(), BrokerError> {
        let lane = self.broker.lane(&req.lane)?;
        let prefetch = match req.prefetch {
            0 => Semaphore::MAX_PERMITS,
            n => n as usize,
        };

        info!(lane = %req.lane, prefetch = req.prefetch, "Consumer attached");

        let consumer = Consumer {
            lane,
            prefetch: Arc::new(Semaphore::new(prefetch)),
            unacked: self.unacked.clone(),
            next_tag: self.next_tag.clone(),
            outbound: outbound.clone(),
            metrics: self.broker.metrics(),
        };
        self.consumers.spawn(consumer.run(self.cancel.clone()));
        Ok(())
    }

    fn ack(&self, req: AckRequest) -> Result<(), BrokerError> {
        let entry = self
            .unacked
            .lock()
            .remove(&req.delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(req.delivery_tag))?;
        debug!(delivery_tag = req.delivery_tag, "Ack");
        self.broker.ack(&entry.queued)
    }

    fn nack(&self, req: NackRequest) -> Result<(), BrokerError> {
        let entry = self
            .unacked
            .lock()
            .remove(&req.delivery_tag)
            .ok_or(BrokerError::UnknownDeliveryTag(req.delivery_tag))?;

        let metrics = self.broker.metrics();
        metrics.inc_nacked(&entry.queued.message.lane);
        debug!(delivery_tag = req.delivery_tag, requeue = req.requeue, "Nack");

        if req.requeue {
            self.broker.requeue(entry.queued);
            Ok(())
        } else {
            self.broker.dead_letter(entry.queued)
        }
    }

    /// Stop the consumers and return every unsettled delivery to its lane
    async fn close(&mut self) {
        self.cancel.cancel();
        while self.consumers.join_next().await.is_some() {}

        let mut pending: Vec<_> = self.unacked.lock().drain().collect();
        if !pending.is_empty() {
            info!("Requeueing {} unacknowledged deliveries", pending.len());
        }
        pending.sort_by_key(|(tag, _)| *tag);
        for (_, entry) in pending {
            self.broker.requeue(entry.queued);
        }
    }
}

/// Moves messages from one lane to the session, at most `prefetch` unsettled
struct Consumer {
    lane: Arc<Lane>,
    prefetch: Arc<Semaphore>,
    unacked: UnackedMap,
    next_tag: Arc<AtomicU64>,
    outbound: mpsc::UnboundedSender<Message>,
    metrics: Arc<BrokerMetrics>,
}

impl Consumer {
    async fn run(self, cancel: CancellationToken) {
        loop {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                permit = self.prefetch.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => return,
                },
            };

            let queued = tokio::select! {
                biased;
                _ = cancel.cancelled() => return,
                queued = self.lane.next() => queued,
            };

            let delivery_tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            let frame = DeliverFrame {
                delivery_tag,
                lane: queued.message.lane.clone(),
                priority: queued.message.priority,
                redelivered: queued.redelivered,
                content_type: queued.message.content_type.clone(),
                body: queued.message.body.clone(),
            };

            self.unacked.lock().insert(
                delivery_tag,
                Unacked {
                    queued,
                    _permit: permit,
                },
            );
            self.metrics.inc_delivered(self.lane.name());
            self.metrics.set_lane_depth(self.lane.name(), self.lane.len());

            // Closed writer: the session is going away and requeues the entry
            if self.outbound.send(Message::Deliver(frame)).is_err() {
                return;
            }
        }
    }
}
