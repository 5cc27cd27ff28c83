use crate::config::BrokerConfig;
use crate::lane::{Lane, QueuedMessage};
use crate::metrics::BrokerMetrics;
use crate::session::Session;
use crate::{BrokerError, Result};
use chrono::Utc;
use dashmap::DashMap;
use lanequeue_core::LaneSpec;
use lanequeue_persistence::{MessageStore, StoredMessage};
use lanequeue_protocol::Publishing;

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Lane broker: owns the lanes, the optional message store and the metrics.
///
/// Connections are served by [`Broker::serve`]; each one becomes a session
/// that may publish, consume and acknowledge.
pub struct Broker {
    config: Arc<BrokerConfig>,
    lanes: DashMap<String, Arc<Lane>>,
    store: Option<Arc<MessageStore>>,
    metrics: Arc<BrokerMetrics>,
    next_id: AtomicU64,
    shutdown: CancellationToken,
}

impl Broker {
    /// Create a broker, restoring durable lanes and their stored messages
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let metrics = Arc::new(BrokerMetrics::new()?);
        let lanes = DashMap::new();
        let mut next_id = 1;

        let store = if config.persistence.enabled {
            let store = MessageStore::open(config.to_store_config())?;

            for spec in store.load_lanes()? {
                let lane = Lane::new(spec);
                let messages = store.load_lane(lane.name())?;
                info!(lane = %lane.name(), "Restoring {} stored messages", messages.len());
                for message in messages {
                    lane.push(QueuedMessage {
                        message,
                        persisted: true,
                        redelivered: false,
                    });
                }
                metrics.set_lane_depth(lane.name(), lane.len());
                lanes.insert(lane.name().to_string(), Arc::new(lane));
            }

            if let Some(max) = store.max_message_id()? {
                next_id = max + 1;
            }
            Some(Arc::new(store))
        } else {
            info!("Persistence disabled, messages live in memory only");
            None
        };

        Ok(Broker {
            config: Arc::new(config),
            lanes,
            store,
            metrics,
            next_id: AtomicU64::new(next_id),
            shutdown: CancellationToken::new(),
        })
    }

    /// Create a lane, or check that an existing one was declared the same way
    pub fn declare_lane(&self, spec: LaneSpec) -> Result<()> {
        if spec.name.is_empty() || spec.name.contains('\0') {
            return Err(BrokerError::InvalidLaneName(spec.name));
        }

        if let Some(existing) = self.lanes.get(&spec.name) {
            if existing.spec() != &spec {
                return Err(BrokerError::LaneMismatch(spec.name));
            }
            return Ok(());
        }

        if spec.durable {
            if let Some(store) = &self.store {
                store.save_lane(&spec)?;
            }
        }

        info!(lane = %spec.name, durable = spec.durable, "Declared lane");
        self.metrics.set_lane_depth(&spec.name, 0);
        self.lanes
            .entry(spec.name.clone())
            .or_insert_with(|| Arc::new(Lane::new(spec)));
        Ok(())
    }

    pub fn lane(&self, name: &str) -> Result<Arc<Lane>> {
        self.lanes
            .get(name)
            .map(|lane| lane.clone())
            .ok_or_else(|| BrokerError::LaneNotFound(name.to_string()))
    }

    /// Append a message to a lane. Persistent messages on durable lanes are
    /// stored before this returns.
    pub fn publish(&self, lane_name: &str, publishing: Publishing) -> Result<u64> {
        let lane = self.lane(lane_name)?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        let message = StoredMessage {
            id,
            lane: lane_name.to_string(),
            priority: lane.spec().clamp(publishing.priority),
            content_type: publishing.content_type,
            body: publishing.body,
            published_at: Utc::now(),
        };

        let persisted = match &self.store {
            Some(store) if publishing.persistent && lane.spec().durable => {
                store.put(&message)?;
                true
            }
            _ => false,
        };

        debug!(lane = %lane_name, id, priority = message.priority, "Published message");
        lane.push(QueuedMessage {
            message,
            persisted,
            redelivered: false,
        });

        self.metrics.inc_published(lane_name);
        self.metrics.set_lane_depth(lane_name, lane.len());
        Ok(id)
    }

    /// Forget an acknowledged message
    pub fn ack(&self, queued: &QueuedMessage) -> Result<()> {
        if queued.persisted {
            if let Some(store) = &self.store {
                store.remove(&queued.message.lane, queued.message.id)?;
            }
        }
        self.metrics.inc_acked(&queued.message.lane);
        Ok(())
    }

    /// Put a delivered message back into its lane, marked as redelivered
    pub fn requeue(&self, mut queued: QueuedMessage) {
        let lane_name = queued.message.lane.clone();
        match self.lane(&lane_name) {
            Ok(lane) => {
                queued.redelivered = true;
                lane.push(queued);
                self.metrics.inc_redelivered(&lane_name);
                self.metrics.set_lane_depth(&lane_name, lane.len());
            }
            Err(e) => error!(lane = %lane_name, "Cannot requeue message: {}", e),
        }
    }

    /// Route a rejected message to its lane's dead-letter lane, or drop it
    pub fn dead_letter(&self, queued: QueuedMessage) -> Result<()> {
        let source = queued.message.lane.clone();
        let target = self
            .lane(&source)
            .ok()
            .and_then(|lane| lane.spec().dead_letter.clone())
            .and_then(|name| self.lane(&name).ok());

        let Some(target) = target else {
            warn!(lane = %source, id = queued.message.id, "No dead-letter lane, dropping rejected message");
            return self.forget(&queued);
        };

        let message = StoredMessage {
            lane: target.name().to_string(),
            priority: target.spec().clamp(queued.message.priority),
            ..queued.message
        };

        let persisted = match &self.store {
            Some(store) if queued.persisted && target.spec().durable => {
                store.relocate(&source, &message)?;
                true
            }
            Some(store) if queued.persisted => {
                store.remove(&source, message.id)?;
                false
            }
            _ => false,
        };

        info!(from = %source, to = %target.name(), id = message.id, "Dead-lettered message");
        target.push(QueuedMessage {
            message,
            persisted,
            redelivered: false,
        });
        self.metrics.set_lane_depth(target.name(), target.len());
        Ok(())
    }

    fn forget(&self, queued: &QueuedMessage) -> Result<()> {
        if queued.persisted {
            if let Some(store) = &self.store {
                store.remove(&queued.message.lane, queued.message.id)?;
            }
        }
        Ok(())
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.broker.host, self.config.broker.port);
        let listener = TcpListener::bind(&addr).await?;

        info!("Broker listening on {}", addr);

        self.serve(listener).await
    }

    /// Accept connections on an already bound listener until shutdown
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> anyhow::Result<()> {
        let limit = Arc::new(Semaphore::new(self.config.broker.max_connections.max(1)));

        loop {
            let permit = tokio::select! {
                permit = limit.clone().acquire_owned() => permit?,
                _ = self.shutdown.cancelled() => break,
            };

            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            debug!("New connection from {}", peer);
                            let broker = self.clone();
                            tokio::spawn(async move {
                                broker.handle_connection(stream, peer).await;
                                drop(permit);
                            });
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("Shutting down broker");
        if let Some(store) = &self.store {
            store.sync()?;
        }
        Ok(())
    }

    async fn handle_connection(self: Arc<Self>, stream: tokio::net::TcpStream, peer: SocketAddr) {
        self.metrics.sessions_connected.inc();
        let cancel = self.shutdown.child_token();
        let session = Session::new(self.clone(), cancel);

        if let Err(e) = session.run(stream).await {
            warn!("Session {} ended with error: {}", peer, e);
        } else {
            debug!("Session {} closed", peer);
        }
        self.metrics.sessions_connected.dec();
    }

    pub fn metrics(&self) -> Arc<BrokerMetrics> {
        self.metrics.clone()
    }

    /// Stop accepting connections and close every session
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lanequeue_core::LaneKind;
    use tempfile::TempDir;

    fn config(temp_dir: Option<&TempDir>) -> BrokerConfig {
        let mut config = BrokerConfig::default();
        match temp_dir {
            Some(dir) => config.persistence.data_dir = dir.path().to_path_buf(),
            None => config.persistence.enabled = false,
        }
        config
    }

    fn declare_all(broker: &Broker) {
        for spec in LaneKind::all_specs() {
            broker.declare_lane(spec).unwrap();
        }
    }

    fn publish(broker: &Broker, lane: &str, priority: u8, body: &str) -> u64 {
        broker
            .publish(
                lane,
                Publishing::persistent(priority, "application/json", body.as_bytes().to_vec()),
            )
            .unwrap()
    }

    #[test]
    fn test_redeclare_with_same_arguments() {
        let broker = Broker::new(config(None)).unwrap();
        declare_all(&broker);
        declare_all(&broker);
    }

    #[test]
    fn test_redeclare_with_different_arguments() {
        let broker = Broker::new(config(None)).unwrap();
        declare_all(&broker);

        let err = broker
            .declare_lane(LaneSpec::new("task_queue").transient())
            .unwrap_err();
        assert!(matches!(err, BrokerError::LaneMismatch(_)));
    }

    #[test]
    fn test_publish_to_unknown_lane() {
        let broker = Broker::new(config(None)).unwrap();
        let err = broker
            .publish("nowhere", Publishing::persistent(1, "application/json", vec![]))
            .unwrap_err();
        assert!(matches!(err, BrokerError::LaneNotFound(_)));
    }

    #[test]
    fn test_publish_orders_by_priority() {
        let broker = Broker::new(config(None)).unwrap();
        declare_all(&broker);

        publish(&broker, "task_queue", 1, "low");
        publish(&broker, "task_queue", 10, "high");
        publish(&broker, "task_queue", 0, "unknown");
        publish(&broker, "task_queue", 5, "medium");

        let lane = broker.lane("task_queue").unwrap();
        let bodies: Vec<String> = std::iter::from_fn(|| lane.pop())
            .map(|q| String::from_utf8(q.message.body).unwrap())
            .collect();
        assert_eq!(bodies, vec!["high", "medium", "low", "unknown"]);
    }

    #[test]
    fn test_requeue_marks_redelivered() {
        let broker = Broker::new(config(None)).unwrap();
        declare_all(&broker);
        publish(&broker, "task_queue", 5, "x");

        let lane = broker.lane("task_queue").unwrap();
        let delivered = lane.pop().unwrap();
        assert!(!delivered.redelivered);

        broker.requeue(delivered);
        assert!(lane.pop().unwrap().redelivered);
    }

    #[test]
    fn test_dead_letter_moves_message() {
        let temp_dir = TempDir::new().unwrap();
        let broker = Broker::new(config(Some(&temp_dir))).unwrap();
        declare_all(&broker);
        publish(&broker, "batch_task_queue", 10, "[]");

        let delivered = broker.lane("batch_task_queue").unwrap().pop().unwrap();
        broker.dead_letter(delivered).unwrap();

        let dead = broker.lane("batch_task_queue.dead_letter").unwrap();
        let moved = dead.pop().unwrap();
        assert_eq!(moved.message.body, b"[]");
        assert!(moved.persisted);
        assert!(broker.lane("batch_task_queue").unwrap().is_empty());
    }

    #[test]
    fn test_dead_letter_without_target_drops() {
        let broker = Broker::new(config(None)).unwrap();
        broker.declare_lane(LaneSpec::new("plain")).unwrap();
        publish(&broker, "plain", 1, "x");

        let delivered = broker.lane("plain").unwrap().pop().unwrap();
        broker.dead_letter(delivered).unwrap();
        assert!(broker.lane("plain").unwrap().is_empty());
    }

    #[test]
    fn test_unacked_messages_survive_restart() {
        let temp_dir = TempDir::new().unwrap();

        {
            let broker = Broker::new(config(Some(&temp_dir))).unwrap();
            declare_all(&broker);
            publish(&broker, "task_queue", 1, "kept");
            let acked_id = publish(&broker, "task_queue", 10, "acked");

            let lane = broker.lane("task_queue").unwrap();
            let delivered = lane.pop().unwrap();
            assert_eq!(delivered.message.id, acked_id);
            broker.ack(&delivered).unwrap();
        }

        let broker = Broker::new(config(Some(&temp_dir))).unwrap();
        let lane = broker.lane("task_queue").unwrap();
        assert_eq!(lane.len(), 1);
        assert_eq!(lane.pop().unwrap().message.body, b"kept");

        // the sequence resumes past stored ids
        declare_all(&broker);
        let id = publish(&broker, "task_queue", 1, "after");
        assert!(id > 2);
    }

    #[test]
    fn test_transient_lane_is_not_stored() {
        let temp_dir = TempDir::new().unwrap();

        {
            let broker = Broker::new(config(Some(&temp_dir))).unwrap();
            broker
                .declare_lane(LaneSpec::new("scratch").transient())
                .unwrap();
            publish(&broker, "scratch", 1, "gone");
        }

        let broker = Broker::new(config(Some(&temp_dir))).unwrap();
        assert!(broker.lane("scratch").is_err());
    }
}
