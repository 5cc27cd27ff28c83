use prometheus::{IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

/// Prometheus metrics for the broker
pub struct BrokerMetrics {
    pub registry: Registry,

    // Message flow per lane
    pub messages_published: IntCounterVec,
    pub messages_delivered: IntCounterVec,
    pub messages_acked: IntCounterVec,
    pub messages_nacked: IntCounterVec,
    pub messages_redelivered: IntCounterVec,

    // Ready messages per lane
    pub lane_depth: IntGaugeVec,

    pub sessions_connected: IntGauge,
}

fn lane_counter(registry: &Registry, name: &str, help: &str) -> prometheus::Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), &["lane"])?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl BrokerMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let messages_published = lane_counter(
            &registry,
            "lq_messages_published_total",
            "Messages accepted by the broker",
        )?;
        let messages_delivered = lane_counter(
            &registry,
            "lq_messages_delivered_total",
            "Messages handed to consumers",
        )?;
        let messages_acked = lane_counter(
            &registry,
            "lq_messages_acked_total",
            "Deliveries acknowledged by consumers",
        )?;
        let messages_nacked = lane_counter(
            &registry,
            "lq_messages_nacked_total",
            "Deliveries rejected by consumers",
        )?;
        let messages_redelivered = lane_counter(
            &registry,
            "lq_messages_redelivered_total",
            "Messages returned to their lane for another delivery",
        )?;

        let lane_depth = IntGaugeVec::new(
            Opts::new("lq_lane_depth", "Messages ready for delivery"),
            &["lane"],
        )?;
        registry.register(Box::new(lane_depth.clone()))?;

        let sessions_connected = IntGauge::new("lq_sessions_connected", "Open client sessions")?;
        registry.register(Box::new(sessions_connected.clone()))?;

        Ok(BrokerMetrics {
            registry,
            messages_published,
            messages_delivered,
            messages_acked,
            messages_nacked,
            messages_redelivered,
            lane_depth,
            sessions_connected,
        })
    }

    pub fn inc_published(&self, lane: &str) {
        self.messages_published.with_label_values(&[lane]).inc();
    }

    pub fn inc_delivered(&self, lane: &str) {
        self.messages_delivered.with_label_values(&[lane]).inc();
    }

    pub fn inc_acked(&self, lane: &str) {
        self.messages_acked.with_label_values(&[lane]).inc();
    }

    pub fn inc_nacked(&self, lane: &str) {
        self.messages_nacked.with_label_values(&[lane]).inc();
    }

    pub fn inc_redelivered(&self, lane: &str) {
        self.messages_redelivered.with_label_values(&[lane]).inc();
    }

    pub fn set_lane_depth(&self, lane: &str, depth: usize) {
        self.lane_depth
            .with_label_values(&[lane])
            .set(depth as i64);
    }
}
