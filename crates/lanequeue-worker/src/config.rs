use lanequeue_client::RetryPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub broker: BrokerConnectionConfig,
    /// Unacknowledged deliveries the broker may hand each lane loop
    pub prefetch: u16,
    /// Requeue messages whose execution failed instead of dead-lettering them
    pub requeue_failed: bool,
    pub simulated_work_max_delay_secs: u64,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConnectionConfig {
    pub address: String,
    pub connect_retry: RetryPolicy,
}

impl Default for BrokerConnectionConfig {
    fn default() -> Self {
        BrokerConnectionConfig {
            address: "127.0.0.1:5680".to_string(),
            connect_retry: RetryPolicy::default(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            broker: BrokerConnectionConfig::default(),
            prefetch: 1,
            requeue_failed: false,
            simulated_work_max_delay_secs: 3,
            log_level: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: WorkerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }
}
