use lanequeue_client::RetryPolicy;
use lanequeue_core::PriorityPolicy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProducerConfig {
    pub http: HttpConfig,
    pub broker: BrokerConnectionConfig,
    pub validation: ValidationConfig,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConnectionConfig {
    pub address: String,
    pub connect_retry: RetryPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Treatment of an unknown priority on `POST /tasks`
    pub single_task_priority: PriorityPolicy,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        ProducerConfig {
            http: HttpConfig::default(),
            broker: BrokerConnectionConfig::default(),
            validation: ValidationConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for BrokerConnectionConfig {
    fn default() -> Self {
        BrokerConnectionConfig {
            address: "127.0.0.1:5680".to_string(),
            connect_retry: RetryPolicy::default(),
        }
    }
}

impl ProducerConfig {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: ProducerConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    pub fn http_address(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProducerConfig::default();
        assert_eq!(config.http_address(), "0.0.0.0:8080");
        assert_eq!(config.validation.single_task_priority, PriorityPolicy::Lenient);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_from_yaml() {
        let config: ProducerConfig = serde_yaml::from_str(
            r#"
http:
  port: 9000
broker:
  address: "broker:5680"
  connect_retry:
    max_attempts: 3
validation:
  single_task_priority: strict
log_level: debug
"#,
        )
        .unwrap();

        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.broker.address, "broker:5680");
        assert_eq!(config.broker.connect_retry.max_attempts, 3);
        assert_eq!(config.broker.connect_retry.base_delay_ms, 500);
        assert_eq!(config.validation.single_task_priority, PriorityPolicy::Strict);
        assert_eq!(config.log_level, "debug");
    }
}
