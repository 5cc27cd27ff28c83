use crate::{Channel, ClientError, Result, RetryPolicy};
use tokio::net::TcpStream;
use tracing::{info, warn};

/// Broker address plus the policy used to reach it.
///
/// Holds no socket itself; each [`Channel`] is a separate session.
#[derive(Debug, Clone)]
pub struct Connection {
    address: String,
    retry: RetryPolicy,
}

impl Connection {
    /// Reach the broker once, retrying with backoff, so that an unreachable
    /// broker is reported at startup rather than on first use.
    pub async fn connect(address: impl Into<String>, retry: RetryPolicy) -> Result<Self> {
        let connection = Connection {
            address: address.into(),
            retry,
        };
        drop(connection.dial().await?);
        info!("Broker reachable at {}", connection.address);
        Ok(connection)
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Open a new session on the broker
    pub async fn open_channel(&self) -> Result<Channel> {
        let stream = self.dial().await?;
        Ok(Channel::open(stream))
    }

    async fn dial(&self) -> Result<TcpStream> {
        let mut attempts = 0;
        loop {
            match TcpStream::connect(&self.address).await {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => {
                    attempts += 1;
                    if !self.retry.should_retry(attempts) {
                        return Err(ClientError::ConnectionError(format!(
                            "{} unreachable after {} attempts: {}",
                            self.address, attempts, e
                        )));
                    }
                    let delay = self.retry.calculate_delay(attempts - 1);
                    warn!(
                        "Broker {} unreachable ({}), retrying in {:?}",
                        self.address, e, delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
