//! Exponential backoff for reaching the broker.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff schedule used when a broker connection cannot be established.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the second attempt (in milliseconds)
    pub base_delay_ms: u64,
    /// Maximum delay cap (in milliseconds)
    pub max_delay_ms: u64,
    /// Total connection attempts before giving up
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            max_attempts: 10,
        }
    }
}

impl RetryPolicy {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64, max_attempts: u32) -> Self {
        Self {
            base_delay_ms,
            max_delay_ms,
            max_attempts,
        }
    }

    /// Delay after the given failed attempt (0-indexed):
    /// base_delay * 2^attempt, capped at max_delay.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let base_delay = Duration::from_millis(self.base_delay_ms);
        let backoff_multiplier = 2u32.pow(attempt.min(20)); // Prevent overflow
        let delay = base_delay.saturating_mul(backoff_multiplier);
        delay.min(Duration::from_millis(self.max_delay_ms))
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
