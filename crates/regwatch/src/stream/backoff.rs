//! Reconnection delay calculation.

use std::time::Duration;

use crate::config::StreamConfig;

/// Exponential backoff: `min(base * 2^attempt, max)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base_ms: base.as_millis() as u64,
            max_ms: max.as_millis() as u64,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self {
            base_ms: config.reconnect_base_delay_ms,
            max_ms: config.reconnect_max_delay_ms,
        }
    }

    /// Delay before reconnect number `attempt` (zero-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_ms);
        Duration::from_millis(delay_ms)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::from_config(&StreamConfig::default())
    }
}
