//! Configuration for the stream client, the store and the delivery façade.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Configuration for the event stream connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// API base URL, e.g. `https://api.example.com/api`.
    pub base_url: String,
    /// Time without any message after which the connection is considered dead.
    pub heartbeat_timeout_ms: u64,
    /// Delay before the first reconnection attempt.
    pub reconnect_base_delay_ms: u64,
    /// Upper bound for the reconnection delay.
    pub reconnect_max_delay_ms: u64,
    /// Time allowed for the stream request to be answered.
    pub connect_timeout_ms: u64,
    /// Capacity of the outbound event channel.
    pub event_channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            heartbeat_timeout_ms: 60_000,
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 30_000,
            connect_timeout_ms: 10_000,
            event_channel_capacity: 256,
        }
    }
}

impl StreamConfig {
    /// Create a new stream configuration for the given API base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn reconnect_max_delay(mut self, delay: Duration) -> Self {
        self.reconnect_max_delay_ms = delay.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    #[must_use]
    pub fn event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn heartbeat_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn connect_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Parsed API base URL.
    pub fn base(&self) -> Result<Url> {
        let url = Url::parse(&self.base_url)?;
        if url.cannot_be_a_base() {
            return Err(Error::config(format!(
                "base URL cannot carry a path: {}",
                self.base_url
            )));
        }
        Ok(url)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.is_empty() {
            return Err(Error::config("base URL cannot be empty"));
        }
        self.base()?;
        if self.heartbeat_timeout_ms == 0 {
            return Err(Error::config("heartbeat timeout must be > 0"));
        }
        if self.reconnect_base_delay_ms == 0 {
            return Err(Error::config("reconnect base delay must be > 0"));
        }
        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(Error::config(
                "reconnect max delay must be >= reconnect base delay",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(Error::config("event channel capacity must be > 0"));
        }
        Ok(())
    }
}

/// Configuration for the notification store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of notifications kept; the oldest are evicted first.
    pub capacity: usize,
    /// Where user settings are persisted. `None` keeps them in memory.
    pub settings_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            capacity: crate::store::DEFAULT_CAPACITY,
            settings_path: None,
        }
    }
}

/// Configuration for the delivery façade.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Fetch recent history before the stream connects.
    pub load_history: bool,
    /// Number of history records requested.
    pub history_limit: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            load_history: true,
            history_limit: 50,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stream_config() {
        let config = StreamConfig::default();
        assert!(config.base_url.is_empty());
        assert_eq!(config.heartbeat_timeout_ms, 60_000);
        assert_eq!(config.reconnect_base_delay_ms, 1_000);
        assert_eq!(config.reconnect_max_delay_ms, 30_000);
        assert_eq!(config.event_channel_capacity, 256);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_and_validation() {
        let config = StreamConfig::new("https://api.example.com/api")
            .heartbeat_timeout(Duration::from_secs(5))
            .reconnect_base_delay(Duration::from_millis(200))
            .reconnect_max_delay(Duration::from_secs(2));
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat_timeout_duration(), Duration::from_secs(5));

        let bad = config.clone().reconnect_max_delay(Duration::from_millis(100));
        assert!(bad.validate().is_err());

        assert!(StreamConfig::new("not a url").validate().is_err());
        assert!(StreamConfig::new("mailto:ops@example.com").validate().is_err());
    }

    #[test]
    fn test_partial_deserialization_uses_defaults() {
        let config: StreamConfig =
            serde_json::from_str(r#"{"base_url":"http://localhost:8080","heartbeat_timeout_ms":1000}"#)
                .unwrap();
        assert_eq!(config.heartbeat_timeout_ms, 1000);
        assert_eq!(config.reconnect_max_delay_ms, 30_000);

        let delivery: DeliveryConfig = serde_json::from_str("{}").unwrap();
        assert!(delivery.load_history);
        assert_eq!(delivery.history_limit, 50);
    }
}
