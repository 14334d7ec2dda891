//! Watcher configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the BranchWatcher
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Polling interval in seconds
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Number of recent commits fetched per target per poll
    #[serde(rename = "page-size", default = "default_page_size")]
    pub page_size: u32,

    /// Timeout for a single GitHub fetch in milliseconds
    #[serde(rename = "fetch-timeout-ms", default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Capacity of the signal broadcast channel
    #[serde(rename = "channel-capacity", default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_page_size() -> u32 {
    20
}

fn default_fetch_timeout_ms() -> u64 {
    30_000
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            page_size: default_page_size(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl WatcherConfig {
    /// Get the poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get the per-fetch timeout as a Duration
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WatcherConfig::default();
        assert_eq!(config.poll_interval_secs, 60);
        assert_eq!(config.page_size, 20);
        assert_eq!(config.fetch_timeout_ms, 30_000);
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn test_poll_interval_duration() {
        let config = WatcherConfig {
            poll_interval_secs: 90,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(90));
    }

    #[test]
    fn test_fetch_timeout_duration() {
        let config = WatcherConfig {
            fetch_timeout_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.fetch_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: WatcherConfig = serde_yaml::from_str("page-size: 5").unwrap();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.poll_interval_secs, 60);
    }
}
