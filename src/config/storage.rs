//! Document storage configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// SQLite document store settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_path")]
    pub path: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Transient-error retry behaviour for store calls.
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            max_connections: default_max_connections(),
            retry: RetryConfig::default(),
        }
    }
}

/// Retry settings for transient document-store failures.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_delay", with = "duration")]
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    #[serde(default = "default_max_delay", with = "duration")]
    pub max_delay: Duration,
    /// Factor by which delay increases after each retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound of the random delay added to each backoff.
    #[serde(default = "default_jitter", with = "duration")]
    pub jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_path() -> String {
    "fulfillment.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(100)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> Duration {
    Duration::from_millis(50)
}
