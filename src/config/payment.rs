//! Payment gateway and coordination store configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Payment gateway settings.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    /// Gateway API base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// ISO currency code for gateway orders.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// HTTP timeout for gateway calls.
    #[serde(default = "default_timeout", with = "duration")]
    pub timeout: Duration,
    /// Key ID (loaded from PAYMENT_KEY_ID env var).
    #[serde(skip)]
    pub key_id: String,
    /// Key secret (loaded from PAYMENT_KEY_SECRET env var).
    #[serde(skip)]
    pub key_secret: String,
    /// Webhook secret (loaded from PAYMENT_WEBHOOK_SECRET env var).
    #[serde(skip)]
    pub webhook_secret: String,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            currency: default_currency(),
            timeout: default_timeout(),
            key_id: String::new(),
            key_secret: String::new(),
            webhook_secret: String::new(),
        }
    }
}

/// Where locks, counters and the idempotency cache live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinationBackend {
    /// Process-local store; correct for a single instance only.
    #[default]
    Memory,
    /// Shared Redis instance (requires the `redis-store` feature).
    Redis,
}

/// Coordination store settings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinationConfig {
    #[serde(default)]
    pub backend: CoordinationBackend,
    /// Redis connection URL (loaded from REDIS_URL env var).
    #[serde(skip)]
    pub redis_url: String,
}

fn default_base_url() -> String {
    "https://api.razorpay.com".to_string()
}

fn default_currency() -> String {
    "INR".to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(15)
}
