//! Rate limiting configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Which admission strategy backs the governors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitStrategy {
    /// In-process token buckets, suitable for a single instance.
    #[default]
    Local,
    /// Fixed-window counters in the coordination store.
    Distributed,
}

/// Rate and burst for one endpoint tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierConfig {
    /// Sustained refill rate in requests per second.
    pub rate_per_sec: f64,
    /// Maximum burst (bucket capacity, or per-window limit when distributed).
    pub burst: u32,
}

/// Rate limiting settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub strategy: RateLimitStrategy,
    /// General API traffic.
    #[serde(default = "default_general")]
    pub general: TierConfig,
    /// Authentication and OTP endpoints.
    #[serde(default = "default_auth")]
    pub auth: TierConfig,
    /// Order submission.
    #[serde(default = "default_checkout")]
    pub checkout: TierConfig,
    /// Window length for the distributed strategy.
    #[serde(default = "default_window", with = "duration")]
    pub window: Duration,
    /// How often idle local buckets are swept.
    #[serde(default = "default_sweep_interval", with = "duration")]
    pub sweep_interval: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            strategy: RateLimitStrategy::default(),
            general: default_general(),
            auth: default_auth(),
            checkout: default_checkout(),
            window: default_window(),
            sweep_interval: default_sweep_interval(),
        }
    }
}

fn default_general() -> TierConfig {
    TierConfig {
        rate_per_sec: 200.0,
        burst: 500,
    }
}

fn default_auth() -> TierConfig {
    TierConfig {
        rate_per_sec: 10.0,
        burst: 20,
    }
}

fn default_checkout() -> TierConfig {
    TierConfig {
        rate_per_sec: 2.0,
        burst: 5,
    }
}

fn default_window() -> Duration {
    Duration::from_secs(1)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(120)
}
