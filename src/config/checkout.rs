//! Checkout, coupon and delivery configuration.

use serde::Deserialize;
use std::time::Duration;

use super::duration;

/// Checkout pipeline settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutConfig {
    /// Maximum restaurant-to-address distance served.
    #[serde(default = "default_max_radius_km")]
    pub max_radius_km: f64,
    /// How long a checkout response is replayed for a repeated idempotency token.
    #[serde(default = "default_idempotency_ttl", with = "duration")]
    pub idempotency_ttl: Duration,
    /// Prefix of human-legible order numbers.
    #[serde(default = "default_order_number_prefix")]
    pub order_number_prefix: String,
    /// Preparation time assumed when a restaurant does not report one.
    #[serde(default = "default_prep_time_min")]
    pub default_prep_time_min: u32,
    /// Deadline applied to each request end-to-end.
    #[serde(default = "default_request_timeout", with = "duration")]
    pub request_timeout: Duration,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            max_radius_km: default_max_radius_km(),
            idempotency_ttl: default_idempotency_ttl(),
            order_number_prefix: default_order_number_prefix(),
            default_prep_time_min: default_prep_time_min(),
            request_timeout: default_request_timeout(),
        }
    }
}

/// Coupon redemption settings.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponConfig {
    /// Lifetime of the per-coupon redemption counter.
    #[serde(default = "default_counter_ttl", with = "duration")]
    pub counter_ttl: Duration,
}

impl Default for CouponConfig {
    fn default() -> Self {
        Self {
            counter_ttl: default_counter_ttl(),
        }
    }
}

/// Courier assignment settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    /// Lifetime of an acceptance claim on an order.
    #[serde(default = "default_claim_ttl", with = "duration")]
    pub claim_ttl: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            claim_ttl: default_claim_ttl(),
        }
    }
}

fn default_max_radius_km() -> f64 {
    20.0
}

fn default_idempotency_ttl() -> Duration {
    Duration::from_secs(24 * 3600)
}

fn default_order_number_prefix() -> String {
    "CHZ".to_string()
}

fn default_prep_time_min() -> u32 {
    15
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_counter_ttl() -> Duration {
    Duration::from_secs(30 * 24 * 3600)
}

fn default_claim_ttl() -> Duration {
    Duration::from_secs(30)
}
