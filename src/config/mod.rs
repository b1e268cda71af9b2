//! Configuration loading and validation for the fulfillment service.
//!
//! Uses serde_yaml to load YAML configuration files with support for
//! environment variable overrides for sensitive credentials.

mod app;
mod checkout;
mod duration;
mod error;
mod fees;
mod payment;
mod rate_limit;
mod storage;

pub use app::AppConfig;
pub use checkout::{CheckoutConfig, CouponConfig, DeliveryConfig};
pub use error::ConfigError;
pub use fees::FeeConfig;
pub use payment::{CoordinationBackend, CoordinationConfig, PaymentConfig};
pub use rate_limit::{RateLimitConfig, RateLimitStrategy, TierConfig};
pub use storage::{RetryConfig, StorageConfig};

use serde::Deserialize;
use std::{env, fs};

/// Root configuration structure.
///
/// Required sections: app. Every other section falls back to its defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Application-level settings like name and environment.
    pub app: AppConfig,
    /// Per-tier admission limits.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Delivery, platform and tax schedule.
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
    #[serde(default)]
    pub coupons: CouponConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    /// Document persistence.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Locks, counters and idempotency cache.
    #[serde(default)]
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub payment: PaymentConfig,
}

impl Config {
    /// Load configuration from a YAML file at the given path.
    ///
    /// First loads environment variables from `.env` file (if exists),
    /// then loads YAML config and credentials from environment variables:
    /// - `PAYMENT_KEY_ID`, `PAYMENT_KEY_SECRET`, `PAYMENT_WEBHOOK_SECRET`
    /// - `REDIS_URL`
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        // Load .env file if it exists (ignore error if not found)
        dotenvy::dotenv().ok();

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut config: Config = serde_yaml::from_str(&content)?;

        config.load_credentials_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load credentials from environment variables.
    fn load_credentials_from_env(&mut self) {
        self.payment.key_id = env::var("PAYMENT_KEY_ID").unwrap_or_default();
        self.payment.key_secret = env::var("PAYMENT_KEY_SECRET").unwrap_or_default();
        self.payment.webhook_secret = env::var("PAYMENT_WEBHOOK_SECRET").unwrap_or_default();

        // Outside production the key secret doubles as the webhook secret
        if self.payment.webhook_secret.is_empty() && !self.app.is_production() {
            self.payment.webhook_secret = self.payment.key_secret.clone();
        }

        self.coordination.redis_url = env::var("REDIS_URL").unwrap_or_default();
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.app.name.is_empty() {
            return Err(ConfigError::Validation("app.name is required".into()));
        }

        let limits = &self.rate_limit;
        for (name, tier) in [
            ("general", &limits.general),
            ("auth", &limits.auth),
            ("checkout", &limits.checkout),
        ] {
            if tier.rate_per_sec <= 0.0 || tier.burst == 0 {
                return Err(ConfigError::Validation(format!(
                    "rate_limit.{}: rate_per_sec and burst must be positive",
                    name
                )));
            }
        }

        if limits.auth.rate_per_sec > limits.general.rate_per_sec
            || limits.auth.burst > limits.general.burst
        {
            return Err(ConfigError::Validation(
                "rate_limit.auth must not be looser than rate_limit.general".into(),
            ));
        }

        if limits.window.is_zero() {
            return Err(ConfigError::Validation(
                "rate_limit.window must be positive".into(),
            ));
        }

        if self.fees.min_delivery_fee > self.fees.max_delivery_fee {
            return Err(ConfigError::Validation(
                "fees.min_delivery_fee must not exceed fees.max_delivery_fee".into(),
            ));
        }

        if self.fees.tax_rate.is_sign_negative() || self.fees.per_km_rate.is_sign_negative() {
            return Err(ConfigError::Validation(
                "fees: rates must not be negative".into(),
            ));
        }

        if self.checkout.max_radius_km <= 0.0 {
            return Err(ConfigError::Validation(
                "checkout.max_radius_km must be positive".into(),
            ));
        }

        for (name, ttl) in [
            ("checkout.idempotency_ttl", self.checkout.idempotency_ttl),
            ("checkout.request_timeout", self.checkout.request_timeout),
            ("coupons.counter_ttl", self.coupons.counter_ttl),
            ("delivery.claim_ttl", self.delivery.claim_ttl),
        ] {
            if ttl.is_zero() {
                return Err(ConfigError::Validation(format!("{} must be positive", name)));
            }
        }

        if self.storage.retry.max_attempts == 0 {
            return Err(ConfigError::Validation(
                "storage.retry.max_attempts must be at least 1".into(),
            ));
        }

        let mut missing = Vec::new();
        if self.app.is_production() {
            for (var, value) in [
                ("PAYMENT_KEY_ID", &self.payment.key_id),
                ("PAYMENT_KEY_SECRET", &self.payment.key_secret),
                ("PAYMENT_WEBHOOK_SECRET", &self.payment.webhook_secret),
            ] {
                if value.is_empty() {
                    missing.push(var);
                }
            }
        }
        if self.coordination.backend == CoordinationBackend::Redis
            && self.coordination.redis_url.is_empty()
        {
            missing.push("REDIS_URL");
        }
        if !missing.is_empty() {
            return Err(ConfigError::MissingSecrets(missing));
        }

        Ok(())
    }
}
