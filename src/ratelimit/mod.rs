//! Per-client admission control.
//!
//! Two interchangeable strategies sit behind [`RateGovernor`]:
//! - [`TokenBucketGovernor`]: in-process buckets for single-instance deployments.
//! - [`FixedWindowGovernor`]: counters in the coordination store, shared across instances.

mod fixed_window;
mod token_bucket;

pub use fixed_window::FixedWindowGovernor;
pub use token_bucket::TokenBucketGovernor;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::config::{RateLimitConfig, RateLimitStrategy};
use crate::coordination::CoordinationStore;
use crate::error::{ApiError, ErrorKind};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Admission {
    pub allowed: bool,
    /// Configured limit (burst capacity or per-window limit).
    pub limit: u32,
    /// Requests left before denial.
    pub remaining: u32,
    /// Set on denial.
    pub retry_after: Option<Duration>,
}

impl Admission {
    pub fn allow(limit: u32, remaining: u32) -> Self {
        Self {
            allowed: true,
            limit,
            remaining,
            retry_after: None,
        }
    }

    pub fn deny(limit: u32, retry_after: Duration) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            retry_after: Some(retry_after),
        }
    }

    /// Response headers describing this admission.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
        ];
        if let Some(retry_after) = self.retry_after {
            headers.push(("Retry-After", retry_after_secs(retry_after).to_string()));
        }
        headers
    }
}

/// Whole seconds to wait, rounded up and never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_secs_f64().ceil().max(1.0) as u64
}

/// Admission control keyed by client identifier.
#[async_trait]
pub trait RateGovernor: Send + Sync {
    /// Consumes one unit for `client_key` if available.
    async fn admit(&self, client_key: &str) -> Admission;
}

/// Endpoint classes with their own limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    General,
    /// Login and OTP endpoints.
    Auth,
    /// Order submission.
    Checkout,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::General => "general",
            Tier::Auth => "auth",
            Tier::Checkout => "checkout",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returned when a governor denies a request.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("rate limit exceeded for {tier} tier, retry after {retry_after:?}")]
pub struct RateLimitExceeded {
    pub tier: Tier,
    pub admission: Admission,
    pub retry_after: Duration,
}

impl ApiError for RateLimitExceeded {
    fn kind(&self) -> ErrorKind {
        ErrorKind::RateLimited
    }

    fn reason(&self) -> &'static str {
        "rate_limited"
    }

    fn retry_after(&self) -> Option<Duration> {
        Some(self.retry_after)
    }
}

/// One governor per [`Tier`].
pub struct RateLimiters {
    general: Arc<dyn RateGovernor>,
    auth: Arc<dyn RateGovernor>,
    checkout: Arc<dyn RateGovernor>,
    /// Local buckets that need periodic eviction.
    buckets: Vec<Arc<TokenBucketGovernor>>,
}

impl RateLimiters {
    /// In-process token buckets for every tier.
    pub fn local(config: &RateLimitConfig) -> Self {
        let general = Arc::new(TokenBucketGovernor::new(
            config.general.rate_per_sec,
            config.general.burst,
        ));
        let auth = Arc::new(TokenBucketGovernor::new(
            config.auth.rate_per_sec,
            config.auth.burst,
        ));
        let checkout = Arc::new(TokenBucketGovernor::new(
            config.checkout.rate_per_sec,
            config.checkout.burst,
        ));

        Self {
            buckets: vec![general.clone(), auth.clone(), checkout.clone()],
            general,
            auth,
            checkout,
        }
    }

    /// Fixed-window counters in the shared store for every tier.
    pub fn distributed(config: &RateLimitConfig, store: Arc<dyn CoordinationStore>) -> Self {
        let window = |tier: Tier, burst: u32| -> Arc<dyn RateGovernor> {
            Arc::new(FixedWindowGovernor::new(
                store.clone(),
                tier,
                burst,
                config.window,
            ))
        };

        Self {
            general: window(Tier::General, config.general.burst),
            auth: window(Tier::Auth, config.auth.burst),
            checkout: window(Tier::Checkout, config.checkout.burst),
            buckets: Vec::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig, store: Arc<dyn CoordinationStore>) -> Self {
        match config.strategy {
            RateLimitStrategy::Local => Self::local(config),
            RateLimitStrategy::Distributed => Self::distributed(config, store),
        }
    }

    pub fn governor(&self, tier: Tier) -> &Arc<dyn RateGovernor> {
        match tier {
            Tier::General => &self.general,
            Tier::Auth => &self.auth,
            Tier::Checkout => &self.checkout,
        }
    }

    pub async fn admit(&self, tier: Tier, client_key: &str) -> Admission {
        self.governor(tier).admit(client_key).await
    }

    /// Admits or returns a `RateLimited` error carrying the retry delay.
    pub async fn check(&self, tier: Tier, client_key: &str) -> Result<Admission, RateLimitExceeded> {
        let admission = self.admit(tier, client_key).await;
        if admission.allowed {
            return Ok(admission);
        }

        debug!(tier = %tier, client = %client_key, "Request rate limited");
        Err(RateLimitExceeded {
            tier,
            admission,
            retry_after: admission.retry_after.unwrap_or(Duration::from_secs(1)),
        })
    }

    /// Periodically evicts idle local buckets. Returns `None` when there are none.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        if self.buckets.is_empty() || interval.is_zero() {
            return None;
        }

        let buckets = self.buckets.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted: usize = buckets.iter().map(|b| b.evict_idle()).sum();
                if evicted > 0 {
                    debug!(evicted, "Evicted idle rate limit buckets");
                }
            }
        }))
    }
}
