//! Distributed fixed-window governor backed by the coordination store.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{Admission, RateGovernor, Tier};
use crate::coordination::CoordinationStore;

/// Counts requests per client in fixed windows shared by every instance.
///
/// The window starts at the first request: the counter's expiry is set only
/// when the increment returns 1. Store failures admit the request.
pub struct FixedWindowGovernor {
    store: Arc<dyn CoordinationStore>,
    tier: Tier,
    limit: u32,
    window: Duration,
}

impl FixedWindowGovernor {
    pub fn new(store: Arc<dyn CoordinationStore>, tier: Tier, limit: u32, window: Duration) -> Self {
        Self {
            store,
            tier,
            limit,
            window,
        }
    }

    fn key(&self, client_key: &str) -> String {
        format!("rl:{}:{}", self.tier, client_key)
    }

    /// Remaining window for a denied key.
    async fn retry_after(&self, key: &str) -> Duration {
        match self.store.ttl(key).await {
            Ok(Some(ttl)) if !ttl.is_zero() => ttl,
            Ok(_) => {
                // Counter without expiry would deny forever
                if let Err(e) = self.store.expire(key, self.window).await {
                    warn!(key = %key, error = %e, "Failed to repair rate limit window");
                }
                self.window
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read rate limit window");
                self.window
            }
        }
    }
}

#[async_trait]
impl RateGovernor for FixedWindowGovernor {
    async fn admit(&self, client_key: &str) -> Admission {
        let key = self.key(client_key);

        let count = match self.store.incr(&key).await {
            Ok(count) => count,
            Err(e) => {
                warn!(
                    tier = %self.tier,
                    client = %client_key,
                    error = %e,
                    "Rate limiter store unavailable, failing open"
                );
                return Admission::allow(self.limit, self.limit);
            }
        };

        if count == 1 {
            if let Err(e) = self.store.expire(&key, self.window).await {
                warn!(key = %key, error = %e, "Failed to set rate limit window");
            }
        }

        let limit = i64::from(self.limit);
        if count > limit {
            return Admission::deny(self.limit, self.retry_after(&key).await);
        }

        Admission::allow(self.limit, (limit - count) as u32)
    }
}
