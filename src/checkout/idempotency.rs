use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::coordination::CoordinationStore;

/// Cached checkout responses keyed by customer and client token.
///
/// Both directions degrade silently: a failed lookup reads as a miss and a
/// failed write leaves the already-persisted order in place.
pub struct IdempotencyCache {
    store: Arc<dyn CoordinationStore>,
    ttl: Duration,
}

impl IdempotencyCache {
    pub fn new(store: Arc<dyn CoordinationStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    pub fn key(customer_id: &str, token: &str) -> String {
        format!("idempotency:{}:{}", customer_id, token)
    }

    pub async fn lookup(&self, customer_id: &str, token: &str) -> Option<String> {
        match self.store.get(&Self::key(customer_id, token)).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(customer_id = %customer_id, error = %e, "Idempotency lookup failed, treating as miss");
                None
            }
        }
    }

    pub async fn store(&self, customer_id: &str, token: &str, body: &str) {
        let key = Self::key(customer_id, token);
        if let Err(e) = self.store.set(&key, body, Some(self.ttl)).await {
            warn!(customer_id = %customer_id, error = %e, "Failed to cache checkout response");
        }
    }
}
