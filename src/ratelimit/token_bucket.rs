//! In-process token bucket governor.

use async_trait::async_trait;
use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::{Admission, RateGovernor};

const SHARDS: usize = 16;

/// Buckets idle for this many full-refill periods are evicted.
const IDLE_REFILL_PERIODS: f64 = 5.0;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    tokens: f64,
    last_seen: Instant,
}

/// Token buckets keyed by client, refilled continuously at `rate` per second
/// up to `burst`.
///
/// Keys are spread across independently locked shards so unrelated clients
/// do not contend.
#[derive(Debug)]
pub struct TokenBucketGovernor {
    rate: f64,
    burst: u32,
    shards: Vec<Mutex<HashMap<String, Bucket>>>,
}

impl TokenBucketGovernor {
    pub fn new(rate_per_sec: f64, burst: u32) -> Self {
        Self {
            rate: rate_per_sec,
            burst,
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &str) -> MutexGuard<'_, HashMap<String, Bucket>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        self.shards[index].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Time for an empty bucket to refill completely.
    fn refill_period(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.burst) / self.rate)
    }

    /// Admission check without the async wrapper.
    pub fn try_admit(&self, client_key: &str) -> Admission {
        let now = Instant::now();
        let burst = f64::from(self.burst);
        let mut shard = self.shard(client_key);

        let Some(bucket) = shard.get_mut(client_key) else {
            // A new client starts full and spends one token immediately
            shard.insert(
                client_key.to_string(),
                Bucket {
                    tokens: burst - 1.0,
                    last_seen: now,
                },
            );
            return Admission::allow(self.burst, self.burst.saturating_sub(1));
        };

        let elapsed = now.saturating_duration_since(bucket.last_seen).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(burst);
        bucket.last_seen = now;

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Admission::allow(self.burst, bucket.tokens.floor() as u32)
        } else {
            let wait = (1.0 - bucket.tokens) / self.rate;
            Admission::deny(self.burst, Duration::from_secs_f64(wait))
        }
    }

    /// Drops buckets idle for longer than five refill periods. Returns how many.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let max_idle = self.refill_period().mul_f64(IDLE_REFILL_PERIODS);
        let mut evicted = 0;
        for shard in &self.shards {
            let mut buckets = shard.lock().unwrap_or_else(|e| e.into_inner());
            let before = buckets.len();
            buckets.retain(|_, b| now.saturating_duration_since(b.last_seen) <= max_idle);
            evicted += before - buckets.len();
        }
        evicted
    }

    /// Number of tracked clients.
    pub fn tracked(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }
}

#[async_trait]
impl RateGovernor for TokenBucketGovernor {
    async fn admit(&self, client_key: &str) -> Admission {
        self.try_admit(client_key)
    }
}
