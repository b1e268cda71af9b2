//! Coordination store: shared key-value primitives for locks, counters and caches.
//!
//! Cross-instance correctness (coupon limits, idempotency, delivery claims) rests
//! entirely on the atomicity of these operations.

mod memory;
#[cfg(feature = "redis-store")]
mod redis;

pub use memory::InMemoryCoordinationStore;
#[cfg(feature = "redis-store")]
pub use self::redis::RedisCoordinationStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::error::{ApiError, ErrorKind};

/// Coordination store failure.
#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("coordination store unavailable: {0}")]
    Unavailable(String),
    #[error("value at {key} is not an integer")]
    NotAnInteger { key: String },
}

impl ApiError for CoordinationError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::UpstreamUnavailable
    }

    fn reason(&self) -> &'static str {
        "coordination_unavailable"
    }
}

/// Atomic key-value primitives with optional expiry.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError>;

    /// Stores `value`, replacing any previous value and expiry.
    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError>;

    /// Removes `key`. Returns whether it existed.
    async fn del(&self, key: &str) -> Result<bool, CoordinationError>;

    /// Atomically increments the integer at `key` (missing counts as 0) and
    /// returns the new value. An existing expiry is kept.
    async fn incr(&self, key: &str) -> Result<i64, CoordinationError>;

    /// Stores `value` with `ttl` only if `key` is absent. Returns whether it was stored.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError>;

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError>;

    /// Sets the expiry of an existing key. Returns false when the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CoordinationError>;

    /// Remaining lifetime of `key`; `None` when missing or persistent.
    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CoordinationError>;

    /// Deletes `key` only if it currently holds `expected`.
    async fn compare_and_delete(&self, key: &str, expected: &str)
    -> Result<bool, CoordinationError>;
}
