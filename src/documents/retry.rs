//! Transient-error retry decorator for document stores.

use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Collection, Document, DocumentStore, Page, Query, StoreError};
use crate::config::RetryConfig;

/// Bounded exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            jitter: config.jitter,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0-based), without jitter.
    pub fn base_delay(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry as i32);
        self.initial_delay.mul_f64(factor).min(self.max_delay)
    }

    /// Delay before retry number `retry` with uniform jitter in `[0, jitter]`.
    fn delay(&self, retry: u32) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.base_delay(retry) + Duration::from_millis(extra)
    }
}

/// Wraps a [`DocumentStore`] and retries transient failures.
///
/// Validation, not-found and conflict errors are returned immediately.
pub struct RetryingDocumentStore<S> {
    inner: S,
    policy: RetryPolicy,
}

impl<S: DocumentStore> RetryingDocumentStore<S> {
    pub fn new(inner: S, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn with_retry<T, F, Fut>(&self, op: &'static str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut(u32) -> Fut + Send,
        Fut: Future<Output = Result<T, StoreError>> + Send,
        T: Send,
    {
        let mut attempt = 0;
        loop {
            match call(attempt).await {
                Err(e) if e.is_transient() && attempt + 1 < self.policy.max_attempts => {
                    let delay = self.policy.delay(attempt);
                    warn!(
                        op = op,
                        attempt = attempt + 1,
                        max_attempts = self.policy.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Document store call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[async_trait]
impl<S: DocumentStore> DocumentStore for RetryingDocumentStore<S> {
    async fn list(
        &self,
        collection: Collection,
        query: &Query,
    ) -> Result<Page<Document>, StoreError> {
        self.with_retry("list", move |_| self.inner.list(collection, query))
            .await
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Document, StoreError> {
        self.with_retry("get", move |_| self.inner.get(collection, id)).await
    }

    async fn create(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<Document, StoreError> {
        self.with_retry("create", move |attempt| {
            let fields = fields.clone();
            async move {
                match self.inner.create(collection, id, fields).await {
                    // An earlier attempt may have landed before its response was lost
                    Err(StoreError::Conflict { .. }) if attempt > 0 => {
                        debug!(collection = %collection, id = %id, "Retried create already applied");
                        self.inner.get(collection, id).await
                    }
                    other => other,
                }
            }
        })
        .await
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        patch: Document,
    ) -> Result<Document, StoreError> {
        self.with_retry("update", move |_| self.inner.update(collection, id, patch.clone()))
            .await
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        self.with_retry("delete", move |_| self.inner.delete(collection, id))
            .await
    }
}
