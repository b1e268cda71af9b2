//! Process-local coordination store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::{CoordinationError, CoordinationStore};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-memory [`CoordinationStore`] with lazy TTL expiry.
///
/// Every primitive runs under one lock, so increments and set-if-absent are
/// atomic across tasks. Correct only for a single process.
#[derive(Debug, Default)]
pub struct InMemoryCoordinationStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCoordinationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Returns the live entry for `key`, dropping it first if it has expired.
    fn live<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        now: Instant,
    ) -> Option<&'a mut Entry> {
        if entries.get(key).is_some_and(|e| !e.is_live(now)) {
            entries.remove(key);
        }
        entries.get_mut(key)
    }

    /// Number of stored keys, including expired ones not yet collected.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every expired entry.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        self.lock().retain(|_, e| e.is_live(now));
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CoordinationError> {
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).map(|e| e.value.clone()))
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), CoordinationError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<bool, CoordinationError> {
        let mut entries = self.lock();
        let existed = Self::live(&mut entries, key, Instant::now()).is_some();
        entries.remove(key);
        Ok(existed)
    }

    async fn incr(&self, key: &str) -> Result<i64, CoordinationError> {
        let mut entries = self.lock();
        match Self::live(&mut entries, key, Instant::now()) {
            Some(entry) => {
                let current: i64 = entry
                    .value
                    .parse()
                    .map_err(|_| CoordinationError::NotAnInteger {
                        key: key.to_string(),
                    })?;
                let next = current + 1;
                entry.value = next.to_string();
                Ok(next)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: None,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.lock();
        if Self::live(&mut entries, key, now).is_some() {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(now + ttl),
            },
        );
        Ok(true)
    }

    async fn exists(&self, key: &str) -> Result<bool, CoordinationError> {
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, Instant::now()).is_some())
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.lock();
        match Self::live(&mut entries, key, now) {
            Some(entry) => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, CoordinationError> {
        let now = Instant::now();
        let mut entries = self.lock();
        Ok(Self::live(&mut entries, key, now)
            .and_then(|e| e.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn compare_and_delete(
        &self,
        key: &str,
        expected: &str,
    ) -> Result<bool, CoordinationError> {
        let mut entries = self.lock();
        let owned = Self::live(&mut entries, key, Instant::now()).is_some_and(|e| e.value == expected);
        if owned {
            entries.remove(key);
        }
        Ok(owned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_set_get_del() {
        let store = InMemoryCoordinationStore::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(store.del("k").await.unwrap());
        assert!(!store.del("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_starts_at_one() {
        let store = InMemoryCoordinationStore::new();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        assert_eq!(store.get("c").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_incr_non_integer() {
        let store = InMemoryCoordinationStore::new();
        store.set("c", "abc", None).await.unwrap();
        let result = store.incr("c").await;
        assert!(matches!(result, Err(CoordinationError::NotAnInteger { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let store = InMemoryCoordinationStore::new();
        store.set("k", "v", Some(Duration::from_secs(10))).await.unwrap();
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(10)));

        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(store.ttl("k").await.unwrap(), Some(Duration::from_secs(6)));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(!store.exists("k").await.unwrap());
        assert_eq!(store.ttl("k").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incr_keeps_expiry() {
        let store = InMemoryCoordinationStore::new();
        store.incr("c").await.unwrap();
        assert!(store.expire("c", Duration::from_secs(5)).await.unwrap());
        store.incr("c").await.unwrap();
        assert_eq!(store.ttl("c").await.unwrap(), Some(Duration::from_secs(5)));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.ttl("c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let store = InMemoryCoordinationStore::new();
        assert!(!store.expire("nope", Duration::from_secs(1)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_if_absent() {
        let store = InMemoryCoordinationStore::new();
        let ttl = Duration::from_secs(30);
        assert!(store.set_if_absent("lock", "a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock", "b", ttl).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));

        tokio::time::advance(ttl).await;
        assert!(store.set_if_absent("lock", "b", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = InMemoryCoordinationStore::new();
        store.set("lock", "a", None).await.unwrap();
        assert!(!store.compare_and_delete("lock", "b").await.unwrap());
        assert!(store.exists("lock").await.unwrap());
        assert!(store.compare_and_delete("lock", "a").await.unwrap());
        assert!(!store.exists("lock").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = InMemoryCoordinationStore::new();
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", "1", None).await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;
        store.purge_expired();
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_if_absent_single_winner() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("lock", &i.to_string(), Duration::from_secs(30))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_incr_is_atomic() {
        let store = Arc::new(InMemoryCoordinationStore::new());
        let mut handles = Vec::new();
        for _ in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move { store.incr("n").await.unwrap() }));
        }

        let mut seen = Vec::new();
        for h in handles {
            seen.push(h.await.unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (1..=100).collect::<Vec<i64>>());
    }
}
