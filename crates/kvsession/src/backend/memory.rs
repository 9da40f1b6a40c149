//! In-process backend with Redis-style hash and expiration semantics.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use super::Backend;
use crate::config::MAX_VALIDITY_SECS;
use crate::error::{BackendError, BackendResult};

#[derive(Debug)]
struct Entry {
    fields: HashMap<String, String>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    closed: bool,
}

impl Inner {
    fn check_open(&self) -> BackendResult<()> {
        if self.closed {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    /// Live entry for `key`, dropping it first if its TTL has elapsed.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();
        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            trace!(key = %key, "Key expired");
            self.entries.remove(key);
        }
        self.entries.get_mut(key)
    }
}

/// Hash store kept in process memory.
///
/// Expiration is lazy: an expired key disappears the next time it is
/// touched, or when [`purge_expired`](Self::purge_expired) runs. Time is
/// read from the tokio clock, so paused-time tests control it.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Remaining time to live of `key`, or `None` if it is missing or has no TTL.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let mut inner = self.inner.lock();
        let expires_at = inner.live(key)?.expires_at?;
        Some(expires_at.saturating_duration_since(Instant::now()))
    }

    /// Whether a live key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.lock().live(key).is_some()
    }

    /// Number of keys held, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Check if no keys are held.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Drop every expired key and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|_, entry| !entry.is_expired(now));
        before - inner.entries.len()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn hset_multiple(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
    ) -> BackendResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        if fields.is_empty() {
            return Err(BackendError::Command(
                "wrong number of arguments for 'hset' command".to_string(),
            ));
        }

        // Existing keys keep their TTL, new keys have none.
        if inner.live(key).is_none() {
            inner.entries.insert(
                key.to_string(),
                Entry {
                    fields: HashMap::new(),
                    expires_at: None,
                },
            );
        }
        let Some(entry) = inner.entries.get_mut(key) else {
            return Ok(0);
        };

        let added = fields
            .iter()
            .filter(|&(field, value)| {
                entry
                    .fields
                    .insert(field.clone(), value.clone())
                    .is_none()
            })
            .count();
        Ok(added)
    }

    async fn hgetall(&self, key: &str) -> BackendResult<HashMap<String, String>> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        Ok(inner
            .live(key)
            .map(|entry| entry.fields.clone())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, fields: &[String]) -> BackendResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let Some(entry) = inner.live(key) else {
            return Ok(0);
        };

        let removed = fields
            .iter()
            .filter(|field| entry.fields.remove(field.as_str()).is_some())
            .count();
        if entry.fields.is_empty() {
            inner.entries.remove(key);
        }
        Ok(removed)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let mut inner = self.inner.lock();
        inner.check_open()?;

        // Redis expires in whole seconds and rejects times it cannot represent.
        let secs = ttl.as_secs();
        let expires_at = (secs <= MAX_VALIDITY_SECS)
            .then(|| Instant::now().checked_add(Duration::from_secs(secs)))
            .flatten()
            .ok_or_else(|| {
                BackendError::Command(format!("invalid expire time: {} seconds", secs))
            })?;

        if inner.live(key).is_none() {
            return Ok(false);
        }

        // Zero deletes the key right away.
        if secs == 0 {
            inner.entries.remove(key);
        } else if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at = Some(expires_at);
        }
        Ok(true)
    }

    async fn del(&self, keys: &[String]) -> BackendResult<usize> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        let mut removed = 0;
        for key in keys {
            if inner.live(key).is_some() {
                inner.entries.remove(key.as_str());
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn close(&self) -> BackendResult<()> {
        let mut inner = self.inner.lock();
        inner.check_open()?;
        inner.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_hset_and_hgetall() {
        let backend = MemoryBackend::new();

        let added = backend
            .hset_multiple("k", &fields(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();
        assert_eq!(added, 2);

        let added = backend
            .hset_multiple("k", &fields(&[("b", "3"), ("c", "4")]))
            .await
            .unwrap();
        assert_eq!(added, 1);

        let all = backend.hgetall("k").await.unwrap();
        assert_eq!(all, fields(&[("a", "1"), ("b", "3"), ("c", "4")]));
    }

    #[tokio::test]
    async fn test_hgetall_missing_key_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend.hgetall("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_hset_without_fields_fails() {
        let backend = MemoryBackend::new();
        let err = backend
            .hset_multiple("k", &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::Command(_)));
    }

    #[tokio::test]
    async fn test_hdel() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1"), ("b", "2")]))
            .await
            .unwrap();

        let removed = backend
            .hdel("k", &["a".to_string(), "zz".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.hgetall("k").await.unwrap(), fields(&[("b", "2")]));

        // Removing the last field removes the key.
        backend.hdel("k", &["b".to_string()]).await.unwrap();
        assert!(!backend.contains_key("k"));
    }

    #[tokio::test]
    async fn test_del_counts_existing_keys() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();

        let removed = backend
            .del(&["k".to_string(), "other".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(backend.del(&["k".to_string()]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_expire_missing_key() {
        let backend = MemoryBackend::new();
        assert!(!backend.expire("k", Duration::from_secs(5)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_expires() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();
        assert!(backend.expire("k", Duration::from_secs(2)).await.unwrap());
        assert_eq!(backend.ttl("k"), Some(Duration::from_secs(2)));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(backend.contains_key("k"));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(backend.hgetall("k").await.unwrap().is_empty());
        assert!(!backend.contains_key("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expire_resets_ttl() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();
        backend.expire("k", Duration::from_secs(3)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        backend.expire("k", Duration::from_secs(3)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(backend.contains_key("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hset_keeps_ttl() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();
        backend.expire("k", Duration::from_secs(10)).await.unwrap();
        backend
            .hset_multiple("k", &fields(&[("b", "2")]))
            .await
            .unwrap();

        assert_eq!(backend.ttl("k"), Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_out_of_range_expire_is_rejected() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();
        backend.expire("k", Duration::from_secs(5)).await.unwrap();

        for secs in [u64::MAX, MAX_VALIDITY_SECS + 1] {
            let err = backend
                .expire("k", Duration::from_secs(secs))
                .await
                .unwrap_err();
            assert!(
                matches!(err, BackendError::Command(ref msg) if msg.contains("invalid expire time"))
            );
        }

        // The previous TTL is left in place.
        assert!(backend.ttl("k").is_some_and(|ttl| ttl <= Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn test_zero_expire_deletes_key() {
        let backend = MemoryBackend::new();
        backend
            .hset_multiple("k", &fields(&[("a", "1")]))
            .await
            .unwrap();

        assert!(backend.expire("k", Duration::ZERO).await.unwrap());
        assert!(!backend.contains_key("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let backend = MemoryBackend::new();
        for key in ["a", "b", "c"] {
            backend
                .hset_multiple(key, &fields(&[("f", "v")]))
                .await
                .unwrap();
        }
        backend.expire("a", Duration::from_secs(1)).await.unwrap();
        backend.expire("b", Duration::from_secs(1)).await.unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(backend.len(), 3);
        assert_eq!(backend.purge_expired(), 2);
        assert_eq!(backend.len(), 1);
        assert_eq!(backend.ttl("c"), None);
    }

    #[tokio::test]
    async fn test_close_twice_fails() {
        let backend = MemoryBackend::new();
        backend.close().await.unwrap();

        assert!(matches!(
            backend.close().await.unwrap_err(),
            BackendError::Closed
        ));
        assert!(matches!(
            backend.hgetall("k").await.unwrap_err(),
            BackendError::Closed
        ));
    }
}
