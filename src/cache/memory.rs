use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::{CacheBackend, CacheError};

#[derive(Debug, Clone)]
struct Entry {
    payload: String,
    expires_at: Instant,
}

impl Entry {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process TTL key/value store. Expired entries are invisible to reads and
/// are dropped lazily on access or by `purge_expired`.
pub struct MemoryCache {
    entries: DashMap<String, Entry>,
    closed: AtomicBool,
}

impl MemoryCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until the cache is closed.
    pub async fn run_sweeper(self: Arc<Self>, every: Duration) {
        let mut interval = tokio::time::interval(every);
        interval.tick().await; // consume immediate first tick

        while !self.closed.load(Ordering::Relaxed) {
            interval.tick().await;
            let removed = self.purge_expired();
            if removed > 0 {
                debug!(removed, remaining = self.len(), "cache sweep");
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn ensure_open(&self) -> Result<(), CacheError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(CacheError::Backend("cache is closed".to_string()));
        }
        Ok(())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        let Some(entry) = self.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_fresh(now) {
            return Ok(Some(entry.payload.clone()));
        }
        drop(entry);
        self.entries.remove_if(key, |_, e| !e.is_fresh(now));
        Ok(None)
    }

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        self.ensure_open()?;
        let expires_at = Instant::now()
            .checked_add(ttl)
            .ok_or_else(|| CacheError::Backend(format!("ttl out of range: {ttl:?}")))?;
        let entry = Entry {
            payload,
            expires_at,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        Ok(self.entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        self.ensure_open()?;
        let now = Instant::now();
        Ok(self.entries.get(key).is_some_and(|e| e.is_fresh(now)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_entries_read_as_missing() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), Duration::from_millis(30)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
        assert!(cache.exists("k").await.unwrap());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(!cache.exists("k").await.unwrap());
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn purge_drops_only_expired() {
        let cache = MemoryCache::new();
        cache.set("short", "a".into(), Duration::from_millis(10)).await.unwrap();
        cache.set("long", "b".into(), Duration::from_secs(60)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.exists("long").await.unwrap());
    }

    #[tokio::test]
    async fn closed_cache_reports_backend_error() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(5)).await.unwrap();
        cache.close().await;
        assert!(matches!(cache.get("k").await, Err(CacheError::Backend(_))));
    }

    #[tokio::test]
    async fn delete_reports_whether_key_existed() {
        let cache = MemoryCache::new();
        cache.set("k", "v".into(), Duration::from_secs(5)).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
