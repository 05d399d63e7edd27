//! Best-effort, TTL-bounded read-through cache.
//!
//! Every `CacheLayer` call is infallible from the caller's side: backend
//! errors, timeouts and bad payloads are logged, counted and reported as a
//! miss (reads) or `false` (writes). Entries are never invalidated by writes
//! elsewhere; staleness is bounded by the TTL alone.

pub mod keys;
pub mod memory;

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

pub use memory::MemoryCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache call timed out after {0:?}")]
    Timeout(Duration),

    #[error("cache serialize error: {0}")]
    Serialize(serde_json::Error),

    #[error("cache deserialize error: {0}")]
    Deserialize(serde_json::Error),
}

/// Raw string key/value store with per-entry TTL.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Release backend resources. Later calls may fail.
    async fn close(&self) {}
}

/// Hit/miss/error counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub errors: u64,
}

impl CacheStats {
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Typed, fail-open facade over a `CacheBackend`. Values travel as JSON;
/// decimals and dates are already strings in their serde form.
pub struct CacheLayer {
    backend: Arc<dyn CacheBackend>,
    call_timeout: Duration,
    stats: CacheStats,
}

impl CacheLayer {
    pub fn new(backend: Arc<dyn CacheBackend>, call_timeout: Duration) -> Self {
        Self {
            backend,
            call_timeout,
            stats: CacheStats::default(),
        }
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.guarded("get", key, self.backend.get(key)).await.flatten();
        let Some(raw) = raw else {
            self.stats.misses.fetch_add(1, Ordering::Relaxed);
            return None;
        };
        match serde_json::from_str(&raw) {
            Ok(v) => {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                Some(v)
            }
            Err(e) => {
                self.record_error("get", key, &CacheError::Deserialize(e));
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) -> bool {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                self.record_error("set", key, &CacheError::Serialize(e));
                return false;
            }
        };
        self.set_raw(key, payload, ttl).await
    }

    /// Serialize now, write in the background. The caller never waits on the cache.
    pub fn spawn_set<T: Serialize + ?Sized>(
        self: &Arc<Self>,
        key: String,
        value: &T,
        ttl: Duration,
    ) {
        let payload = match serde_json::to_string(value) {
            Ok(p) => p,
            Err(e) => {
                self.record_error("set", &key, &CacheError::Serialize(e));
                return;
            }
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.set_raw(&key, payload, ttl).await;
        });
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.guarded("delete", key, self.backend.delete(key))
            .await
            .unwrap_or(false)
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.guarded("exists", key, self.backend.exists(key))
            .await
            .unwrap_or(false)
    }

    pub async fn close(&self) {
        self.backend.close().await;
    }

    pub fn stats(&self) -> CacheStatsSnapshot {
        self.stats.snapshot()
    }

    async fn set_raw(&self, key: &str, payload: String, ttl: Duration) -> bool {
        self.guarded("set", key, self.backend.set(key, payload, ttl))
            .await
            .is_some()
    }

    /// Run a backend call under the call timeout, absorbing any failure.
    async fn guarded<R>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = Result<R, CacheError>>,
    ) -> Option<R> {
        match tokio::time::timeout(self.call_timeout, fut).await {
            Ok(Ok(v)) => Some(v),
            Ok(Err(e)) => {
                self.record_error(op, key, &e);
                None
            }
            Err(_) => {
                self.record_error(op, key, &CacheError::Timeout(self.call_timeout));
                None
            }
        }
    }

    fn record_error(&self, op: &'static str, key: &str, err: &CacheError) {
        self.stats.errors.fetch_add(1, Ordering::Relaxed);
        warn!(op, key, "cache {op} failed, continuing without cache: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        date: NaiveDate,
        price: Decimal,
        label: Option<String>,
    }

    fn payload() -> Payload {
        Payload {
            date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            price: Decimal::new(1999999, 4),
            label: None,
        }
    }

    fn layer() -> Arc<CacheLayer> {
        Arc::new(CacheLayer::new(MemoryCache::new(), Duration::from_millis(50)))
    }

    /// Always fails.
    struct DownBackend;

    #[async_trait]
    impl CacheBackend for DownBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _payload: String,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }
    }

    /// Answers, but too slowly.
    struct SlowBackend;

    #[async_trait]
    impl CacheBackend for SlowBackend {
        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(Some("{}".into()))
        }
        async fn set(
            &self,
            _key: &str,
            _payload: String,
            _ttl: Duration,
        ) -> Result<(), CacheError> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(())
        }
        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Ok(true)
        }
        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn round_trip_before_expiry() {
        let cache = layer();
        assert!(cache.set("k", &payload(), Duration::from_secs(5)).await);
        let back: Option<Payload> = cache.get("k").await;
        assert_eq!(back, Some(payload()));
        assert_eq!(cache.stats().hits, 1);
    }

    #[tokio::test]
    async fn miss_after_expiry() {
        let cache = layer();
        cache.set("k", &payload(), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(cache.get::<Payload>("k").await.is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn backend_failure_is_a_miss() {
        let cache = CacheLayer::new(Arc::new(DownBackend), Duration::from_millis(50));
        assert!(cache.get::<Payload>("k").await.is_none());
        assert!(!cache.set("k", &payload(), Duration::from_secs(1)).await);
        assert!(!cache.delete("k").await);
        assert!(!cache.exists("k").await);
        assert_eq!(cache.stats().errors, 4);
    }

    #[tokio::test]
    async fn slow_backend_times_out_as_miss() {
        let cache = CacheLayer::new(Arc::new(SlowBackend), Duration::from_millis(20));
        assert!(cache.get::<Payload>("k").await.is_none());
        assert!(!cache.set("k", &payload(), Duration::from_secs(1)).await);
        assert_eq!(cache.stats().errors, 2);
    }

    #[tokio::test]
    async fn malformed_payload_is_a_miss() {
        let backend = MemoryCache::new();
        backend.set("k", "not json".into(), Duration::from_secs(5)).await.unwrap();
        let cache = CacheLayer::new(backend, Duration::from_millis(50));
        assert!(cache.get::<Payload>("k").await.is_none());
        assert_eq!(cache.stats().errors, 1);
    }

    #[tokio::test]
    async fn spawned_set_lands_eventually() {
        let cache = layer();
        cache.spawn_set("k".to_string(), &payload(), Duration::from_secs(5));
        for _ in 0..50 {
            if cache.exists("k").await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert_eq!(cache.get::<Payload>("k").await, Some(payload()));
    }
}
