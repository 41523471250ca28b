//! In-memory TTL cache for upstream payloads.
//!
//! Entries are never evicted; staleness is decided lazily on read by
//! comparing `stored_at` against the injected clock. The store is a cheap
//! clonable handle so one instance built in `main` is shared by every client.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// How long a stored payload is served before the upstream is asked again.
pub const CACHE_TTL_SECS: i64 = 3600;

/// Source of "now" for freshness decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: serde_json::Value,
    stored_at: DateTime<Utc>,
}

/// Result of a cache read. A stale hit must be treated as a miss.
#[derive(Debug, Clone)]
pub struct CacheLookup {
    pub payload: serde_json::Value,
    pub is_fresh: bool,
}

#[derive(Clone)]
pub struct CacheStore {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_ttl(clock, Duration::seconds(CACHE_TTL_SECS))
    }

    pub fn with_ttl(clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            ttl,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Look up `key`. `None` means the key was never stored.
    pub async fn get(&self, key: &str) -> Option<CacheLookup> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        let age = self.clock.now() - entry.stored_at;
        Some(CacheLookup {
            payload: entry.payload.clone(),
            is_fresh: age < self.ttl,
        })
    }

    /// The payload under `key` if it is still within the TTL.
    pub async fn get_fresh(&self, key: &str) -> Option<serde_json::Value> {
        self.get(key)
            .await
            .filter(|lookup| lookup.is_fresh)
            .map(|lookup| lookup.payload)
    }

    /// Store `payload` under `key`, replacing any previous entry.
    pub async fn put(&self, key: impl Into<String>, payload: serde_json::Value) {
        let entry = CacheEntry {
            payload,
            stored_at: self.clock.now(),
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore")
            .field("ttl_secs", &self.ttl.num_seconds())
            .finish_non_exhaustive()
    }
}

/// Clock that only moves when told to.
#[cfg(test)]
pub(crate) struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::Mutex::new(start),
        })
    }

    pub(crate) fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn start() -> DateTime<Utc> {
        "2026-03-01T08:00:00Z".parse().unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = CacheStore::new(ManualClock::new(start()));
        assert!(store.get("countries").await.is_none());
        assert!(store.get_fresh("countries").await.is_none());
    }

    #[tokio::test]
    async fn test_fresh_within_ttl() {
        let clock = ManualClock::new(start());
        let store = CacheStore::new(clock.clone());
        store.put("countries", json!({"results": []})).await;

        clock.advance(Duration::seconds(CACHE_TTL_SECS - 1));

        let lookup = store.get("countries").await.unwrap();
        assert!(lookup.is_fresh);
        assert_eq!(lookup.payload, json!({"results": []}));
    }

    #[tokio::test]
    async fn test_stale_at_exactly_ttl() {
        let clock = ManualClock::new(start());
        let store = CacheStore::new(clock.clone());
        store.put("countries", json!(1)).await;

        clock.advance(Duration::seconds(CACHE_TTL_SECS));

        let lookup = store.get("countries").await.unwrap();
        assert!(!lookup.is_fresh, "an entry exactly TTL old is stale");
        assert!(store.get_fresh("countries").await.is_none());
    }

    #[tokio::test]
    async fn test_put_overwrites_and_resets_timestamp() {
        let clock = ManualClock::new(start());
        let store = CacheStore::new(clock.clone());
        store.put("k", json!({"a": 1, "b": 2})).await;

        clock.advance(Duration::seconds(CACHE_TTL_SECS + 10));
        store.put("k", json!({"a": 3})).await;

        // Wholesale replacement: no merge with the old payload
        assert_eq!(store.get_fresh("k").await, Some(json!({"a": 3})));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_custom_ttl() {
        let clock = ManualClock::new(start());
        let store = CacheStore::with_ttl(clock.clone(), Duration::seconds(5));
        store.put("k", json!(true)).await;

        clock.advance(Duration::seconds(4));
        assert!(store.get_fresh("k").await.is_some());
        clock.advance(Duration::seconds(1));
        assert!(store.get_fresh("k").await.is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writes_to_different_keys() {
        let store = CacheStore::new(Arc::new(SystemClock));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store.put(format!("key_{}", i), json!(i)).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 16);
        for i in 0..16 {
            assert_eq!(store.get_fresh(&format!("key_{}", i)).await, Some(json!(i)));
        }
    }
}
