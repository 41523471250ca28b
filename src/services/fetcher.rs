//! Cached, fallback-on-failure upstream fetches.
//!
//! One GET per call, no retries. Successful bodies are written through to the
//! [`CacheStore`] under the request's cache key; failures are logged and never
//! cached, so the next call goes upstream again.

use reqwest::header::HeaderMap;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use crate::cache::CacheStore;
use crate::errors::FetchError;

/// Timeout used when a request does not set its own.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Describes one upstream GET.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: Url,
    pub headers: HeaderMap,
    /// Defaults to the full URL, query string included.
    pub cache_key: String,
    pub timeout: Duration,
}

impl FetchRequest {
    pub fn new(url: Url) -> Self {
        let cache_key = url.to_string();
        Self {
            url,
            headers: HeaderMap::new(),
            cache_key,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn headers(mut self, headers: &HeaderMap) -> Self {
        self.headers.extend(headers.clone());
        self
    }
}

/// Result of a cached fetch.
#[derive(Debug)]
pub enum FetchOutcome<T> {
    /// Served from a fresh cache entry; no upstream call was made.
    Cached(T),
    /// Fetched from upstream and written to the cache.
    Fetched(T),
    /// Upstream call failed; nothing was cached.
    Failed(FetchError),
}

impl<T> FetchOutcome<T> {
    pub fn into_result(self) -> Result<T, FetchError> {
        match self {
            FetchOutcome::Cached(v) | FetchOutcome::Fetched(v) => Ok(v),
            FetchOutcome::Failed(e) => Err(e),
        }
    }

    pub fn unwrap_or(self, fallback: T) -> T {
        self.into_result().unwrap_or(fallback)
    }
}

#[derive(Debug, Clone)]
pub struct ResilientFetcher {
    client: reqwest::Client,
    cache: CacheStore,
}

impl ResilientFetcher {
    pub fn new(cache: CacheStore) -> Self {
        Self {
            client: reqwest::Client::new(),
            cache,
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    /// Issue the upstream call once and decode the body as `T`. Bypasses the cache.
    pub async fn request<T: DeserializeOwned>(&self, req: &FetchRequest) -> Result<T, FetchError> {
        let result = self
            .request_raw(req)
            .await
            .and_then(|raw| Ok(serde_json::from_value(raw)?));
        if let Err(e) = &result {
            tracing::warn!("API request to {} failed: {}", req.url, e);
        }
        result
    }

    async fn request_raw(&self, req: &FetchRequest) -> Result<serde_json::Value, FetchError> {
        let response = self
            .client
            .get(req.url.clone())
            .headers(req.headers.clone())
            .timeout(req.timeout)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: req.url.clone(),
                status: response.status(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Fresh cached value under `key`, decoded as `T`.
    pub async fn cached<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.cache.get_fresh(key).await?;
        match serde_json::from_value(payload) {
            Ok(value) => {
                tracing::debug!("Cache hit for '{}'", key);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("Cached payload for '{}' no longer decodes, ignoring: {}", key, e);
                None
            }
        }
    }

    /// Serialize `value` and store it under `key`.
    pub async fn store<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(payload) => self.cache.put(key, payload).await,
            Err(e) => tracing::warn!("Failed to serialize value for cache key '{}': {}", key, e),
        }
    }

    /// Serve from cache when fresh, otherwise call upstream and cache the result.
    pub async fn fetch<T: DeserializeOwned>(&self, req: &FetchRequest) -> FetchOutcome<T> {
        if let Some(value) = self.cached(&req.cache_key).await {
            return FetchOutcome::Cached(value);
        }

        let raw = match self.request_raw(req).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("API request to {} failed: {}", req.url, e);
                return FetchOutcome::Failed(e);
            }
        };

        // Decode before caching so a body of the wrong shape is never replayed
        match serde_json::from_value::<T>(raw.clone()) {
            Ok(value) => {
                self.cache.put(req.cache_key.as_str(), raw).await;
                FetchOutcome::Fetched(value)
            }
            Err(e) => {
                let e = FetchError::from(e);
                tracing::warn!("API request to {} failed: {}", req.url, e);
                FetchOutcome::Failed(e)
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but any failure yields `fallback` verbatim.
    pub async fn fetch_with_fallback<T: DeserializeOwned>(&self, req: &FetchRequest, fallback: T) -> T {
        self.fetch(req).await.unwrap_or(fallback)
    }
}
