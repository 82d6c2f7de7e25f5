use crate::cache::{CacheKey, CacheStore, ResourceType};
use crate::client::signals::SignalsSnapshot;
use crate::config::FetchConfig;
use crate::dedup::Deduplicator;
use crate::resilience::{CircuitBreaker, RetryExecutor};
use crate::telemetry::Diagnostics;
use crate::{Error, Result};
use bytes::Bytes;
use futures::future::join_all;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Resilient access to a remote service.
///
/// For each call: cache read-through, then the resource type's circuit
/// breaker, then deduplication by cache key, then retry around the remote
/// operation, then cache write-through. Build one per process with
/// [`ResilientFetchBuilder`](crate::client::ResilientFetchBuilder) and share it.
pub struct ResilientFetch {
    pub(crate) config: FetchConfig,
    pub(crate) cache: Arc<CacheStore>,
    pub(crate) dedup: Arc<Deduplicator<Bytes>>,
    pub(crate) retry: RetryExecutor,
    /// Indexed by `ResourceType as usize`.
    pub(crate) breakers: Vec<Arc<CircuitBreaker>>,
    pub(crate) diagnostics: Diagnostics,
}

impl ResilientFetch {
    /// Build with default configuration.
    pub fn new() -> Result<Self> {
        crate::client::builder::ResilientFetchBuilder::new().build()
    }

    pub fn builder() -> crate::client::builder::ResilientFetchBuilder {
        crate::client::builder::ResilientFetchBuilder::new()
    }

    /// Read `key` from cache, or run `operation` once for all concurrent
    /// callers of the same key and cache its result.
    ///
    /// A breaker refusal surfaces as [`Error::CircuitOpen`](crate::Error::CircuitOpen).
    /// Failures are never cached.
    pub async fn fetch<T, F, Fut>(&self, key: &CacheKey, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        self.fetch_with_ttl(key, None, operation).await
    }

    /// [`fetch`](Self::fetch) with an explicit lifetime for the cached result.
    pub async fn fetch_with_ttl<T, F, Fut>(
        &self,
        key: &CacheKey,
        ttl: Option<Duration>,
        operation: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if let Some(hit) = self.cache.get::<T>(key).await {
            return Ok(hit);
        }

        let breaker = self.breaker(key.resource());
        let cache = self.cache.clone();
        let retry = self.retry.clone();
        let cache_key = key.clone();
        let raw = breaker
            .call(self.dedup.execute(key.as_str(), move || async move {
                let value = retry.fetch_with_retry(cache_key.as_str(), operation).await?;
                let raw = Bytes::from(serde_json::to_vec(&value)?);
                cache.set_raw(&cache_key, raw.clone(), ttl);
                Ok::<_, Error>(raw)
            }))
            .await?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Run a write through the resource type's breaker and retry, with no
    /// cache and no deduplication. On success every cached entry of
    /// `resource` is invalidated.
    pub async fn mutate<T, F, Fut>(&self, resource: ResourceType, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let value = self.breaker(resource).execute(operation).await?;
        let removed = self.cache.invalidate_resource(resource);
        debug!(resource = %resource, removed, "invalidated after mutation");
        Ok(value)
    }

    /// [`fetch`](Self::fetch) many keys, `concurrency` at a time, results in
    /// input order. One failure does not affect the others.
    pub async fn fetch_batch<T, F, Fut>(
        &self,
        requests: Vec<(CacheKey, F)>,
        concurrency: usize,
    ) -> Vec<Result<T>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let concurrency = concurrency.max(1);
        let mut results = Vec::with_capacity(requests.len());
        let mut pending = requests.into_iter();
        loop {
            let window: Vec<(CacheKey, F)> = pending.by_ref().take(concurrency).collect();
            if window.is_empty() {
                break;
            }
            let settled = join_all(
                window
                    .into_iter()
                    .map(|(key, op)| async move { self.fetch(&key, op).await }),
            )
            .await;
            results.extend(settled);
        }
        results
    }

    pub fn invalidate(&self, key: &CacheKey) -> bool {
        self.cache.invalidate(key)
    }

    pub fn invalidate_resource(&self, resource: ResourceType) -> usize {
        self.cache.invalidate_resource(resource)
    }

    pub fn clear_cache(&self) -> usize {
        self.cache.clear()
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn retry(&self) -> &RetryExecutor {
        &self.retry
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// The breaker guarding `resource`.
    pub fn breaker(&self, resource: ResourceType) -> &CircuitBreaker {
        &self.breakers[resource as usize]
    }

    /// Snapshot current runtime signals (facts only) for application-layer orchestration.
    pub fn signals(&self) -> SignalsSnapshot {
        SignalsSnapshot {
            cache: self.config.cache.enabled.then(|| self.cache.stats()),
            dedup: self.dedup.stats(),
            breakers: self.breakers.iter().map(|b| b.snapshot()).collect(),
        }
    }
}
