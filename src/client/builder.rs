use crate::cache::{CacheStore, FileTier, PersistentTier, ResourceType};
use crate::client::core::ResilientFetch;
use crate::config::FetchConfig;
use crate::dedup::Deduplicator;
use crate::resilience::{CircuitBreaker, RetryExecutor, RetryObserver};
use crate::telemetry::{DiagnosticSink, Diagnostics, StderrSink};
use crate::Result;
use std::sync::Arc;
use tracing::debug;

/// Builder for [`ResilientFetch`].
///
/// Keep this surface area small and predictable: everything tunable lives in
/// [`FetchConfig`]; the builder only injects collaborators.
pub struct ResilientFetchBuilder {
    config: FetchConfig,
    tier: Option<Arc<dyn PersistentTier>>,
    sink: Option<Arc<dyn DiagnosticSink>>,
    observer: Option<RetryObserver>,
}

impl ResilientFetchBuilder {
    pub fn new() -> Self {
        Self::from_config(FetchConfig::default())
    }

    pub fn from_config(config: FetchConfig) -> Self {
        Self {
            config,
            tier: None,
            sink: None,
            observer: None,
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: FetchConfig) -> Self {
        self.config = config;
        self
    }

    /// Use `tier` as the persistent cache tier regardless of `cache.persistent`.
    pub fn persistent_tier(mut self, tier: Arc<dyn PersistentTier>) -> Self {
        self.tier = Some(tier);
        self
    }

    /// Inject a diagnostic sink. Default is JSON lines on stderr.
    ///
    /// Events are only emitted when `diagnostics.verbose` is set.
    pub fn diagnostic_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Observe every retry after its backoff sleep.
    pub fn retry_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn build(self) -> Result<ResilientFetch> {
        self.config.validate()?;
        let config = self.config;

        let sink = self.sink.unwrap_or_else(|| Arc::new(StderrSink));
        let diagnostics = Diagnostics::new(config.diagnostics.verbose, sink);

        let tier = self.tier.or_else(|| {
            config.cache.persistent.enabled.then(|| {
                let dir = config
                    .cache
                    .persistent
                    .directory
                    .clone()
                    .unwrap_or_else(|| std::env::temp_dir().join("resilient-fetch-cache"));
                debug!(dir = %dir.display(), "file cache tier enabled");
                Arc::new(FileTier::new(dir)) as Arc<dyn PersistentTier>
            })
        });

        let mut cache = CacheStore::new(config.cache.clone()).with_diagnostics(diagnostics.clone());
        if let Some(tier) = tier {
            cache = cache.with_tier(tier);
        }

        let dedup = Deduplicator::new(config.dedup.clone()).with_diagnostics(diagnostics.clone());

        let mut retry = RetryExecutor::new(config.retry.clone()).with_diagnostics(diagnostics.clone());
        if let Some(observer) = self.observer {
            retry = retry.with_observer(observer);
        }

        let breakers = ResourceType::ALL
            .iter()
            .map(|resource| {
                Arc::new(
                    CircuitBreaker::new(
                        resource.as_str(),
                        config.circuit_breaker.clone(),
                        retry.clone(),
                    )
                    .with_diagnostics(diagnostics.clone()),
                )
            })
            .collect();

        Ok(ResilientFetch {
            config,
            cache: Arc::new(cache),
            dedup: Arc::new(dedup),
            retry,
            breakers,
            diagnostics,
        })
    }
}

impl Default for ResilientFetchBuilder {
    fn default() -> Self {
        Self::new()
    }
}
