//! In-memory TTL cache with an optional persistent tier.

use super::backend::{PersistedEntry, PersistentTier};
use super::key::{CacheKey, ResourceType};
use crate::config::{duration_ms_map, duration_ms_opt};
use crate::telemetry::{DiagnosticKind, Diagnostics, EvictReason};
use crate::utils::lock;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistentConfig {
    pub enabled: bool,
    /// Defaults to `<tmp>/resilient-fetch-cache` when unset.
    pub directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Lifetime for every resource type without an override. When unset, each
    /// type keeps its built-in default.
    #[serde(rename = "default_ttl_ms", with = "duration_ms_opt")]
    pub default_ttl: Option<Duration>,
    #[serde(rename = "ttl_overrides_ms", with = "duration_ms_map")]
    pub ttl_overrides: HashMap<ResourceType, Duration>,
    pub max_entries: usize,
    /// Chance that a `set` first sweeps expired entries.
    pub sweep_probability: f64,
    pub persistent: PersistentConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: None,
            ttl_overrides: HashMap::new(),
            max_entries: 1000,
            sweep_probability: 0.1,
            persistent: PersistentConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }
    pub fn with_ttl_override(mut self, resource: ResourceType, ttl: Duration) -> Self {
        self.ttl_overrides.insert(resource, ttl);
        self
    }
    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }
    pub fn with_sweep_probability(mut self, p: f64) -> Self {
        self.sweep_probability = p;
        self
    }
    pub fn with_persistent_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.persistent.enabled = true;
        self.persistent.directory = Some(dir.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub size: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    evictions: AtomicU64,
}

struct CacheEntry {
    value: Bytes,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) >= self.ttl
    }
}

/// TTL key-value store shared by every caller of a [`ResilientFetch`](crate::client::ResilientFetch).
///
/// Values are kept as serialized JSON and decoded per read. Nothing on the
/// read or write path returns an error: decode and persistence failures are
/// logged and behave like a miss or a skipped write.
///
/// Eviction removes the entry with the oldest `stored_at`, found by a linear
/// scan. That approximates LRU without tracking reads; callers may rely on
/// which entries survive under pressure, so it is kept as is.
pub struct CacheStore {
    config: CacheConfig,
    entries: Mutex<HashMap<String, CacheEntry>>,
    stats: AtomicStats,
    tier: Option<Arc<dyn PersistentTier>>,
    diagnostics: Diagnostics,
}

impl CacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            stats: AtomicStats::default(),
            tier: None,
            diagnostics: Diagnostics::disabled(),
        }
    }

    pub fn with_tier(mut self, tier: Arc<dyn PersistentTier>) -> Self {
        self.tier = Some(tier);
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn tier_name(&self) -> Option<&'static str> {
        self.tier.as_ref().map(|t| t.name())
    }

    /// Effective lifetime: explicit, then the configured per-type override,
    /// then the configured global default, then the type's built-in default.
    pub fn ttl_for(&self, resource: ResourceType, explicit: Option<Duration>) -> Duration {
        explicit
            .or_else(|| self.config.ttl_overrides.get(&resource).copied())
            .or(self.config.default_ttl)
            .unwrap_or_else(|| resource.default_ttl())
    }

    /// Typed lookup. A stored value that does not decode as `T` counts as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let value = self.lookup(key).await.and_then(|raw| {
            serde_json::from_slice(&raw)
                .map_err(|e| warn!(key = %key, error = %e, "cached value failed to decode"))
                .ok()
        });
        self.record_lookup(key, value.is_some());
        value
    }

    /// Untyped lookup returning the stored JSON bytes.
    pub async fn get_raw(&self, key: &CacheKey) -> Option<Bytes> {
        if !self.config.enabled {
            return None;
        }
        let value = self.lookup(key).await;
        self.record_lookup(key, value.is_some());
        value
    }

    pub fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        match serde_json::to_vec(value) {
            Ok(raw) => self.set_raw(key, Bytes::from(raw), ttl),
            Err(e) => warn!(key = %key, error = %e, "value not cacheable"),
        }
    }

    /// Store pre-serialized JSON. The persistent write, if any, runs detached.
    pub fn set_raw(&self, key: &CacheKey, value: Bytes, ttl: Option<Duration>) {
        if !self.config.enabled {
            return;
        }
        let ttl = self.ttl_for(key.resource(), ttl);
        let now = Instant::now();
        let (evicted, size) = {
            let mut entries = lock(&self.entries);
            let mut evicted = Vec::new();
            if self.config.sweep_probability > 0.0
                && rand::random::<f64>() < self.config.sweep_probability
            {
                evicted.extend(
                    Self::sweep_locked(&mut entries, now)
                        .into_iter()
                        .map(|k| (k, EvictReason::Expired)),
                );
            }
            if !entries.contains_key(key.as_str()) && entries.len() >= self.config.max_entries {
                if let Some(oldest) = Self::oldest_locked(&entries) {
                    entries.remove(&oldest);
                    evicted.push((oldest, EvictReason::Capacity));
                }
            }
            entries.insert(
                key.as_str().to_string(),
                CacheEntry {
                    value: value.clone(),
                    stored_at: now,
                    ttl,
                },
            );
            (evicted, entries.len())
        };

        self.stats.sets.fetch_add(1, Ordering::Relaxed);
        self.record_evictions(evicted);
        debug!(key = %key, ttl_ms = ttl.as_millis() as u64, "cache set");
        self.diagnostics.emit("cache", || DiagnosticKind::CacheSet {
            key: key.to_string(),
            ttl_ms: ttl.as_millis() as u64,
            size,
        });
        self.persist(key, &value, ttl);
    }

    /// Remove exactly one entry. Returns whether it was present in memory.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let removed = lock(&self.entries).remove(key.as_str()).is_some();
        self.diagnostics.emit("cache", || DiagnosticKind::CacheInvalidate {
            key: key.to_string(),
            removed: removed as usize,
        });
        let k = key.to_string();
        self.spawn_tier("invalidate", move |tier| async move { tier.invalidate(&k).await });
        removed
    }

    /// Remove every entry of `resource`, typically after a write made them stale.
    pub fn invalidate_resource(&self, resource: ResourceType) -> usize {
        let prefix = resource.prefix();
        let removed = {
            let mut entries = lock(&self.entries);
            let before = entries.len();
            entries.retain(|k, _| !k.starts_with(&prefix));
            before - entries.len()
        };
        debug!(resource = %resource, removed, "cache invalidate resource");
        self.diagnostics.emit("cache", || DiagnosticKind::CacheInvalidate {
            key: prefix.clone(),
            removed,
        });
        self.spawn_tier("invalidate_prefix", move |tier| async move {
            tier.invalidate_prefix(&prefix).await
        });
        removed
    }

    /// Drop everything. Cleared entries count as evictions.
    pub fn clear(&self) -> usize {
        let cleared = {
            let mut entries = lock(&self.entries);
            let n = entries.len();
            entries.clear();
            n
        };
        let evictions = self
            .stats
            .evictions
            .fetch_add(cleared as u64, Ordering::Relaxed)
            + cleared as u64;
        self.diagnostics.emit("cache", || DiagnosticKind::CacheEvict {
            key: "*".to_string(),
            reason: EvictReason::Cleared,
            evictions,
        });
        self.spawn_tier("clear", |tier| async move { tier.clear().await });
        cleared
    }

    /// Remove expired entries now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let swept = Self::sweep_locked(&mut lock(&self.entries), Instant::now());
        let n = swept.len();
        self.record_evictions(swept.into_iter().map(|k| (k, EvictReason::Expired)).collect());
        n
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            sets: self.stats.sets.load(Ordering::Relaxed),
            evictions: self.stats.evictions.load(Ordering::Relaxed),
            size: self.len(),
        }
    }

    async fn lookup(&self, key: &CacheKey) -> Option<Bytes> {
        if let Some(v) = self.lookup_memory(key) {
            return Some(v);
        }
        self.lookup_tier(key).await
    }

    fn lookup_memory(&self, key: &CacheKey) -> Option<Bytes> {
        let mut entries = lock(&self.entries);
        let expired = match entries.get(key.as_str()) {
            None => return None,
            Some(e) if !e.is_expired_at(Instant::now()) => return Some(e.value.clone()),
            Some(_) => true,
        };
        if expired {
            entries.remove(key.as_str());
        }
        None
    }

    async fn lookup_tier(&self, key: &CacheKey) -> Option<Bytes> {
        let tier = self.tier.as_ref()?;
        let entry = match tier.get(key.as_str()).await {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(key = %key, tier = tier.name(), error = %e, "persistent cache read failed");
                return None;
            }
        };
        let Some(remaining) = entry.remaining_ttl() else {
            let k = key.to_string();
            self.spawn_tier("invalidate", move |tier| async move { tier.invalidate(&k).await });
            return None;
        };
        let raw = match serde_json::to_vec(&entry.value) {
            Ok(raw) => Bytes::from(raw),
            Err(e) => {
                warn!(key = %key, error = %e, "persisted value failed to encode");
                return None;
            }
        };
        self.promote(key, raw.clone(), remaining);
        debug!(key = %key, remaining_ms = remaining.as_millis() as u64, "promoted from persistent tier");
        Some(raw)
    }

    /// Insert a tier hit into memory without counting a set or writing back.
    fn promote(&self, key: &CacheKey, value: Bytes, ttl: Duration) {
        let evicted = {
            let mut entries = lock(&self.entries);
            let mut evicted = Vec::new();
            if !entries.contains_key(key.as_str()) && entries.len() >= self.config.max_entries {
                if let Some(oldest) = Self::oldest_locked(&entries) {
                    entries.remove(&oldest);
                    evicted.push((oldest, EvictReason::Capacity));
                }
            }
            entries.insert(
                key.as_str().to_string(),
                CacheEntry {
                    value,
                    stored_at: Instant::now(),
                    ttl,
                },
            );
            evicted
        };
        self.record_evictions(evicted);
    }

    fn record_lookup(&self, key: &CacheKey, hit: bool) {
        let (hits, misses) = if hit {
            (
                self.stats.hits.fetch_add(1, Ordering::Relaxed) + 1,
                self.stats.misses.load(Ordering::Relaxed),
            )
        } else {
            (
                self.stats.hits.load(Ordering::Relaxed),
                self.stats.misses.fetch_add(1, Ordering::Relaxed) + 1,
            )
        };
        debug!(key = %key, hit, "cache lookup");
        self.diagnostics.emit("cache", || {
            let key = key.to_string();
            if hit {
                DiagnosticKind::CacheHit { key, hits, misses }
            } else {
                DiagnosticKind::CacheMiss { key, hits, misses }
            }
        });
    }

    fn record_evictions(&self, evicted: Vec<(String, EvictReason)>) {
        for (key, reason) in evicted {
            let evictions = self.stats.evictions.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(key = %key, ?reason, "cache evict");
            self.diagnostics.emit("cache", || DiagnosticKind::CacheEvict {
                key,
                reason,
                evictions,
            });
        }
    }

    fn sweep_locked(entries: &mut HashMap<String, CacheEntry>, now: Instant) -> Vec<String> {
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, e)| e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for k in &expired {
            entries.remove(k);
        }
        expired
    }

    fn oldest_locked(entries: &HashMap<String, CacheEntry>) -> Option<String> {
        entries
            .iter()
            .min_by_key(|(_, e)| e.stored_at)
            .map(|(k, _)| k.clone())
    }

    fn persist(&self, key: &CacheKey, value: &Bytes, ttl: Duration) {
        if self.tier.is_none() {
            return;
        }
        let json = match serde_json::from_slice::<serde_json::Value>(value) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %key, error = %e, "value not persistable");
                return;
            }
        };
        let entry = PersistedEntry::new(key.as_str(), json, ttl);
        self.spawn_tier("set", move |tier| async move { tier.set(&entry).await });
    }

    /// Run a tier operation as a detached task; its failure only reaches the log.
    fn spawn_tier<F, Fut>(&self, op: &'static str, f: F)
    where
        F: FnOnce(Arc<dyn PersistentTier>) -> Fut,
        Fut: std::future::Future<Output = crate::Result<()>> + Send + 'static,
    {
        let Some(tier) = self.tier.clone() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(op, "no runtime; persistent tier write skipped");
            return;
        };
        let name = tier.name();
        let fut = f(tier);
        handle.spawn(async move {
            if let Err(e) = fut.await {
                warn!(op, tier = name, error = %e, "persistent cache write failed");
            }
        });
    }
}
