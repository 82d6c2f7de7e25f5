//! Structured diagnostic events.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Why an entry left the cache without an explicit invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictReason {
    /// Store was at `max_entries`; the oldest entry made room.
    Capacity,
    /// Removed by the opportunistic expiry sweep.
    Expired,
    /// Removed by `clear()`.
    Cleared,
}

/// Event payloads. The `event` tag carries the snake_case variant name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DiagnosticKind {
    CacheHit {
        key: String,
        hits: u64,
        misses: u64,
    },
    CacheMiss {
        key: String,
        hits: u64,
        misses: u64,
    },
    CacheSet {
        key: String,
        ttl_ms: u64,
        size: usize,
    },
    CacheEvict {
        key: String,
        reason: EvictReason,
        evictions: u64,
    },
    CacheInvalidate {
        key: String,
        removed: usize,
    },
    RetryAttempt {
        attempt: u32,
        max_retries: u32,
        delay_ms: u64,
        reason: String,
    },
    RateLimited {
        attempt: u32,
        retry_after_ms: u64,
    },
    RetryExhausted {
        attempts: u32,
        total_delay_ms: u64,
        reason: String,
    },
    DedupJoin {
        key: String,
        in_flight: usize,
    },
    CircuitState {
        from: String,
        to: String,
        consecutive_failures: u32,
    },
}

impl DiagnosticKind {
    /// The serialized `event` tag.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CacheHit { .. } => "cache_hit",
            Self::CacheMiss { .. } => "cache_miss",
            Self::CacheSet { .. } => "cache_set",
            Self::CacheEvict { .. } => "cache_evict",
            Self::CacheInvalidate { .. } => "cache_invalidate",
            Self::RetryAttempt { .. } => "retry_attempt",
            Self::RateLimited { .. } => "rate_limited",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::DedupJoin { .. } => "dedup_join",
            Self::CircuitState { .. } => "circuit_state",
        }
    }
}

/// One diagnostic record: namespace, payload and an ISO-8601 UTC timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiagnosticEvent {
    pub namespace: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
    pub timestamp: String,
}

impl DiagnosticEvent {
    pub fn new(namespace: impl Into<String>, kind: DiagnosticKind) -> Self {
        Self {
            namespace: namespace.into(),
            kind,
            timestamp: timestamp(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"event\":\"{}\"}}", self.name()))
    }
}
