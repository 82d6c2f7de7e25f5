use crate::cache::CacheStats;
use crate::dedup::DedupStats;
use crate::resilience::CircuitBreakerSnapshot;

/// Point-in-time runtime signals of a [`ResilientFetch`](super::ResilientFetch).
///
/// Facts only; applications build health reporting or load shedding on top.
#[derive(Debug, Clone, Default)]
pub struct SignalsSnapshot {
    /// `None` when the cache is disabled.
    pub cache: Option<CacheStats>,
    pub dedup: DedupStats,
    /// One per resource type, in declaration order.
    pub breakers: Vec<CircuitBreakerSnapshot>,
}

impl SignalsSnapshot {
    pub fn breaker(&self, name: &str) -> Option<&CircuitBreakerSnapshot> {
        self.breakers.iter().find(|b| b.name == name)
    }

    /// Names of breakers currently refusing calls.
    pub fn open_breakers(&self) -> Vec<&str> {
        self.breakers
            .iter()
            .filter(|b| b.open_remaining_ms.is_some())
            .map(|b| b.name.as_str())
            .collect()
    }
}
