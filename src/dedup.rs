//! In-flight request deduplication.
//!
//! Concurrent calls for the same key share one execution of the underlying
//! operation. The first caller spawns the operation as its own task and
//! registers a shared handle to it; later callers attach to that handle
//! until the task settles, at which point the registration is removed.

use crate::telemetry::{DiagnosticKind, Diagnostics};
use crate::utils::lock;
use crate::{Error, ErrorContext, Result};
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub enabled: bool,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    /// Operations actually started.
    pub leaders: u64,
    /// Callers that attached to an operation already in flight.
    pub joined: u64,
    pub in_flight: usize,
}

type SharedResult<T> = Shared<BoxFuture<'static, Result<T>>>;
type Registry<T> = Arc<Mutex<HashMap<String, Pending<T>>>>;

struct Pending<T: Clone> {
    id: u64,
    future: SharedResult<T>,
}

/// Removes its registration when the operation task finishes, panics or is
/// cancelled. The id check keeps a stale guard from removing a newer entry.
struct RegistryGuard<T: Clone> {
    registry: Registry<T>,
    key: String,
    id: u64,
}

impl<T: Clone> Drop for RegistryGuard<T> {
    fn drop(&mut self) {
        let mut pending = lock(&self.registry);
        if pending.get(&self.key).map(|p| p.id) == Some(self.id) {
            pending.remove(&self.key);
        }
    }
}

pub struct Deduplicator<T: Clone> {
    enabled: bool,
    pending: Registry<T>,
    next_id: AtomicU64,
    leaders: AtomicU64,
    joined: AtomicU64,
    diagnostics: Diagnostics,
}

impl<T> Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(config: DedupConfig) -> Self {
        Self {
            enabled: config.enabled,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
            leaders: AtomicU64::new(0),
            joined: AtomicU64::new(0),
            diagnostics: Diagnostics::disabled(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    /// Run `operation` unless one is already in flight under `key`, in which
    /// case await that one instead. Every attached caller receives a clone of
    /// the same outcome, success or error.
    ///
    /// `operation` is invoked at most once per execution, while the registry
    /// lock is held; it should only build the future. A panic while building
    /// it settles as [`Error::Runtime`] and registers nothing. Dropping the
    /// returned future does not cancel the operation for other callers.
    pub async fn execute<F, Fut>(&self, key: &str, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        if !self.enabled {
            return operation().await;
        }

        let (future, joined_in_flight) = {
            let mut pending = lock(&self.pending);
            match pending.get(key) {
                Some(existing) => (existing.future.clone(), Some(pending.len())),
                None => {
                    // the registry lock is held, so no unwinding past this point
                    let fut = match panic::catch_unwind(AssertUnwindSafe(operation)) {
                        Ok(fut) => fut,
                        Err(_) => {
                            return Err(Error::runtime_with_context(
                                "deduplicated operation panicked before starting",
                                ErrorContext::new().with_source("deduplicator"),
                            ))
                        }
                    };
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let guard = RegistryGuard {
                        registry: self.pending.clone(),
                        key: key.to_string(),
                        id,
                    };
                    let handle = tokio::spawn(async move {
                        let _guard = guard;
                        fut.await
                    });
                    let shared = handle
                        .map(|joined| {
                            joined.unwrap_or_else(|e| {
                                Err(Error::runtime_with_context(
                                    format!("deduplicated operation did not complete: {}", e),
                                    ErrorContext::new().with_source("deduplicator"),
                                ))
                            })
                        })
                        .boxed()
                        .shared();
                    pending.insert(
                        key.to_string(),
                        Pending {
                            id,
                            future: shared.clone(),
                        },
                    );
                    (shared, None)
                }
            }
        };

        match joined_in_flight {
            Some(in_flight) => {
                self.joined.fetch_add(1, Ordering::Relaxed);
                debug!(key, in_flight, "joined in-flight request");
                self.diagnostics.emit("dedup", || DiagnosticKind::DedupJoin {
                    key: key.to_string(),
                    in_flight,
                });
            }
            None => {
                self.leaders.fetch_add(1, Ordering::Relaxed);
            }
        }

        future.await
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    pub fn in_flight(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn stats(&self) -> DedupStats {
        DedupStats {
            leaders: self.leaders.load(Ordering::Relaxed),
            joined: self.joined.load(Ordering::Relaxed),
            in_flight: self.in_flight(),
        }
    }
}

impl<T> Default for Deduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new(DedupConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_sequential_calls_run_separately() {
        let dedup: Deduplicator<u32> = Deduplicator::default();
        let runs = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let runs = runs.clone();
            let v = dedup
                .execute("k", move || async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                })
                .await
                .unwrap();
            assert_eq!(v, 7);
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(dedup.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_becomes_runtime_error_and_clears_registry() {
        let dedup: Arc<Deduplicator<u32>> = Arc::new(Deduplicator::default());
        let result = dedup
            .execute("boom", || async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if true {
                    panic!("operation panicked");
                }
                Ok(0)
            })
            .await;
        assert!(matches!(result, Err(Error::Runtime { .. })));
        assert!(!dedup.is_in_flight("boom"));
    }

    #[test]
    fn test_operation_panicking_while_building_future_does_not_wedge_registry() {
        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let outcome = rt.block_on(async {
                let dedup: Deduplicator<u32> = Deduplicator::default();
                let first = dedup
                    .execute("k", || -> futures::future::Ready<Result<u32>> {
                        panic!("builder failed")
                    })
                    .await;
                let in_flight = dedup.is_in_flight("k");
                let second = dedup.execute("k", || async { Ok(5) }).await;
                (first, in_flight, second)
            });
            let _ = tx.send(outcome);
        });

        let (first, in_flight, second) = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("execute hung after the operation panicked");
        assert!(matches!(first, Err(Error::Runtime { .. })));
        assert!(!in_flight);
        assert_eq!(second.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_disabled_runs_every_call() {
        let dedup: Deduplicator<u32> = Deduplicator::new(DedupConfig { enabled: false });
        let runs = Arc::new(AtomicUsize::new(0));
        let calls = (0..3).map(|_| {
            let runs = runs.clone();
            dedup.execute("k", move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok(1)
            })
        });
        futures::future::join_all(calls).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert_eq!(dedup.stats().leaders, 0);
    }
}
