//! Batch executor.

use crate::resilience::RetryExecutor;
use crate::Result;
use futures::future::join_all;
use std::future::Future;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct BatchOutcome<T> {
    /// Position of the operation in the input.
    pub index: usize,
    pub result: Result<T>,
}

#[derive(Debug, Clone)]
pub struct BatchResult<T> {
    /// One outcome per input operation, in input order.
    pub outcomes: Vec<BatchOutcome<T>>,
    pub execution_time: Duration,
}

impl<T> BatchResult<T> {
    pub fn new() -> Self {
        Self {
            outcomes: Vec::new(),
            execution_time: Duration::ZERO,
        }
    }
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.result.is_ok())
    }
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
    pub fn failure_count(&self) -> usize {
        self.len() - self.success_count()
    }
    pub fn success_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            0.0
        } else {
            self.success_count() as f64 / self.len() as f64
        }
    }
    pub fn into_results(self) -> Vec<Result<T>> {
        self.outcomes.into_iter().map(|o| o.result).collect()
    }
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs operations in fixed windows of `concurrency`, each through a
/// [`RetryExecutor`]. A window starts only after the previous one settled.
pub struct BatchExecutor {
    retry: RetryExecutor,
    concurrency: usize,
}

impl BatchExecutor {
    /// `concurrency = 0` is treated as 1.
    pub fn new(retry: RetryExecutor, concurrency: usize) -> Self {
        Self {
            retry,
            concurrency: concurrency.max(1),
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn run<T, F, Fut>(&self, operations: Vec<F>) -> BatchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut result = BatchResult::new();
        result.outcomes.reserve(operations.len());

        let mut pending = operations.into_iter().enumerate();
        loop {
            let window: Vec<(usize, F)> = pending.by_ref().take(self.concurrency).collect();
            if window.is_empty() {
                break;
            }
            let settled = join_all(window.into_iter().map(|(index, op)| async move {
                let label = format!("batch[{}]", index);
                BatchOutcome {
                    index,
                    result: self.retry.fetch_with_retry(&label, op).await,
                }
            }))
            .await;
            result.outcomes.extend(settled);
        }

        result.execution_time = start.elapsed();
        result
    }
}
