//! Retry with exponential backoff and jitter.

use crate::batch::{BatchExecutor, BatchResult};
use crate::config::duration_ms;
use crate::error_code::DomainErrorCode;
use crate::telemetry::{DiagnosticKind, Diagnostics};
use crate::{Error, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    #[serde(rename = "base_delay_ms", with = "duration_ms")]
    pub base_delay: Duration,
    #[serde(rename = "max_delay_ms", with = "duration_ms")]
    pub max_delay: Duration,
    pub exponential_base: f64,
    /// Symmetric jitter as a fraction of the computed delay, e.g. 0.1 = ±10%.
    pub jitter_factor: f64,
    pub retryable_status_codes: HashSet<u16>,
    /// Checked independently of the status: an error whose domain code is
    /// listed here is retried even if its status is not.
    pub retryable_error_codes: HashSet<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            exponential_base: 2.0,
            jitter_factor: 0.1,
            retryable_status_codes: [408, 429, 500, 502, 503, 504].into_iter().collect(),
            retryable_error_codes: DomainErrorCode::RETRYABLE
                .iter()
                .map(|c| c.as_str().to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn with_max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }
    pub fn with_base_delay(mut self, d: Duration) -> Self {
        self.base_delay = d;
        self
    }
    pub fn with_max_delay(mut self, d: Duration) -> Self {
        self.max_delay = d;
        self
    }
    pub fn with_exponential_base(mut self, b: f64) -> Self {
        self.exponential_base = b;
        self
    }
    pub fn with_jitter_factor(mut self, j: f64) -> Self {
        self.jitter_factor = j;
        self
    }
    pub fn with_retryable_status(mut self, status: u16) -> Self {
        self.retryable_status_codes.insert(status);
        self
    }
    pub fn with_retryable_code(mut self, code: impl Into<String>) -> Self {
        self.retryable_error_codes.insert(code.into());
        self
    }
}

/// State of one retry sequence, handed to the observer after each backoff sleep.
#[derive(Debug, Clone)]
pub struct RetryContext {
    /// 1-based number of the attempt that just failed.
    pub attempt: u32,
    pub max_retries: u32,
    pub last_error: Option<Error>,
    pub total_delay: Duration,
}

pub type RetryObserver = Arc<dyn Fn(&RetryContext) + Send + Sync>;

#[derive(Clone)]
pub struct RetryExecutor {
    config: Arc<RetryConfig>,
    diagnostics: Diagnostics,
    observer: Option<RetryObserver>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config: Arc::new(config),
            diagnostics: Diagnostics::disabled(),
            observer: None,
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn with_observer(mut self, observer: RetryObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn is_retryable(&self, error: &Error) -> bool {
        if error.is_circuit_open() {
            return false;
        }
        if let Some(status) = error.status_code() {
            if (400..500).contains(&status) && status != 408 && status != 429 {
                return false;
            }
        }
        if error.is_transport() {
            return true;
        }
        error
            .status_code()
            .is_some_and(|s| self.config.retryable_status_codes.contains(&s))
            || error
                .error_code()
                .is_some_and(|c| self.config.retryable_error_codes.contains(c))
    }

    /// `min(base * exponential_base^(attempt-1), max_delay)` with no jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let base = self.config.base_delay.as_millis() as f64;
        let cap = self.config.max_delay.as_millis() as f64;
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay = (base * self.config.exponential_base.powi(exp)).min(cap);
        Duration::from_millis(delay.max(0.0).round() as u64)
    }

    /// Delay before the attempt after `attempt`.
    ///
    /// A server retry hint replaces the computed backoff entirely: it is
    /// capped at `max_delay` and gets no jitter.
    pub fn calculate_delay(&self, attempt: u32, error: Option<&Error>) -> Duration {
        if let Some(hint) = error.and_then(Error::retry_after_ms) {
            return Duration::from_millis(hint).min(self.config.max_delay);
        }
        let delay = self.backoff(attempt).as_millis() as f64;
        let j = self.config.jitter_factor;
        let jittered = if j > 0.0 {
            delay * (1.0 + rand::thread_rng().gen_range(-j..=j))
        } else {
            delay
        };
        Duration::from_millis(jittered.max(0.0).round() as u64)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// runs out of attempts (`max_retries + 1` in total). The last error is
    /// returned unchanged.
    pub async fn fetch_with_retry<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut ctx = RetryContext {
            attempt: 0,
            max_retries,
            last_error: None,
            total_delay: Duration::ZERO,
        };

        loop {
            ctx.attempt += 1;
            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if !self.is_retryable(&error) {
                debug!(label, attempt = ctx.attempt, error = %error, "not retryable");
                return Err(error);
            }

            if ctx.attempt > max_retries {
                warn!(
                    label,
                    attempts = ctx.attempt,
                    total_delay_ms = ctx.total_delay.as_millis() as u64,
                    error = %error,
                    "retries exhausted"
                );
                self.diagnostics.emit("retry", || DiagnosticKind::RetryExhausted {
                    attempts: ctx.attempt,
                    total_delay_ms: ctx.total_delay.as_millis() as u64,
                    reason: error.reason(),
                });
                return Err(error);
            }

            let delay = self.calculate_delay(ctx.attempt, Some(&error));
            let delay_ms = delay.as_millis() as u64;
            if error.status_code() == Some(429) || error.retry_after_ms().is_some() {
                self.diagnostics.emit("retry", || DiagnosticKind::RateLimited {
                    attempt: ctx.attempt,
                    retry_after_ms: delay_ms,
                });
            }
            self.diagnostics.emit("retry", || DiagnosticKind::RetryAttempt {
                attempt: ctx.attempt,
                max_retries,
                delay_ms,
                reason: error.reason(),
            });
            debug!(label, attempt = ctx.attempt, delay_ms, error = %error, "retrying");

            tokio::time::sleep(delay).await;
            ctx.total_delay += delay;
            ctx.last_error = Some(error);
            if let Some(observer) = &self.observer {
                observer(&ctx);
            }
        }
    }

    /// Run every operation through [`fetch_with_retry`](Self::fetch_with_retry),
    /// `concurrency` at a time. Failures never abort the batch.
    pub async fn batch_with_retry<T, F, Fut>(
        &self,
        operations: Vec<F>,
        concurrency: usize,
    ) -> BatchResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        BatchExecutor::new(self.clone(), concurrency)
            .run(operations)
            .await
    }
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(RetryConfig::default())
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    fn executor(jitter: f64) -> RetryExecutor {
        RetryExecutor::new(
            RetryConfig::new()
                .with_base_delay(Duration::from_millis(100))
                .with_max_delay(Duration::from_millis(1000))
                .with_jitter_factor(jitter),
        )
    }

    #[test]
    fn test_classification() {
        let r = executor(0.0);
        assert!(r.is_retryable(&Error::status(503, "unavailable")));
        assert!(r.is_retryable(&Error::status(429, "slow down")));
        assert!(r.is_retryable(&Error::status(408, "timeout")));
        assert!(!r.is_retryable(&Error::status(404, "missing")));
        assert!(!r.is_retryable(&Error::status(501, "not implemented")));
        assert!(r.is_retryable(&Error::Transport(TransportError::connection_reset("reset"))));
        assert!(r.is_retryable(&Error::code("rate_limited", "slow down")));
        assert!(!r.is_retryable(&Error::code("validation_error", "bad")));
        assert!(!r.is_retryable(&Error::CircuitOpen {
            name: "page".into(),
            retry_in_ms: 10
        }));
    }

    #[test]
    fn test_client_status_wins_over_retryable_code() {
        let r = executor(0.0);
        let err = Error::Remote {
            status: Some(400),
            code: Some("rate_limited".into()),
            message: "bad".into(),
            retry_after_ms: None,
        };
        assert!(!r.is_retryable(&err));
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let r = executor(0.0);
        assert_eq!(r.calculate_delay(1, None), Duration::from_millis(100));
        assert_eq!(r.calculate_delay(2, None), Duration::from_millis(200));
        assert_eq!(r.calculate_delay(3, None), Duration::from_millis(400));
        assert_eq!(r.calculate_delay(10, None), Duration::from_millis(1000));
    }

    #[test]
    fn test_jitter_stays_in_bounds() {
        let r = executor(0.1);
        for attempt in 1..=5 {
            let nominal = r.backoff(attempt).as_millis() as u64;
            for _ in 0..50 {
                let d = r.calculate_delay(attempt, None).as_millis() as u64;
                assert!(d <= nominal + nominal / 10 + 1, "{} > {}", d, nominal);
                assert!(d + nominal / 10 + 1 >= nominal);
            }
        }
    }

    #[test]
    fn test_hint_replaces_backoff_and_is_capped() {
        let r = executor(0.5);
        let hinted = Error::status(429, "slow").with_retry_after_ms(250);
        assert_eq!(r.calculate_delay(3, Some(&hinted)), Duration::from_millis(250));
        let long = Error::status(429, "slow").with_retry_after_ms(60_000);
        assert_eq!(r.calculate_delay(1, Some(&long)), Duration::from_millis(1000));
    }
}
