//! 弹性模式模块：提供重试退避与熔断器等可靠性保障机制。
//!
//! # Resilience Primitives Module
//!
//! Retry and circuit breaking for calls to an unreliable remote service.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`retry`] | Exponential backoff with jitter, retry hints and error classification |
//! | [`circuit_breaker`] | Closed / open / half-open failure isolation |
//!
//! ## Retry
//!
//! Transport failures, 408, 429 and 5xx statuses in the configured set, and
//! configured domain codes are retried. Other 4xx statuses and
//! [`Error::CircuitOpen`](crate::Error::CircuitOpen) never are.
//!
//! ```rust
//! use resilient_fetch::resilience::{RetryConfig, RetryExecutor};
//! use resilient_fetch::Error;
//! use std::time::Duration;
//!
//! let retry = RetryExecutor::new(
//!     RetryConfig::new()
//!         .with_base_delay(Duration::from_millis(100))
//!         .with_jitter_factor(0.0),
//! );
//! assert_eq!(retry.calculate_delay(3, None), Duration::from_millis(400));
//! assert!(!retry.is_retryable(&Error::status(404, "not found")));
//! ```
//!
//! ## Circuit Breaker
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Failures exceeded threshold, requests fail fast
//! - **Half-Open**: Testing if service has recovered
//!
//! ```rust
//! use resilient_fetch::resilience::{CircuitBreaker, CircuitBreakerConfig, RetryExecutor};
//! use std::time::Duration;
//!
//! let config = CircuitBreakerConfig::new()
//!     .with_failure_threshold(5)
//!     .with_reset_timeout(Duration::from_secs(30));
//! let breaker = CircuitBreaker::new("page", config, RetryExecutor::default());
//! assert!(breaker.allow_request());
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerSnapshot, CircuitState,
};
pub use retry::{RetryConfig, RetryContext, RetryExecutor, RetryObserver};
