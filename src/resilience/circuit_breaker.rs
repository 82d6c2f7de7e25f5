use super::retry::RetryExecutor;
use crate::config::duration_ms;
use crate::telemetry::{DiagnosticKind, Diagnostics};
use crate::utils::lock;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub timeout_ms: u64,
    /// Remaining open time in ms, if currently open.
    pub open_remaining_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    /// Consecutive half-open successes needed to close again.
    pub success_threshold: u32,
    /// How long the breaker stays open before letting a trial call through.
    #[serde(rename = "timeout_ms", with = "duration_ms")]
    pub timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Alias for with_timeout
    pub fn with_reset_timeout(self, timeout: Duration) -> Self {
        self.with_timeout(timeout)
    }
}

#[derive(Debug)]
struct State {
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    open_until: Option<Instant>,
}

type Transition = (CircuitState, CircuitState, u32);

/// Closed / open / half-open breaker guarding one resource category.
///
/// - Opens after `failure_threshold` consecutive failures
/// - Fails fast with [`Error::CircuitOpen`] while open
/// - After `timeout`, lets calls through in half-open
/// - Closes after `success_threshold` half-open successes; any half-open failure reopens
pub struct CircuitBreaker {
    name: String,
    cfg: CircuitBreakerConfig,
    retry: RetryExecutor,
    state: Mutex<State>,
    diagnostics: Diagnostics,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, cfg: CircuitBreakerConfig, retry: RetryExecutor) -> Self {
        Self {
            name: name.into(),
            cfg,
            retry,
            state: Mutex::new(State {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                open_until: None,
            }),
            diagnostics: Diagnostics::disabled(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.cfg
    }

    /// Admission check. Moves an expired open breaker to half-open.
    pub fn allow(&self) -> Result<()> {
        let now = Instant::now();
        let transition = {
            let mut st = lock(&self.state);
            match (st.state, st.open_until) {
                (CircuitState::Open, Some(until)) if now < until => {
                    return Err(Error::CircuitOpen {
                        name: self.name.clone(),
                        retry_in_ms: (until - now).as_millis() as u64,
                    });
                }
                (CircuitState::Open, _) => {
                    // cooldown expired
                    st.state = CircuitState::HalfOpen;
                    st.open_until = None;
                    st.consecutive_successes = 0;
                    Some((
                        CircuitState::Open,
                        CircuitState::HalfOpen,
                        st.consecutive_failures,
                    ))
                }
                _ => None,
            }
        };
        self.announce(transition);
        Ok(())
    }

    pub fn on_success(&self) {
        let transition = {
            let mut st = lock(&self.state);
            st.consecutive_failures = 0;
            if st.state == CircuitState::HalfOpen {
                st.consecutive_successes = st.consecutive_successes.saturating_add(1);
                if st.consecutive_successes >= self.cfg.success_threshold {
                    st.state = CircuitState::Closed;
                    st.consecutive_successes = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Closed, 0))
                } else {
                    None
                }
            } else {
                None
            }
        };
        self.announce(transition);
    }

    pub fn on_failure(&self) {
        let transition = {
            let mut st = lock(&self.state);
            st.consecutive_successes = 0;
            st.consecutive_failures = st.consecutive_failures.saturating_add(1);
            let trip = match st.state {
                CircuitState::HalfOpen => true,
                CircuitState::Closed => st.consecutive_failures >= self.cfg.failure_threshold,
                CircuitState::Open => false,
            };
            if trip {
                let from = st.state;
                st.state = CircuitState::Open;
                st.open_until = Some(Instant::now() + self.cfg.timeout);
                Some((from, CircuitState::Open, st.consecutive_failures))
            } else {
                None
            }
        };
        self.announce(transition);
    }

    /// Guard one future. Every error it produces counts as a failure.
    pub async fn call<T, Fut>(&self, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        self.allow()?;
        let result = fut.await;
        match &result {
            Ok(_) => self.on_success(),
            Err(_) => self.on_failure(),
        }
        result
    }

    /// Retry `operation` inside the breaker: the whole retry sequence is one
    /// breaker outcome.
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.call(self.retry.fetch_with_retry(&self.name, operation))
            .await
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.state).state
    }

    /// Force the breaker closed and clear its counters.
    pub fn reset(&self) {
        let transition = {
            let mut st = lock(&self.state);
            let from = st.state;
            st.state = CircuitState::Closed;
            st.consecutive_failures = 0;
            st.consecutive_successes = 0;
            st.open_until = None;
            (from != CircuitState::Closed).then_some((from, CircuitState::Closed, 0))
        };
        self.announce(transition);
    }

    pub fn snapshot(&self) -> CircuitBreakerSnapshot {
        let now = Instant::now();
        let st = lock(&self.state);
        let open_remaining_ms = st
            .open_until
            .filter(|until| *until > now)
            .map(|until| (until - now).as_millis() as u64);
        CircuitBreakerSnapshot {
            name: self.name.clone(),
            state: st.state,
            consecutive_failures: st.consecutive_failures,
            consecutive_successes: st.consecutive_successes,
            failure_threshold: self.cfg.failure_threshold,
            success_threshold: self.cfg.success_threshold,
            timeout_ms: self.cfg.timeout.as_millis() as u64,
            open_remaining_ms,
        }
    }

    fn announce(&self, transition: Option<Transition>) {
        let Some((from, to, consecutive_failures)) = transition else {
            return;
        };
        info!(
            breaker = %self.name,
            from = from.as_str(),
            to = to.as_str(),
            consecutive_failures,
            "circuit state changed"
        );
        self.diagnostics.emit("circuit", || DiagnosticKind::CircuitState {
            from: from.as_str().to_string(),
            to: to.as_str().to_string(),
            consecutive_failures,
        });
    }
}

impl CircuitBreaker {
    /// Check if a request is allowed (alias for allow)
    pub fn allow_request(&self) -> bool {
        self.allow().is_ok()
    }

    /// Record a success (alias for on_success)
    pub fn record_success(&self) {
        self.on_success();
    }

    /// Record a failure (alias for on_failure)
    pub fn record_failure(&self) {
        self.on_failure();
    }
}
