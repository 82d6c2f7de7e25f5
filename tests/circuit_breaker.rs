use resilient_fetch::resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryExecutor,
};
use resilient_fetch::telemetry::{DiagnosticKind, Diagnostics, MemorySink};
use resilient_fetch::Error;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn breaker(failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
    CircuitBreaker::new(
        "database",
        CircuitBreakerConfig::new()
            .with_failure_threshold(failure_threshold)
            .with_success_threshold(success_threshold)
            .with_timeout(Duration::from_secs(30)),
        // no retries: one operation call per breaker outcome
        RetryExecutor::new(RetryConfig::new().with_max_retries(0)),
    )
}

fn failing(calls: &Arc<AtomicU32>) -> impl FnMut() -> futures::future::Ready<resilient_fetch::Result<()>> {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Err(Error::status(503, "unavailable")))
    }
}

fn succeeding(calls: &Arc<AtomicU32>) -> impl FnMut() -> futures::future::Ready<resilient_fetch::Result<()>> {
    let calls = calls.clone();
    move || {
        calls.fetch_add(1, Ordering::SeqCst);
        futures::future::ready(Ok(()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_opens_after_threshold_and_fails_fast() {
    let cb = breaker(3, 2);
    let calls = Arc::new(AtomicU32::new(0));

    for _ in 0..3 {
        let err = cb.execute(failing(&calls)).await.unwrap_err();
        assert_eq!(err.status_code(), Some(503));
    }
    assert_eq!(cb.state(), CircuitState::Open);

    // 4th call is refused without running the operation
    let err = cb.execute(failing(&calls)).await.unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    match err {
        Error::CircuitOpen { name, retry_in_ms } => {
            assert_eq!(name, "database");
            assert!(retry_in_ms > 0 && retry_in_ms <= 30_000);
        }
        other => panic!("expected CircuitOpen, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_half_open_successes_close_the_breaker() {
    let cb = breaker(2, 2);
    let calls = Arc::new(AtomicU32::new(0));
    let _ = cb.execute(failing(&calls)).await;
    let _ = cb.execute(failing(&calls)).await;
    assert_eq!(cb.state(), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(30)).await;

    cb.execute(succeeding(&calls)).await.unwrap();
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    cb.execute(succeeding(&calls)).await.unwrap();
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_failure_reopens_with_fresh_cooldown() {
    let cb = breaker(1, 2);
    let calls = Arc::new(AtomicU32::new(0));
    let _ = cb.execute(failing(&calls)).await;
    tokio::time::advance(Duration::from_secs(30)).await;

    let err = cb.execute(failing(&calls)).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
    assert_eq!(cb.state(), CircuitState::Open);
    assert_eq!(cb.snapshot().open_remaining_ms, Some(30_000));

    tokio::time::advance(Duration::from_secs(29)).await;
    assert!(cb.execute(succeeding(&calls)).await.unwrap_err().is_circuit_open());
}

#[tokio::test(start_paused = true)]
async fn test_retry_sequence_counts_as_one_outcome() {
    let cb = CircuitBreaker::new(
        "page",
        CircuitBreakerConfig::new().with_failure_threshold(2),
        RetryExecutor::new(
            RetryConfig::new()
                .with_max_retries(3)
                .with_base_delay(Duration::from_millis(10))
                .with_jitter_factor(0.0),
        ),
    );
    let calls = Arc::new(AtomicU32::new(0));
    let _ = cb.execute(failing(&calls)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert_eq!(cb.snapshot().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_transitions_are_emitted() {
    let sink = Arc::new(MemorySink::default());
    let cb = breaker(1, 1).with_diagnostics(Diagnostics::new(true, sink.clone()));
    let calls = Arc::new(AtomicU32::new(0));

    let _ = cb.execute(failing(&calls)).await;
    tokio::time::advance(Duration::from_secs(30)).await;
    cb.execute(succeeding(&calls)).await.unwrap();

    let transitions: Vec<(String, String)> = sink
        .named("circuit_state")
        .into_iter()
        .filter_map(|e| match e.kind {
            DiagnosticKind::CircuitState { from, to, .. } => Some((from, to)),
            _ => None,
        })
        .collect();
    assert_eq!(
        transitions,
        vec![
            ("closed".to_string(), "open".to_string()),
            ("open".to_string(), "half_open".to_string()),
            ("half_open".to_string(), "closed".to_string()),
        ]
    );
}
