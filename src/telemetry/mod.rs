//! # Diagnostics Module
//!
//! Side channel for structured events emitted by the cache, retry, dedup and
//! breaker layers. Events never mix with the primary result stream: the
//! default sink writes JSON lines to stderr, and nothing is emitted unless the
//! handle is verbose.
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Diagnostics`] | Cloneable, verbosity-gated emitter handed to every component |
//! | [`DiagnosticEvent`] | Namespace + payload + ISO-8601 timestamp |
//! | [`DiagnosticSink`] | Destination trait |
//! | [`StderrSink`] / [`TracingSink`] | Production sinks |
//! | [`MemorySink`] | Collects events for assertions in tests |
//!
//! ```rust
//! use resilient_fetch::telemetry::{Diagnostics, DiagnosticKind, MemorySink};
//! use std::sync::Arc;
//!
//! let sink = Arc::new(MemorySink::default());
//! let diagnostics = Diagnostics::new(true, sink.clone());
//! diagnostics.emit("cache", || DiagnosticKind::CacheInvalidate { key: "page:".into(), removed: 3 });
//! assert_eq!(sink.named("cache_invalidate").len(), 1);
//! ```

mod events;
mod sink;

pub use events::{DiagnosticEvent, DiagnosticKind, EvictReason};
pub use sink::{CompositeSink, DiagnosticSink, MemorySink, NoopSink, StderrSink, TracingSink};

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Verbosity-gated handle to a [`DiagnosticSink`].
#[derive(Clone)]
pub struct Diagnostics {
    verbose: bool,
    sink: Arc<dyn DiagnosticSink>,
}

impl Diagnostics {
    pub fn new(verbose: bool, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self { verbose, sink }
    }

    /// Verbose-gated stderr emitter.
    pub fn stderr(verbose: bool) -> Self {
        Self::new(verbose, Arc::new(StderrSink))
    }

    pub fn disabled() -> Self {
        Self::new(false, Arc::new(NoopSink))
    }

    pub fn is_enabled(&self) -> bool {
        self.verbose
    }

    /// Emit an event. `kind` is only built when diagnostics are enabled.
    pub fn emit(&self, namespace: &str, kind: impl FnOnce() -> DiagnosticKind) {
        if !self.verbose {
            return;
        }
        self.sink.emit(&DiagnosticEvent::new(namespace, kind()));
    }
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self::disabled()
    }
}

impl std::fmt::Debug for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Diagnostics")
            .field("verbose", &self.verbose)
            .finish_non_exhaustive()
    }
}

/// Install a stderr `tracing` subscriber.
///
/// `RUST_LOG` wins when set; otherwise this crate logs at `debug` when
/// `verbose` and `warn` when not. Calling it twice is harmless.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "resilient_fetch=debug"
    } else {
        "resilient_fetch=warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
