//! Diagnostic sinks.

use super::events::DiagnosticEvent;
use std::io::Write;
use std::sync::{Arc, Mutex};

/// Destination for diagnostic events.
///
/// Emission happens on hot paths (cache lookups), so sinks are synchronous and
/// must not block for long.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, event: &DiagnosticEvent);
}

/// Discards everything.
pub struct NoopSink;

impl DiagnosticSink for NoopSink {
    fn emit(&self, _: &DiagnosticEvent) {}
}

/// JSON lines on stderr. Never touches stdout.
pub struct StderrSink;

impl DiagnosticSink for StderrSink {
    fn emit(&self, event: &DiagnosticEvent) {
        let line = event.to_json();
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }
}

/// Forwards events to the `tracing` subscriber at debug level.
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, event: &DiagnosticEvent) {
        tracing::debug!(
            target: "resilient_fetch::diagnostics",
            event = event.name(),
            namespace = %event.namespace,
            payload = %event.to_json(),
        );
    }
}

/// In-memory sink for tests.
pub struct MemorySink {
    events: Mutex<Vec<DiagnosticEvent>>,
    max_events: usize,
}

impl MemorySink {
    pub fn new(max: usize) -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            max_events: max,
        }
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.lock().clone()
    }

    /// Events whose `event` tag equals `name`.
    pub fn named(&self, name: &str) -> Vec<DiagnosticEvent> {
        self.lock()
            .iter()
            .filter(|e| e.name() == name)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<DiagnosticEvent>> {
        self.events.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, event: &DiagnosticEvent) {
        let mut events = self.lock();
        events.push(event.clone());
        if events.len() > self.max_events {
            events.remove(0);
        }
    }
}

/// Fans out to several sinks.
#[derive(Default)]
pub struct CompositeSink {
    sinks: Vec<Arc<dyn DiagnosticSink>>,
}

impl CompositeSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl DiagnosticSink for CompositeSink {
    fn emit(&self, event: &DiagnosticEvent) {
        for s in &self.sinks {
            s.emit(event);
        }
    }
}
