use crate::transport::TransportError;
use std::sync::Arc;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "retry.jitter_factor")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Component that raised the error (e.g., "deduplicator", "config")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Unified error type for the resilient remote-access layer.
///
/// `Clone` so a single failure can be handed to every caller attached to a
/// deduplicated operation.
#[derive(Debug, Clone, Error)]
pub enum Error {
    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    #[error("Runtime error: {message}{}", format_context(.context))]
    Runtime {
        message: String,
        context: ErrorContext,
    },

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Remote error{}{}: {message}", format_status(.status), format_code(.code))]
    Remote {
        status: Option<u16>,
        code: Option<String>,
        message: String,
        retry_after_ms: Option<u64>,
    },

    #[error("Circuit '{name}' is open; retry in {retry_in_ms}ms")]
    CircuitOpen { name: String, retry_in_ms: u64 },

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Serialization error: {0}")]
    Serialization(Arc<serde_json::Error>),

    #[error("Unknown error: {message}{}", format_context(.context))]
    Unknown {
        message: String,
        context: ErrorContext,
    },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

fn format_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" HTTP {}", s)).unwrap_or_default()
}

fn format_code(code: &Option<String>) -> String {
    code.as_ref().map(|c| format!(" [{}]", c)).unwrap_or_default()
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(e))
    }
}

impl Error {
    /// A remote failure carrying only an HTTP status.
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Error::Remote {
            status: Some(status),
            code: None,
            message: message.into(),
            retry_after_ms: None,
        }
    }

    /// A remote failure carrying only a domain error code.
    pub fn code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Remote {
            status: None,
            code: Some(code.into()),
            message: message.into(),
            retry_after_ms: None,
        }
    }

    pub fn runtime_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Runtime {
            message: msg.into(),
            context,
        }
    }

    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    pub fn unknown_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Unknown {
            message: msg.into(),
            context,
        }
    }

    /// Attach a server-provided retry hint to a remote error. Other variants are returned as-is.
    pub fn with_retry_after_ms(self, ms: u64) -> Self {
        match self {
            Error::Remote {
                status,
                code,
                message,
                ..
            } => Error::Remote {
                status,
                code,
                message,
                retry_after_ms: Some(ms),
            },
            other => other,
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Runtime { context, .. }
            | Error::Unknown { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Remote { status, .. } => *status,
            _ => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Error::Remote { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            Error::Remote { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// Connection-level failure with no response.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// The breaker refused to attempt the operation.
    ///
    /// Callers use this to report "service temporarily unavailable" instead of
    /// a generic failure.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Error::CircuitOpen { .. })
    }

    /// Short machine-readable reason used in diagnostics.
    pub fn reason(&self) -> String {
        match self {
            Error::Transport(t) => t.kind.to_string(),
            Error::Remote {
                status: Some(s),
                code: Some(c),
                ..
            } => format!("{} {}", s, c),
            Error::Remote {
                status: Some(s), ..
            } => format!("http {}", s),
            Error::Remote { code: Some(c), .. } => c.clone(),
            Error::Remote { .. } => "remote".to_string(),
            Error::CircuitOpen { .. } => "circuit_open".to_string(),
            Error::Configuration { .. } => "configuration".to_string(),
            Error::Validation { .. } => "validation".to_string(),
            Error::Runtime { .. } => "runtime".to_string(),
            Error::Io(_) => "io".to_string(),
            Error::Serialization(_) => "serialization".to_string(),
            Error::Unknown { .. } => "unknown".to_string(),
        }
    }
}
