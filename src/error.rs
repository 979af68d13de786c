use crate::structured::ExtractionError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "config.base_url")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected type, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "file_cache", "config_loader")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
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

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of characters of offending model output kept for diagnostics.
pub const SNIPPET_CHARS: usize = 200;

/// Unified error type for the generation runtime.
///
/// The first three variants are the generation taxonomy surfaced to callers;
/// the rest are ambient failures (store, configuration, I/O).
#[derive(Debug, Error)]
pub enum Error {
    #[error("Malformed generation: {reason} (near: {snippet:?})")]
    MalformedGeneration { reason: String, snippet: String },

    #[error("Schema violation for kind '{kind}': invalid fields [{}]", .fields.join(", "))]
    SchemaViolation {
        kind: String,
        fields: Vec<String>,
        details: Vec<String>,
    },

    #[error("Upstream unavailable{}: {message}", .status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    UpstreamUnavailable { status: Option<u16>, message: String },

    #[error("Cache error: {message}{}", format_context(.context))]
    Cache {
        message: String,
        context: ErrorContext,
    },

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Helper function to format error context for display
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

/// First [`SNIPPET_CHARS`] characters of `text`, on a char boundary.
pub(crate) fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_CHARS).collect()
}

impl Error {
    /// Build a `MalformedGeneration` error from an extraction failure and the raw text.
    pub fn malformed(err: &ExtractionError, raw: &str) -> Self {
        Error::MalformedGeneration {
            reason: err.to_string(),
            snippet: snippet(raw),
        }
    }

    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::UpstreamUnavailable {
            status,
            message: message.into(),
        }
    }

    pub fn cache_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Cache {
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

    /// Whether this error belongs to the generation taxonomy, i.e. callers
    /// following the fallback convention should substitute a static payload.
    pub fn is_generation_failure(&self) -> bool {
        matches!(
            self,
            Error::MalformedGeneration { .. }
                | Error::SchemaViolation { .. }
                | Error::UpstreamUnavailable { .. }
        )
    }

    /// Stable short name, used as a structured logging field.
    pub fn class(&self) -> &'static str {
        match self {
            Error::MalformedGeneration { .. } => "malformed_generation",
            Error::SchemaViolation { .. } => "schema_violation",
            Error::UpstreamUnavailable { .. } => "upstream_unavailable",
            Error::Cache { .. } => "cache",
            Error::Configuration { .. } => "configuration",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
        }
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Cache { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}
