//! Error taxonomy for the feed client and catch-up subscriptions.
//!
//! This module provides:
//! - The [`FeedError`] enum produced by HTTP status mapping and wrapped causes
//! - Machine-readable [`ErrorCode`]s and an [`ErrorSeverity`] used for logging
//! - Metrics integration for error tracking
//!
//! # Usage
//!
//! ```rust,ignore
//! use esfeed_core::error::{FeedError, Result};
//!
//! fn lookup(stream: &str) -> Result<()> {
//!     Err(FeedError::stream_not_found(stream))
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Boxed error returned by event handlers and carried as a wrapped cause.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Read errors (1000-1099)
    StreamNotFound,
    StreamDeleted,
    EventNotFound,
    UnknownServerResponse,
    ReadFailed,

    // Cursor errors (1100-1199)
    NoSuchElement,
    UnsupportedOperation,
    MarkerNotFound,

    // Subscription errors (1200-1299)
    HandlerFailed,
    SubscriptionCallbackFailed,

    // Write errors (1300-1399)
    AppendFailed,

    // Configuration errors (5000-5099)
    ConfigurationError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::StreamNotFound => 1000,
            Self::StreamDeleted => 1001,
            Self::EventNotFound => 1002,
            Self::UnknownServerResponse => 1003,
            Self::ReadFailed => 1004,

            Self::NoSuchElement => 1100,
            Self::UnsupportedOperation => 1101,
            Self::MarkerNotFound => 1102,

            Self::HandlerFailed => 1200,
            Self::SubscriptionCallbackFailed => 1201,

            Self::AppendFailed => 1300,

            Self::ConfigurationError => 5000,
        }
    }

    /// Get the error category for grouping.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "read",
            1100..=1199 => "cursor",
            1200..=1299 => "subscription",
            1300..=1399 => "write",
            5000..=5099 => "configuration",
            _ => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller mistakes and expected absences
    Low,
    /// Server-side conditions the caller may want to react to
    Medium,
    /// Transport or delivery failures
    High,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::NoSuchElement
            | ErrorCode::UnsupportedOperation
            | ErrorCode::EventNotFound
            | ErrorCode::MarkerNotFound
            | ErrorCode::StreamNotFound => Self::Low,

            ErrorCode::StreamDeleted
            | ErrorCode::UnknownServerResponse
            | ErrorCode::ConfigurationError => Self::Medium,

            ErrorCode::ReadFailed
            | ErrorCode::AppendFailed
            | ErrorCode::HandlerFailed
            | ErrorCode::SubscriptionCallbackFailed => Self::High,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// Errors raised by feed reads, cursors and subscriptions.
#[derive(Error, Debug)]
pub enum FeedError {
    /// Slice or head read answered 404.
    #[error("stream not found: {stream}")]
    StreamNotFound { stream: String },

    /// Read answered 410. The stream will never reappear under that name.
    #[error("stream was hard deleted: {stream}")]
    StreamDeleted { stream: String },

    /// Single-event read answered 404.
    #[error("event {event_number} not found in stream {stream}")]
    EventNotFound { stream: String, event_number: u64 },

    /// Any other non-2xx answer.
    #[error("unknown server response for stream {stream} [Status={status}]")]
    UnknownServerResponse { stream: String, status: String },

    /// Network, timeout, decode or parse failure.
    #[error("{message} failed for stream {stream}")]
    ReadFailed {
        stream: String,
        message: String,
        #[source]
        source: BoxError,
    },

    /// `next()` was called with nothing left to read.
    #[error("no such element in stream {stream}")]
    NoSuchElement { stream: String },

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A restart marker could not be located in the feed.
    #[error("marker {marker} not found in stream {stream}")]
    MarkerNotFound { stream: String, marker: String },

    /// The event handler of a subscription rejected an event.
    #[error("handler failed for event {event_number} of stream {stream}")]
    HandlerFailed {
        stream: String,
        event_number: u64,
        #[source]
        source: BoxError,
    },

    /// Raised by the default subscription error handler.
    #[error("{message}")]
    SubscriptionCallbackFailed {
        message: String,
        #[source]
        source: Box<FeedError>,
    },

    #[error("{message} failed for stream {stream}")]
    AppendFailed {
        stream: String,
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FeedError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn stream_not_found(stream: impl Into<String>) -> Self {
        Self::StreamNotFound {
            stream: stream.into(),
        }
        .recorded()
    }

    pub fn stream_deleted(stream: impl Into<String>) -> Self {
        Self::StreamDeleted {
            stream: stream.into(),
        }
        .recorded()
    }

    pub fn event_not_found(stream: impl Into<String>, event_number: u64) -> Self {
        Self::EventNotFound {
            stream: stream.into(),
            event_number,
        }
        .recorded()
    }

    pub fn unknown_response(stream: impl Into<String>, status: impl fmt::Display) -> Self {
        Self::UnknownServerResponse {
            stream: stream.into(),
            status: status.to_string(),
        }
        .recorded()
    }

    /// Wrap an I/O or parse failure of the operation described by `message`.
    pub fn read_failed<E>(stream: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::ReadFailed {
            stream: stream.into(),
            message: message.into(),
            source: source.into(),
        }
        .recorded()
    }

    pub fn append_failed<E>(stream: impl Into<String>, message: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::AppendFailed {
            stream: stream.into(),
            message: message.into(),
            source: source.into(),
        }
        .recorded()
    }

    pub fn handler_failed(stream: impl Into<String>, event_number: u64, source: BoxError) -> Self {
        Self::HandlerFailed {
            stream: stream.into(),
            event_number,
            source,
        }
        .recorded()
    }

    pub fn callback_failed(message: impl Into<String>, source: FeedError) -> Self {
        Self::SubscriptionCallbackFailed {
            message: message.into(),
            source: Box::new(source),
        }
        .recorded()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the error code.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::StreamNotFound { .. } => ErrorCode::StreamNotFound,
            Self::StreamDeleted { .. } => ErrorCode::StreamDeleted,
            Self::EventNotFound { .. } => ErrorCode::EventNotFound,
            Self::UnknownServerResponse { .. } => ErrorCode::UnknownServerResponse,
            Self::ReadFailed { .. } => ErrorCode::ReadFailed,
            Self::NoSuchElement { .. } => ErrorCode::NoSuchElement,
            Self::UnsupportedOperation(_) => ErrorCode::UnsupportedOperation,
            Self::MarkerNotFound { .. } => ErrorCode::MarkerNotFound,
            Self::HandlerFailed { .. } => ErrorCode::HandlerFailed,
            Self::SubscriptionCallbackFailed { .. } => ErrorCode::SubscriptionCallbackFailed,
            Self::AppendFailed { .. } => ErrorCode::AppendFailed,
            Self::Configuration(_) => ErrorCode::ConfigurationError,
        }
    }

    /// Get the error severity.
    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code())
    }

    /// Stream the error refers to, when there is one.
    pub fn stream(&self) -> Option<&str> {
        match self {
            Self::StreamNotFound { stream }
            | Self::StreamDeleted { stream }
            | Self::EventNotFound { stream, .. }
            | Self::UnknownServerResponse { stream, .. }
            | Self::ReadFailed { stream, .. }
            | Self::NoSuchElement { stream }
            | Self::MarkerNotFound { stream, .. }
            | Self::HandlerFailed { stream, .. }
            | Self::AppendFailed { stream, .. } => Some(stream),
            Self::SubscriptionCallbackFailed { source, .. } => source.stream(),
            Self::UnsupportedOperation(_) | Self::Configuration(_) => None,
        }
    }

    /// A stream that was hard deleted will never come back, so there is no
    /// point in polling it again.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::StreamDeleted { .. } => true,
            Self::SubscriptionCallbackFailed { source, .. } => source.is_terminal(),
            _ => false,
        }
    }

    /// Check if a later attempt of the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ReadFailed { .. } | Self::UnknownServerResponse { .. } | Self::HandlerFailed { .. } => true,
            Self::SubscriptionCallbackFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code();
        match self.severity() {
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = code.category(),
                    stream = ?self.stream(),
                    error = %self,
                    source = ?std::error::Error::source(self).map(|s| s.to_string()),
                    "Feed error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = code.category(),
                    stream = ?self.stream(),
                    error = %self,
                    "Feed error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = code.category(),
                    stream = ?self.stream(),
                    error = %self,
                    "Feed error"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Metrics
    // ─────────────────────────────────────────────────────────────────────────

    fn recorded(self) -> Self {
        let code = self.code();
        counter!(
            "esfeed_errors_total",
            "code" => code.to_string(),
            "category" => code.category().to_string(),
        )
        .increment(1);
        self
    }
}
