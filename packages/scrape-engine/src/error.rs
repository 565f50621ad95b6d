//! Typed errors for the scrape engine.
//!
//! Uses `thiserror` for library errors (not `anyhow`). Only [`EngineError`]
//! fails a batch call; every other error is folded into a per-request
//! [`FailureReason`] and reported.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Terminal reason recorded for a request that did not produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureReason {
    /// robots rules forbid the target path (or fail-closed policy applied)
    ComplianceDisallowed,
    NetworkTimeout,
    RateLimited,
    RenderTimeout,
    /// An extraction rule matched nothing and healing was not attempted
    SelectorMiss,
    /// Healing ran and produced no validated selector
    SelectorExhausted,
    ValidationFailed,
    /// Non-2xx response other than 429
    HttpStatus,
    NetworkError,
    /// Content-shape failure with no more capable strategy left
    EmptyContent,
    StrategyUnavailable,
    StorageFailed,
    Cancelled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ComplianceDisallowed => "compliance-disallowed",
            Self::NetworkTimeout => "network-timeout",
            Self::RateLimited => "rate-limited",
            Self::RenderTimeout => "render-timeout",
            Self::SelectorMiss => "selector-miss",
            Self::SelectorExhausted => "selector-exhausted",
            Self::ValidationFailed => "validation-failed",
            Self::HttpStatus => "http-status",
            Self::NetworkError => "network-error",
            Self::EmptyContent => "empty-content",
            Self::StrategyUnavailable => "strategy-unavailable",
            Self::StorageFailed => "storage-failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Transient kinds are retried by the scheduler; everything else is terminal.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::RateLimited | Self::RenderTimeout
        )
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural errors that fail the whole batch call.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Source id not present in the adapter registry
    #[error("unknown source: {0}")]
    UnknownSource(String),

    /// Strategy name not in the closed strategy set
    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    /// Configuration rejected before any request ran
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Target key could not be turned into a fetchable URL
    #[error("invalid target {source_id}/{target_key}: {reason}")]
    InvalidTarget {
        source_id: String,
        target_key: String,
        reason: String,
    },

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    HttpClient(#[source] reqwest::Error),
}

/// Errors reported by an extraction strategy.
///
/// Each variant maps to exactly one [`FailureReason`] so the scheduler can
/// choose a retry policy per kind.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("network timeout after {elapsed_ms}ms")]
    NetworkTimeout { elapsed_ms: u64 },

    #[error("HTTP status {status}")]
    HttpStatus { status: u16 },

    #[error("render timeout after {timeout_ms}ms")]
    RenderTimeout { timeout_ms: u64 },

    /// Quota or rate-limit rejection (HTTP 429 or provider quota)
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("network error: {0}")]
    Network(String),

    /// The strategy has no backend configured
    #[error("strategy unavailable: {0}")]
    Unavailable(String),
}

impl FetchError {
    pub fn reason(&self) -> FailureReason {
        match self {
            Self::NetworkTimeout { .. } => FailureReason::NetworkTimeout,
            Self::HttpStatus { .. } => FailureReason::HttpStatus,
            Self::RenderTimeout { .. } => FailureReason::RenderTimeout,
            Self::RateLimited { .. } => FailureReason::RateLimited,
            Self::Network(_) => FailureReason::NetworkError,
            Self::Unavailable(_) => FailureReason::StrategyUnavailable,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.reason().is_transient()
    }

    /// Server-requested wait, if the error carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Classify a `reqwest` transport error.
    pub fn from_reqwest(err: &reqwest::Error, elapsed_ms: u64) -> Self {
        if err.is_timeout() {
            Self::NetworkTimeout { elapsed_ms }
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), None)
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, retry_after: Option<Duration>) -> Self {
        match status {
            429 => Self::RateLimited { retry_after },
            408 | 504 => Self::NetworkTimeout { elapsed_ms: 0 },
            _ => Self::HttpStatus { status },
        }
    }
}

/// An extraction rule located nothing in the content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("selector `{selector}` for field `{field}` matched nothing")]
pub struct SelectorMiss {
    pub field: String,
    pub selector: String,
}

/// Adapter rejection of extracted content.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("missing required field `{field}`")]
    MissingField { field: String },

    #[error("invalid value for `{field}`: {message}")]
    InvalidField { field: String, message: String },

    #[error("no usable rows: {reason}")]
    NoRows { reason: String },
}

impl ValidationError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field the error is about, if any.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField { field } | Self::InvalidField { field, .. } => Some(field),
            Self::NoRows { .. } => None,
        }
    }
}

/// Record sink failure.
#[derive(Debug, Error)]
#[error("store error: {message}")]
pub struct StoreError {
    pub message: String,
}

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Result type alias for structural engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for strategy fetches.
pub type FetchResult<T> = std::result::Result<T, FetchError>;
