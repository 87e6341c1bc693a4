use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error types for Jobmesh.
#[derive(Error, Debug)]
pub enum AppError {
    /// The source is temporarily unreachable (outage, 5xx, connection refused).
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Credentials were rejected or have expired.
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The source's quota was exceeded.
    #[error("Rate limited{}", retry_after_suffix(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// The aggregation request itself is malformed.
    #[error("Invalid request: {0}")]
    ValidationFailure(String),

    /// Request timed out.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// HTTP request failed for a reason not covered above.
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// JSON serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Generic error.
    #[error("{0}")]
    Generic(String),
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(" (retry after {}s)", d.as_secs()),
        None => String::new(),
    }
}

/// Coarse classification of a failure, as recorded in an aggregation's error map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SourceUnavailable,
    AuthenticationFailure,
    RateLimited,
    ValidationFailure,
    Other,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SourceUnavailable => "source_unavailable",
            FailureKind::AuthenticationFailure => "authentication_failure",
            FailureKind::RateLimited => "rate_limited",
            FailureKind::ValidationFailure => "validation_failure",
            FailureKind::Other => "other",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AppError::SourceUnavailable(_) | AppError::Timeout(_) => FailureKind::SourceUnavailable,
            AppError::AuthenticationFailure(_) => FailureKind::AuthenticationFailure,
            AppError::RateLimited { .. } => FailureKind::RateLimited,
            AppError::ValidationFailure(_) => FailureKind::ValidationFailure,
            _ => FailureKind::Other,
        }
    }

    /// Returns true if this error is transient and worth retrying on a later run.
    ///
    /// Authentication failures need operator intervention and are never retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::SourceUnavailable(_) | AppError::Timeout(_) | AppError::RateLimited { .. } => {
                true
            }
            AppError::HttpError(msg) => {
                msg.contains("timeout") || msg.contains("connect") || msg.contains("reset")
            }
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AppError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}
