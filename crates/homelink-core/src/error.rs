//! Error types for homelink-core.
//!
//! # Propagation
//!
//! | Error Type | Strategy | Surfaced to the user |
//! |------------|----------|----------------------|
//! | [`Error::NotFound`] | Return immediately | Yes |
//! | [`Error::Busy`] | Return immediately, never queue | Yes |
//! | [`Error::Timeout`] | Retry per [`crate::RetryConfig`] | Only after the last attempt |
//! | [`Error::Network`] | Retry per [`crate::RetryConfig`] | Only after the last attempt |
//! | [`Error::HttpStatus`] | Retry per [`crate::RetryConfig`] | Only after the last attempt |
//! | [`Error::RemoteWriteFailed`] | Log and swallow at the boundary | No |
//! | [`Error::Unauthenticated`] | Return immediately | Depends on caller |
//! | [`Error::Cache`] | Log and swallow on write paths | No |
//!
//! Best-effort paths (cache persistence, remote mirroring, history
//! recording) never fail the operation that triggered them; the optimistic
//! local state must stay usable offline.

use std::time::Duration;

use thiserror::Error;

/// User-facing text for a rejected overlapping command.
pub const BUSY_MESSAGE: &str = "Đang xử lý...";

/// Errors produced by the homelink engine.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Unknown entity id.
    #[error("{kind} not found: {id}")]
    NotFound {
        /// Entity kind ("Device", "Room", "Schedule").
        kind: &'static str,
        /// The id that was looked up.
        id: String,
    },

    /// Another command of the same class is already in flight.
    #[error("{}", BUSY_MESSAGE)]
    Busy,

    /// An attempt exceeded its time bound.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The bound that was exceeded.
        duration: Duration,
    },

    /// Transport or connection failure.
    #[error("Network error: {0}")]
    Network(String),

    /// The controller answered with a non-2xx status.
    #[error("HTTP error {status}")]
    HttpStatus {
        /// Response status code.
        status: u16,
    },

    /// A best-effort write to the remote replica failed.
    #[error("Remote write to '{path}' failed: {reason}")]
    RemoteWriteFailed {
        /// Replica path that was being written.
        path: String,
        /// Underlying failure.
        reason: String,
    },

    /// A remote operation was attempted without a session.
    #[error("Not signed in")]
    Unauthenticated,

    /// Local cache failure.
    #[error("Cache error: {0}")]
    Cache(#[from] homelink_store::Error),

    /// JSON encoding or decoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A URL did not have an http(s) scheme.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a not-found error for a device id.
    pub fn device_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Device",
            id: id.into(),
        }
    }

    /// Create a not-found error for a room id.
    pub fn room_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Room",
            id: id.into(),
        }
    }

    /// Create a not-found error for a schedule id.
    pub fn schedule_not_found(id: impl Into<String>) -> Self {
        Self::NotFound {
            kind: "Schedule",
            id: id.into(),
        }
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a remote write failure.
    pub fn remote_write(path: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::RemoteWriteFailed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether a retry may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Timeout { .. } | Error::Network(_) | Error::HttpStatus { .. }
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout {
                operation: err
                    .url()
                    .map(|u| u.path().to_string())
                    .unwrap_or_else(|| "request".to_string()),
                duration: Duration::ZERO,
            }
        } else if let Some(status) = err.status() {
            Error::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            Error::Network(err.to_string())
        }
    }
}

/// Result type alias using homelink-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("led-9");
        assert_eq!(err.to_string(), "Device not found: led-9");

        assert_eq!(Error::Busy.to_string(), "Đang xử lý...");

        let err = Error::timeout("POST /led", Duration::from_secs(8));
        assert!(err.to_string().contains("POST /led"));
        assert!(err.to_string().contains("8s"));

        let err = Error::HttpStatus { status: 503 };
        assert_eq!(err.to_string(), "HTTP error 503");

        let err = Error::remote_write("devices/u1/led-1", "permission denied");
        assert!(err.to_string().contains("devices/u1/led-1"));
    }

    #[test]
    fn test_is_retryable() {
        assert!(Error::timeout("x", Duration::from_secs(1)).is_retryable());
        assert!(Error::Network("refused".into()).is_retryable());
        assert!(Error::HttpStatus { status: 500 }.is_retryable());
        assert!(!Error::Busy.is_retryable());
        assert!(!Error::device_not_found("x").is_retryable());
        assert!(!Error::Unauthenticated.is_retryable());
        assert!(!Error::InvalidUrl("x".into()).is_retryable());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: Error = homelink_store::Error::WriteRejected("k".into()).into();
        assert!(matches!(err, Error::Cache(_)));
    }
}
