//! Error types for data parsing in homelink-types.

use thiserror::Error;

/// Errors that can occur when parsing homelink field values.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// A schedule time was not in `HH:MM` 24-hour form.
    #[error("Invalid schedule time '{0}': expected HH:MM (24h)")]
    InvalidTime(String),

    /// A weekday token was not one of `Mon`..`Sun`.
    #[error("Invalid weekday '{0}'")]
    InvalidWeekday(String),

    /// A schedule action was not `ON` or `OFF`.
    #[error("Invalid action '{0}': expected ON or OFF")]
    InvalidAction(String),
}

/// Result type alias using homelink-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;
