//! Error types for homelink-store.

use std::path::PathBuf;

/// Result type for homelink-store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in homelink-store.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error from SQLite.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failed to create database directory.
    #[error("Failed to create database directory {path}: {source}")]
    CreateDirectory {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Stored value could not be (de)serialized.
    #[error("Serialization error for key '{key}': {source}")]
    Serialization {
        key: String,
        source: serde_json::Error,
    },

    /// The blocking worker running a database call panicked or was cancelled.
    #[error("Storage worker failed: {0}")]
    Worker(String),

    /// The cache file was written with a schema this build does not know.
    #[error("Unsupported cache schema version {found} (this build supports {supported})")]
    UnsupportedSchema { found: i32, supported: i32 },

    /// Write rejected by an injected failure (test stores only).
    #[error("Write to '{0}' rejected")]
    WriteRejected(String),
}
