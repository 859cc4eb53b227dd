//! Error types for pokecache.
//!
//! Library crates use [`PokeCacheError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all pokecache operations.
#[derive(Debug, thiserror::Error)]
pub enum PokeCacheError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to the remote catalog.
    #[error("network error: {0}")]
    Network(String),

    /// The remote catalog has no such resource.
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Malformed payload, either a remote response or a persisted row.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Database or file repository error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid caller input.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The operation was cancelled before it could complete.
    #[error("operation cancelled")]
    Cancelled,

    /// A spawned task panicked or exited without reporting.
    #[error("task error: {0}")]
    Task(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PokeCacheError>;

impl PokeCacheError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create a not-found error naming the missing resource.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
