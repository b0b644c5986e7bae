//! Error types for snapcache

use std::io;
use thiserror::Error;

/// Result type for snapcache operations
pub type Result<T> = std::result::Result<T, SnapError>;

/// Errors that can occur in snapcache
#[derive(Debug, Error)]
pub enum SnapError {
    /// Cache I/O error (directory creation, file read/write)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Upstream unreachable or failed mid-exchange
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    /// Persisted header file could not be parsed
    #[error("Invalid header file {path}: {reason}")]
    InvalidHeaderFile {
        /// File that failed to parse
        path: String,
        /// What was wrong with it
        reason: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound request could not be processed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
