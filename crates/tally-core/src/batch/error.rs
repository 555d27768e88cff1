//! Error types for batch processing.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a batch as a whole.
///
/// Failures of individual questions never appear here; they become error
/// records in the output.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid batch input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// Result type alias for batch operations.
pub type BatchResult<T> = std::result::Result<T, BatchError>;
