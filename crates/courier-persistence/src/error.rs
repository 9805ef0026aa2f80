//! Error types for persistence operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Failed to read from file system.
    #[error("failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write to file system.
    #[error("failed to write {path}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or deserialize JSON.
    #[error("failed to serialize: {0}")]
    SerializeError(#[from] serde_json::Error),

    /// Failed to create directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A create-only write found the target already present.
    #[error("already exists: {path}")]
    AlreadyExists { path: PathBuf },

    /// Invalid data.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl PersistenceError {
    /// Returns true for failures that may succeed on retry (I/O, not data).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PersistenceError::ReadError { .. }
                | PersistenceError::WriteError { .. }
                | PersistenceError::DirectoryError { .. }
        )
    }
}

/// Result type alias for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
