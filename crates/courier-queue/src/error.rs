//! Error types for event queue operations.

use std::path::PathBuf;

use courier_persistence::PersistenceError;
use thiserror::Error;

/// Errors that can occur during event queue operations.
#[derive(Error, Debug)]
pub enum QueueError {
    /// Persistence error.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Event id cannot be used as a storage key.
    #[error("invalid event id: {0}")]
    InvalidId(String),

    /// Another consumer already holds the queue.
    #[error("another consumer is active (pid {pid})")]
    ConsumerActive { pid: u32 },

    /// Failed to create or inspect the consumer lock file.
    #[error("consumer lock error at {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl QueueError {
    /// Returns true for storage failures that are safe to retry.
    pub fn is_transient(&self) -> bool {
        match self {
            QueueError::Persistence(e) => e.is_transient(),
            QueueError::Lock { .. } => true,
            QueueError::InvalidId(_) | QueueError::ConsumerActive { .. } => false,
        }
    }
}

/// Result type alias for event queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
