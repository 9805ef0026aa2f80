//! Error types for the runtime crate.

use courier_persistence::PersistenceError;
use courier_queue::QueueError;
use thiserror::Error;

/// Errors that can occur in the runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Queue error.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Persistence error.
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Failed to start the agent process.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Delivery error.
    #[error("delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl RuntimeError {
    /// Returns true for errors that stop the worker from claiming new work.
    pub fn is_fatal(&self) -> bool {
        match self {
            RuntimeError::Queue(e) => !e.is_transient(),
            RuntimeError::Persistence(e) => !e.is_transient(),
            RuntimeError::InvalidConfig(_) => true,
            RuntimeError::Spawn { .. } | RuntimeError::Delivery(_) => false,
        }
    }
}

/// Errors reported by a channel's delivery collaborator.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The destination refused the message.
    #[error("rejected by destination: {0}")]
    Rejected(String),

    /// The destination could not be reached.
    #[error("destination unreachable: {0}")]
    Unreachable(String),

    /// The event carries no address for this channel.
    #[error("event has no delivery target: {0}")]
    MissingTarget(String),

    /// Local outbox write failed.
    #[error("outbox error: {0}")]
    Outbox(#[from] PersistenceError),
}

/// Result type for runtime operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;
