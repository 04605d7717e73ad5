//! Error types for graph-state

use thiserror::Error;

/// Errors raised by checkpoint and memory-store implementations.
#[derive(Error, Debug)]
pub enum StateError {
    /// A store namespace must contain at least one non-empty label
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(Vec<String>),

    /// Checkpoint lookup by id failed
    #[error("checkpoint {checkpoint_id} not found for thread {thread_id}")]
    CheckpointNotFound {
        thread_id: String,
        checkpoint_id: String,
    },

    /// Backend-specific failure (connection, query, ...)
    #[error("backend error: {0}")]
    Backend(String),

    /// Serialization error
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for graph-state operations
pub type StateResult<T> = std::result::Result<T, StateError>;
