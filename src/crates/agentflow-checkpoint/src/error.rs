//! Error types for checkpoint persistence.

use thiserror::Error;

/// Convenience result type using [`CheckpointError`].
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors raised while saving, loading, or decoding checkpoints.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// The storage backend failed (connection lost, disk full, ...).
    #[error("Checkpoint storage error: {0}")]
    Storage(String),

    /// A checkpoint could not be serialized or deserialized.
    #[error("Checkpoint serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No checkpoint exists for the requested run.
    #[error("No checkpoint found for run '{run_id}'")]
    NotFound {
        /// Run identifier that was looked up.
        run_id: String,
    },
}

impl CheckpointError {
    /// Create a storage error from any displayable backend failure.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}
