//! Error types for workflow construction and execution.
//!
//! All errors implement `std::error::Error` via `thiserror`. Construction
//! problems surface as [`WorkflowError::Configuration`] at build time;
//! execution problems either fail a message route ([`WorkflowError::Routing`])
//! or a single handler ([`WorkflowError::Handler`]), which the scheduler
//! reports through `ExecutorFailed` / `WorkflowFailed` events rather than by
//! crashing the run loop.

use thiserror::Error;

/// Convenience result type using [`WorkflowError`].
pub type Result<T> = std::result::Result<T, WorkflowError>;

/// Errors raised by the workflow graph and its scheduler.
#[derive(Error, Debug)]
pub enum WorkflowError {
    /// A message could not be routed.
    ///
    /// Raised for unregistered executors, a directed send whose target does
    /// not declare the payload's type, or a decode of an unknown type id.
    #[error("Routing error: {0}")]
    Routing(String),

    /// Invalid graph or runtime configuration, raised at build time.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message handler failed.
    ///
    /// The scheduler discards the faulting handler's buffered effects, emits
    /// `ExecutorFailed` followed by `WorkflowFailed`, and terminates the run.
    #[error("Executor '{executor_id}' failed: {message}")]
    Handler {
        /// Executor whose handler raised the fault.
        executor_id: String,
        /// Error description from the handler.
        message: String,
    },

    /// Cooperative cancellation was observed.
    ///
    /// Never suppressed: a handler that observes cancellation returns this
    /// error and the run terminates `Cancelled` at the superstep boundary.
    #[error("Run cancelled")]
    Cancelled,

    /// Checkpoint persistence failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] agentflow_checkpoint::CheckpointError),

    /// A payload could not be serialized or deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A response was provided for an external request the run does not know.
    #[error("Unknown external request '{request_id}'")]
    UnknownRequest {
        /// The unmatched request identifier.
        request_id: String,
    },
}

impl WorkflowError {
    /// Create a routing error.
    pub fn routing(message: impl Into<String>) -> Self {
        Self::Routing(message.into())
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a handler fault with executor context.
    pub fn handler(executor_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            executor_id: executor_id.into(),
            message: message.into(),
        }
    }

    /// True when the error is the cooperative cancellation marker.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
