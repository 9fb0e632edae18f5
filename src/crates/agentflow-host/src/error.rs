//! Error types for the host layer.

use agentflow_agents::AgentError;
use thiserror::Error;

/// Convenience result type using [`HostError`].
pub type Result<T> = std::result::Result<T, HostError>;

/// Errors raised by catalogs, session stores, and the host agent.
#[derive(Error, Debug)]
pub enum HostError {
    /// Invalid host configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A factory produced an agent or workflow whose name differs from the
    /// key it was registered under.
    #[error("Factory registered under '{registered}' produced '{actual}'")]
    NameMismatch {
        /// The registration key.
        registered: String,
        /// The name the factory actually produced.
        actual: String,
    },

    /// No agent is registered under this name.
    #[error("No agent registered under '{name}'")]
    UnknownAgent {
        /// The unmatched name.
        name: String,
    },

    /// No workflow is registered under this name.
    #[error("No workflow registered under '{name}'")]
    UnknownWorkflow {
        /// The unmatched name.
        name: String,
    },

    /// The session store failed.
    #[error("Session store error: {0}")]
    Store(String),

    /// An agent operation failed.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// A workflow operation failed.
    #[error(transparent)]
    Workflow(#[from] agentflow_core::WorkflowError),
}

impl HostError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a store error from any displayable failure.
    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::Store(message.to_string())
    }
}
