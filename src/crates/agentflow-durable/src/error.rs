//! Error types for durable session entities.

use agentflow_agents::AgentError;
use thiserror::Error;

/// Convenience result type using [`DurableError`].
pub type Result<T> = std::result::Result<T, DurableError>;

/// Errors raised by the durable session layer.
#[derive(Error, Debug)]
pub enum DurableError {
    /// Invalid durable configuration (e.g. a signal delay above the cap).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No agent is registered under the entity's agent name.
    #[error("Agent '{name}' is not registered")]
    AgentNotRegistered {
        /// The unregistered agent name.
        name: String,
    },

    /// The durable state store failed.
    #[error("Durable state store error: {0}")]
    Store(String),

    /// The agent failed while producing the response.
    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl DurableError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a store error from any displayable failure.
    pub fn store(message: impl std::fmt::Display) -> Self {
        Self::Store(message.to_string())
    }
}
