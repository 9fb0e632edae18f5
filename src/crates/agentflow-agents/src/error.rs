//! Error types for agents, sessions, and providers.

use thiserror::Error;

/// Convenience result type using [`AgentError`].
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by agents and their collaborators.
#[derive(Error, Debug)]
pub enum AgentError {
    /// Invalid agent, session, or composition configuration.
    ///
    /// Raised at construction time: duplicate provider state keys, mixed
    /// session disciplines, invalid handoff registrations, iteration caps
    /// below one.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The chat client failed.
    #[error("Chat client error: {0}")]
    Client(String),

    /// Session state could not be serialized or deserialized.
    #[error("Session serialization error: {0}")]
    Serialization(String),

    /// A context or history provider failed.
    #[error("Provider '{state_key}' failed: {message}")]
    Provider {
        /// State key of the failing provider.
        state_key: String,
        /// Failure description.
        message: String,
    },
}

impl AgentError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a chat client error from any displayable failure.
    pub fn client(message: impl std::fmt::Display) -> Self {
        Self::Client(message.to_string())
    }

    /// Create a serialization error from any displayable failure.
    pub fn serialization(message: impl std::fmt::Display) -> Self {
        Self::Serialization(message.to_string())
    }

    /// Create a provider error with its state key.
    pub fn provider(state_key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Provider {
            state_key: state_key.into(),
            message: message.to_string(),
        }
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err)
    }
}
