//! Error types for the orchestration actor runtime and conversation cache.

use thiserror::Error;

/// Convenience result type using [`OrchestrationError`].
pub type Result<T> = std::result::Result<T, OrchestrationError>;

/// Errors raised by orchestrations and the conversation cache.
#[derive(Error, Debug)]
pub enum OrchestrationError {
    /// Invalid orchestration configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An item with this id already exists in the conversation.
    #[error("Duplicate item id '{id}'")]
    DuplicateItem {
        /// The rejected id.
        id: String,
    },

    /// The conversation is not cached.
    #[error("Unknown conversation '{id}'")]
    UnknownConversation {
        /// The missing conversation id.
        id: String,
    },

    /// An argument was out of range or referenced nothing.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The orchestration ended before producing a result.
    #[error("Orchestration channel closed before a result was produced")]
    ChannelClosed,

    /// An agent failed while producing its turn.
    #[error("Agent error: {0}")]
    Agent(#[from] agentflow_agents::AgentError),
}

impl OrchestrationError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}
