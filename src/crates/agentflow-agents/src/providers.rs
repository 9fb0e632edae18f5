//! Context and chat-history providers.
//!
//! Providers are pluggable hooks around each agent invocation. A
//! [`ChatHistoryProvider`] owns the merge of stored history with new input;
//! [`ContextProvider`]s then each get a chance to rewrite the accumulated
//! [`AiContext`] (instructions, messages, tools) before the chat client is
//! called. After the call, providers are notified of success or failure and
//! persist whatever they need through the session's state bag, under their
//! unique state key.

use crate::client::ToolDefinition;
use crate::error::{AgentError, Result};
use crate::messages::ChatMessage;
use crate::session::{AgentSession, InMemoryChatMessageStore};
use async_trait::async_trait;
use std::sync::Arc;

/// The accumulated request context flowing through the provider pipeline.
#[derive(Debug, Clone, Default)]
pub struct AiContext {
    /// Effective system instructions.
    pub instructions: Option<String>,
    /// Messages to send to the model.
    pub messages: Vec<ChatMessage>,
    /// Tools to offer the model.
    pub tools: Vec<ToolDefinition>,
}

/// Pre/post hook around an agent invocation.
///
/// Each provider has a unique `state_key`, its namespace inside the
/// session's state bag.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    /// Unique key for this provider's persisted state.
    fn state_key(&self) -> &str;

    /// Rewrite the accumulated context before the chat request.
    async fn invoking(&self, session: &mut AgentSession, context: AiContext) -> Result<AiContext>;

    /// Called after a successful chat request with the request and response
    /// messages; persist state through the session here.
    async fn on_success(
        &self,
        _session: &mut AgentSession,
        _request: &[ChatMessage],
        _response: &[ChatMessage],
    ) -> Result<()> {
        Ok(())
    }

    /// Called after a failed chat request. Implementations must leave the
    /// state bag consistent (no partial append).
    async fn on_failure(&self, _session: &mut AgentSession, _error: &AgentError) -> Result<()> {
        Ok(())
    }
}

/// Owner of the chat-history merge for locally managed sessions.
#[async_trait]
pub trait ChatHistoryProvider: Send + Sync {
    /// Unique key for this provider's persisted state.
    fn state_key(&self) -> &str;

    /// Produce the merged message sequence (stored history followed by the
    /// new input messages).
    async fn provide(
        &self,
        session: &mut AgentSession,
        input: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>>;

    /// Called after a successful chat request; persists the new exchange.
    async fn on_success(
        &self,
        session: &mut AgentSession,
        request: &[ChatMessage],
        response: &[ChatMessage],
    ) -> Result<()>;

    /// Called after a failed chat request. Must not partially append.
    async fn on_failure(&self, _session: &mut AgentSession, _error: &AgentError) -> Result<()> {
        Ok(())
    }
}

/// Default history provider over the session's local message store.
///
/// Installs an [`InMemoryChatMessageStore`] on first use; refuses to operate
/// on a service-backed session, where history belongs to the remote service.
#[derive(Debug, Default)]
pub struct InMemoryHistoryProvider {
    state_key: String,
}

impl InMemoryHistoryProvider {
    /// Provider with the default state key.
    pub fn new() -> Self {
        Self {
            state_key: "chat_history".to_string(),
        }
    }

    /// Provider with an explicit state key.
    pub fn with_state_key(state_key: impl Into<String>) -> Self {
        Self {
            state_key: state_key.into(),
        }
    }

    fn ensure_store(&self, session: &mut AgentSession) -> Result<Arc<dyn crate::session::ChatMessageStore>> {
        if session.conversation_id().is_some() {
            return Err(AgentError::configuration(
                "a chat-history provider cannot be used with a service-backed session",
            ));
        }
        if let Some(store) = session.message_store() {
            return Ok(store);
        }
        let store: Arc<dyn crate::session::ChatMessageStore> =
            Arc::new(InMemoryChatMessageStore::new());
        session.set_message_store(store.clone())?;
        Ok(store)
    }
}

#[async_trait]
impl ChatHistoryProvider for InMemoryHistoryProvider {
    fn state_key(&self) -> &str {
        &self.state_key
    }

    async fn provide(
        &self,
        session: &mut AgentSession,
        input: Vec<ChatMessage>,
    ) -> Result<Vec<ChatMessage>> {
        let store = self.ensure_store(session)?;
        let mut merged = store.messages().await?;
        merged.extend(input);
        Ok(merged)
    }

    async fn on_success(
        &self,
        session: &mut AgentSession,
        request: &[ChatMessage],
        response: &[ChatMessage],
    ) -> Result<()> {
        let store = self.ensure_store(session)?;
        let mut exchange = request.to_vec();
        exchange.extend(response.to_vec());
        store.add_messages(exchange).await
    }
}

/// Validate that every provider state key on an agent is unique.
pub(crate) fn validate_state_keys<'a>(keys: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for key in keys {
        if key.is_empty() {
            return Err(AgentError::configuration("provider state key must not be empty"));
        }
        if key == "messages" {
            return Err(AgentError::configuration(
                "provider state key 'messages' is reserved for session serialization",
            ));
        }
        if !seen.insert(key) {
            return Err(AgentError::configuration(format!(
                "duplicate provider state key '{key}'"
            )));
        }
    }
    Ok(())
}
