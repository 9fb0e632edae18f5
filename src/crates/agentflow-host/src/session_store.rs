//! Session stores: persistence of sessions between host invocations.

use crate::error::{HostError, Result};
use agentflow_agents::AgentSession;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Persistence for agent sessions, keyed by agent name and conversation id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the session's serialized form.
    async fn save(
        &self,
        agent_name: &str,
        conversation_id: &str,
        session: &AgentSession,
    ) -> Result<()>;

    /// Load a previously saved session, or `None` when unknown.
    async fn load(&self, agent_name: &str, conversation_id: &str) -> Result<Option<AgentSession>>;
}

/// In-memory session store.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<(String, String), Value>>,
}

impl InMemorySessionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// True when no session is stored.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(
        &self,
        agent_name: &str,
        conversation_id: &str,
        session: &AgentSession,
    ) -> Result<()> {
        let serialized = session.serialize().await?;
        self.sessions.write().await.insert(
            (agent_name.to_string(), conversation_id.to_string()),
            serialized,
        );
        Ok(())
    }

    async fn load(&self, agent_name: &str, conversation_id: &str) -> Result<Option<AgentSession>> {
        let sessions = self.sessions.read().await;
        match sessions.get(&(agent_name.to_string(), conversation_id.to_string())) {
            Some(serialized) => Ok(Some(
                AgentSession::deserialize(serialized.clone()).map_err(HostError::Agent)?,
            )),
            None => Ok(None),
        }
    }
}

/// Store that persists nothing: every load is a miss, every save a discard.
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
    async fn save(
        &self,
        _agent_name: &str,
        _conversation_id: &str,
        _session: &AgentSession,
    ) -> Result<()> {
        Ok(())
    }

    async fn load(
        &self,
        _agent_name: &str,
        _conversation_id: &str,
    ) -> Result<Option<AgentSession>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_agents::{ChatMessage, ChatMessageStore};
    use std::sync::Arc;

    #[tokio::test]
    async fn in_memory_store_round_trips_sessions() {
        let store = InMemorySessionStore::new();

        let message_store = Arc::new(agentflow_agents::InMemoryChatMessageStore::new());
        message_store
            .add_messages(vec![ChatMessage::user("hello")])
            .await
            .unwrap();
        let session = AgentSession::locally_managed(message_store);

        store.save("helper", "conv-1", &session).await.unwrap();
        let loaded = store.load("helper", "conv-1").await.unwrap().unwrap();
        let messages = loaded.message_store().unwrap().messages().await.unwrap();
        assert_eq!(messages[0].text(), "hello");

        assert!(store.load("helper", "conv-2").await.unwrap().is_none());
        assert!(store.load("other", "conv-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn noop_store_discards_saves() {
        let store = NoopSessionStore;
        let session = AgentSession::service_backed("conv-1");
        store.save("helper", "conv-1", &session).await.unwrap();
        assert!(store.load("helper", "conv-1").await.unwrap().is_none());
    }
}
