//! The host agent: an agent plus session persistence hooks.

use crate::error::Result;
use crate::session_store::SessionStore;
use agentflow_agents::{AgentRunResponse, AgentSession, ChatAgent, ChatMessage};
use std::sync::Arc;

/// Wraps any agent with fetch-or-create and save hooks against the
/// configured [`SessionStore`].
pub struct HostAgent {
    agent: Arc<ChatAgent>,
    store: Arc<dyn SessionStore>,
}

impl HostAgent {
    /// Wrap an agent over a session store.
    pub fn new(agent: Arc<ChatAgent>, store: Arc<dyn SessionStore>) -> Self {
        Self { agent, store }
    }

    /// The wrapped agent.
    pub fn inner(&self) -> &Arc<ChatAgent> {
        &self.agent
    }

    /// The wrapped agent's name.
    pub fn name(&self) -> &str {
        self.agent.name()
    }

    /// Fetch the session stored for `conversation_id`, or create a fresh
    /// one.
    pub async fn get_or_create_session(&self, conversation_id: &str) -> Result<AgentSession> {
        Ok(self
            .store
            .load(self.agent.name(), conversation_id)
            .await?
            .unwrap_or_default())
    }

    /// Persist the session's serialized form under `conversation_id`.
    pub async fn save_session(
        &self,
        conversation_id: &str,
        session: &AgentSession,
    ) -> Result<()> {
        self.store
            .save(self.agent.name(), conversation_id, session)
            .await
    }

    /// Convenience: load the session, run the agent, save the session back.
    pub async fn run(
        &self,
        conversation_id: &str,
        input: Vec<ChatMessage>,
    ) -> Result<AgentRunResponse> {
        let mut session = self.get_or_create_session(conversation_id).await?;
        let response = self.agent.run(input, &mut session, None).await?;
        self.save_session(conversation_id, &session).await?;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session_store::{InMemorySessionStore, NoopSessionStore};
    use agentflow_agents::{ChatClient, ChatOptions, ChatResponse};
    use async_trait::async_trait;

    /// Client replying with the number of messages it saw.
    struct CountingClient;

    #[async_trait]
    impl ChatClient for CountingClient {
        async fn respond(
            &self,
            messages: Vec<ChatMessage>,
            _options: &ChatOptions,
        ) -> agentflow_agents::Result<ChatResponse> {
            Ok(ChatResponse::from_text(format!("saw {}", messages.len())))
        }
    }

    fn host_agent(store: Arc<dyn SessionStore>) -> HostAgent {
        let agent = Arc::new(
            ChatAgent::builder("counter", Arc::new(CountingClient))
                .build()
                .unwrap(),
        );
        HostAgent::new(agent, store)
    }

    #[tokio::test]
    async fn sessions_persist_across_runs() {
        let host = host_agent(Arc::new(InMemorySessionStore::new()));

        let first = host
            .run("conv-1", vec![ChatMessage::user("one")])
            .await
            .unwrap();
        assert_eq!(first.text(), "saw 1");

        // Second run sees the stored history: user + reply + new input.
        let second = host
            .run("conv-1", vec![ChatMessage::user("two")])
            .await
            .unwrap();
        assert_eq!(second.text(), "saw 3");

        // Other conversations start clean.
        let other = host
            .run("conv-2", vec![ChatMessage::user("one")])
            .await
            .unwrap();
        assert_eq!(other.text(), "saw 1");
    }

    #[tokio::test]
    async fn noop_store_always_yields_fresh_sessions() {
        let host = host_agent(Arc::new(NoopSessionStore));

        host.run("conv-1", vec![ChatMessage::user("one")])
            .await
            .unwrap();
        let second = host
            .run("conv-1", vec![ChatMessage::user("two")])
            .await
            .unwrap();
        assert_eq!(second.text(), "saw 1");
    }
}
