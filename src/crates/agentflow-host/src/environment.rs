//! The host environment: explicit capabilities for factories.
//!
//! Factories receive a [`HostEnvironment`] instead of reaching into a
//! service locator. It holds exactly the capabilities an agent or workflow
//! needs at construction time: the chat client, the session store, and the
//! durable payload type registry.

use crate::session_store::{NoopSessionStore, SessionStore};
use agentflow_agents::ChatClient;
use agentflow_core::MessageTypeRegistry;
use std::sync::Arc;

/// Capabilities handed to agent and workflow factories.
#[derive(Clone)]
pub struct HostEnvironment {
    chat_client: Arc<dyn ChatClient>,
    session_store: Arc<dyn SessionStore>,
    type_registry: Arc<MessageTypeRegistry>,
}

impl HostEnvironment {
    /// Environment with the given chat client, a no-op session store, and an
    /// empty type registry.
    pub fn new(chat_client: Arc<dyn ChatClient>) -> Self {
        Self {
            chat_client,
            session_store: Arc::new(NoopSessionStore),
            type_registry: Arc::new(MessageTypeRegistry::new()),
        }
    }

    /// Replace the session store.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.session_store = store;
        self
    }

    /// Replace the durable payload type registry.
    pub fn with_type_registry(mut self, registry: Arc<MessageTypeRegistry>) -> Self {
        self.type_registry = registry;
        self
    }

    /// The chat client.
    pub fn chat_client(&self) -> Arc<dyn ChatClient> {
        self.chat_client.clone()
    }

    /// The session store.
    pub fn session_store(&self) -> Arc<dyn SessionStore> {
        self.session_store.clone()
    }

    /// The durable payload type registry.
    pub fn type_registry(&self) -> Arc<MessageTypeRegistry> {
        self.type_registry.clone()
    }
}
