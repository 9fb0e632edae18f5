//! Per-conversation session state.
//!
//! An [`AgentSession`] carries conversation state across runs under exactly
//! one of two disciplines: **service-backed**, holding an opaque
//! conversation id owned by the remote AI service, or **locally managed**,
//! owning a [`ChatMessageStore`] that keeps the chat history in-process.
//! The first use pins the discipline; setting the other afterwards is a
//! configuration error and mutates nothing.
//!
//! A session also carries a state bag: a map keyed by unique provider state
//! keys, used by context and history providers to persist their own state
//! across serialize/deserialize.
//!
//! # Serialized form
//!
//! A JSON object with exactly one of:
//!
//! ```json
//! { "conversationId": "conv-42" }
//! { "storeState": { "messages": [...], "<stateKey>": ... } }
//! ```
//!
//! Mixing both keys, a non-object, or an unknown shape is a hard error at
//! deserialize time.

use crate::error::{AgentError, Result};
use crate::messages::ChatMessage;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

const CONVERSATION_ID_KEY: &str = "conversationId";
const STORE_STATE_KEY: &str = "storeState";
const MESSAGES_KEY: &str = "messages";

/// Storage backing a session's chat history between runs.
#[async_trait]
pub trait ChatMessageStore: Send + Sync {
    /// All stored messages, in insertion order.
    async fn messages(&self) -> Result<Vec<ChatMessage>>;

    /// Append messages to the history.
    async fn add_messages(&self, messages: Vec<ChatMessage>) -> Result<()>;

    /// Serialize the store's state for session persistence.
    async fn serialize_state(&self) -> Result<Value>;
}

/// Default in-process message store.
#[derive(Default)]
pub struct InMemoryChatMessageStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl InMemoryChatMessageStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store restored from a serialized message array.
    pub fn from_state(state: &Value) -> Result<Self> {
        let messages: Vec<ChatMessage> = serde_json::from_value(state.clone())
            .map_err(|err| AgentError::serialization(format!("invalid message store state: {err}")))?;
        Ok(Self {
            messages: RwLock::new(messages),
        })
    }

    fn lock_read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ChatMessage>> {
        self.messages.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ChatMessageStore for InMemoryChatMessageStore {
    async fn messages(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.lock_read().clone())
    }

    async fn add_messages(&self, messages: Vec<ChatMessage>) -> Result<()> {
        self.messages
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend(messages);
        Ok(())
    }

    async fn serialize_state(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.lock_read())?)
    }
}

/// The storage discipline of a session.
#[derive(Clone, Default)]
pub enum SessionStorage {
    /// No discipline chosen yet.
    #[default]
    Unset,
    /// Conversation state lives in the remote service.
    ServiceBacked {
        /// Opaque id assigned by the service.
        conversation_id: String,
    },
    /// Conversation state lives in a local message store.
    LocallyManaged {
        /// The owning store.
        store: Arc<dyn ChatMessageStore>,
    },
}

impl std::fmt::Debug for SessionStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unset => f.write_str("Unset"),
            Self::ServiceBacked { conversation_id } => f
                .debug_struct("ServiceBacked")
                .field("conversation_id", conversation_id)
                .finish(),
            Self::LocallyManaged { .. } => f.write_str("LocallyManaged"),
        }
    }
}

/// Per-conversation state carried across agent runs.
#[derive(Debug, Default, Clone)]
pub struct AgentSession {
    storage: SessionStorage,
    state_bag: serde_json::Map<String, Value>,
}

impl AgentSession {
    /// Fresh session with no discipline chosen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session continuing a service-side conversation.
    pub fn service_backed(conversation_id: impl Into<String>) -> Self {
        Self {
            storage: SessionStorage::ServiceBacked {
                conversation_id: conversation_id.into(),
            },
            state_bag: serde_json::Map::new(),
        }
    }

    /// Session owning a local message store.
    pub fn locally_managed(store: Arc<dyn ChatMessageStore>) -> Self {
        Self {
            storage: SessionStorage::LocallyManaged { store },
            state_bag: serde_json::Map::new(),
        }
    }

    /// The current storage discipline.
    pub fn storage(&self) -> &SessionStorage {
        &self.storage
    }

    /// The service conversation id, when service-backed.
    pub fn conversation_id(&self) -> Option<&str> {
        match &self.storage {
            SessionStorage::ServiceBacked { conversation_id } => Some(conversation_id),
            _ => None,
        }
    }

    /// The local message store, when locally managed.
    pub fn message_store(&self) -> Option<Arc<dyn ChatMessageStore>> {
        match &self.storage {
            SessionStorage::LocallyManaged { store } => Some(store.clone()),
            _ => None,
        }
    }

    /// Pin the session to the service-backed discipline.
    ///
    /// Fails without mutating anything when the session already owns a
    /// local message store.
    pub fn set_conversation_id(&mut self, conversation_id: impl Into<String>) -> Result<()> {
        if matches!(self.storage, SessionStorage::LocallyManaged { .. }) {
            return Err(AgentError::configuration(
                "session already owns a local message store; cannot also reference a service conversation",
            ));
        }
        self.storage = SessionStorage::ServiceBacked {
            conversation_id: conversation_id.into(),
        };
        Ok(())
    }

    /// Pin the session to the locally-managed discipline.
    ///
    /// Fails without mutating anything when the session already references
    /// a service conversation.
    pub fn set_message_store(&mut self, store: Arc<dyn ChatMessageStore>) -> Result<()> {
        if matches!(self.storage, SessionStorage::ServiceBacked { .. }) {
            return Err(AgentError::configuration(
                "session already references a service conversation; cannot also own a local message store",
            ));
        }
        self.storage = SessionStorage::LocallyManaged { store };
        Ok(())
    }

    /// Read a provider's state from the state bag.
    pub fn get_state(&self, state_key: &str) -> Option<&Value> {
        self.state_bag.get(state_key)
    }

    /// Write a provider's state into the state bag.
    pub fn set_state(&mut self, state_key: impl Into<String>, value: Value) {
        self.state_bag.insert(state_key.into(), value);
    }

    /// Remove a provider's state from the state bag.
    pub fn remove_state(&mut self, state_key: &str) -> Option<Value> {
        self.state_bag.remove(state_key)
    }

    /// Serialize the session to its wire form.
    pub async fn serialize(&self) -> Result<Value> {
        let mut object = serde_json::Map::new();
        match &self.storage {
            SessionStorage::Unset => {}
            SessionStorage::ServiceBacked { conversation_id } => {
                object.insert(
                    CONVERSATION_ID_KEY.to_string(),
                    Value::String(conversation_id.clone()),
                );
            }
            SessionStorage::LocallyManaged { store } => {
                let mut store_state = serde_json::Map::new();
                store_state.insert(MESSAGES_KEY.to_string(), store.serialize_state().await?);
                for (state_key, value) in &self.state_bag {
                    store_state.insert(state_key.clone(), value.clone());
                }
                object.insert(STORE_STATE_KEY.to_string(), Value::Object(store_state));
            }
        }
        Ok(Value::Object(object))
    }

    /// Deserialize a session from its wire form. Raises synchronously on a
    /// non-object, on mixed discipline keys, or on an unknown shape.
    pub fn deserialize(value: Value) -> Result<AgentSession> {
        let Value::Object(object) = value else {
            return Err(AgentError::serialization("session state must be a JSON object"));
        };

        let has_conversation = object.contains_key(CONVERSATION_ID_KEY);
        let has_store = object.contains_key(STORE_STATE_KEY);
        if has_conversation && has_store {
            return Err(AgentError::serialization(
                "session state must not mix 'conversationId' and 'storeState'",
            ));
        }
        if let Some(unknown) = object
            .keys()
            .find(|key| *key != CONVERSATION_ID_KEY && *key != STORE_STATE_KEY)
        {
            return Err(AgentError::serialization(format!(
                "unknown session state key '{unknown}'"
            )));
        }

        if has_conversation {
            let conversation_id = object[CONVERSATION_ID_KEY].as_str().ok_or_else(|| {
                AgentError::serialization("'conversationId' must be a string")
            })?;
            return Ok(AgentSession::service_backed(conversation_id));
        }

        if has_store {
            let Some(Value::Object(store_state)) = object.get(STORE_STATE_KEY) else {
                return Err(AgentError::serialization("'storeState' must be a JSON object"));
            };
            let messages_state = store_state
                .get(MESSAGES_KEY)
                .cloned()
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let store = InMemoryChatMessageStore::from_state(&messages_state)?;
            let mut session = AgentSession::locally_managed(Arc::new(store));
            for (state_key, value) in store_state {
                if state_key != MESSAGES_KEY {
                    session.set_state(state_key.clone(), value.clone());
                }
            }
            return Ok(session);
        }

        Ok(AgentSession::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ChatRole, Content};

    #[tokio::test]
    async fn discipline_is_exclusive_in_both_orders() {
        let mut session = AgentSession::new();
        session.set_conversation_id("conv-1").unwrap();
        let err = session
            .set_message_store(Arc::new(InMemoryChatMessageStore::new()))
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        // The failed set left the discipline untouched.
        assert_eq!(session.conversation_id(), Some("conv-1"));

        let mut session = AgentSession::new();
        session
            .set_message_store(Arc::new(InMemoryChatMessageStore::new()))
            .unwrap();
        let err = session.set_conversation_id("conv-2").unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
        assert!(session.message_store().is_some());
    }

    #[tokio::test]
    async fn service_backed_round_trip_keeps_the_id_and_no_messages() {
        let session = AgentSession::service_backed("conv-42");
        let wire = session.serialize().await.unwrap();
        assert_eq!(wire, serde_json::json!({ "conversationId": "conv-42" }));

        let back = AgentSession::deserialize(wire).unwrap();
        assert_eq!(back.conversation_id(), Some("conv-42"));
        assert!(back.message_store().is_none());
    }

    #[tokio::test]
    async fn locally_managed_round_trip_preserves_messages_and_state() {
        let store = Arc::new(InMemoryChatMessageStore::new());
        store
            .add_messages(vec![
                ChatMessage::user("hi"),
                ChatMessage::from_contents(
                    ChatRole::Assistant,
                    vec![
                        Content::text("calling"),
                        Content::function_call("lookup", "c1", serde_json::json!({"q": 1})),
                    ],
                )
                .with_author_name("helper"),
            ])
            .await
            .unwrap();

        let mut session = AgentSession::locally_managed(store);
        session.set_state("memory", serde_json::json!({"facts": ["a"]}));

        let wire = session.serialize().await.unwrap();
        let back = AgentSession::deserialize(wire).unwrap();

        let messages = back.message_store().unwrap().messages().await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].author_name.as_deref(), Some("helper"));
        assert_eq!(
            serde_json::to_value(&messages[1].contents[1]).unwrap()["type"],
            "function_call"
        );
        assert_eq!(back.get_state("memory").unwrap()["facts"][0], "a");
    }

    #[test]
    fn mixed_keys_are_a_hard_error() {
        let err = AgentSession::deserialize(serde_json::json!({
            "conversationId": "conv-1",
            "storeState": { "messages": [] }
        }))
        .unwrap_err();
        assert!(matches!(err, AgentError::Serialization(_)));
    }

    #[test]
    fn non_object_state_is_a_hard_error() {
        let err = AgentSession::deserialize(serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, AgentError::Serialization(_)));
    }

    #[test]
    fn unknown_keys_are_a_hard_error() {
        let err =
            AgentSession::deserialize(serde_json::json!({ "threadId": "t" })).unwrap_err();
        assert!(matches!(err, AgentError::Serialization(_)));
    }
}
