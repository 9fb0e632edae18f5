//! Durable session state and its store abstraction.
//!
//! One [`DurableSessionState`] exists per `(agentName, sessionKey)` pair: an
//! append-only conversation log of correlated requests and responses plus
//! the expiration metadata driving TTL eviction. The state is owned
//! exclusively by its entity; callers interact only through entity
//! operations.

use crate::error::Result;
use agentflow_agents::ChatMessage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Identity of a durable session entity.
///
/// Agent names compare case-insensitively; the id normalizes on
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionEntityId {
    /// Owning agent's name, lowercased.
    pub agent_name: String,
    /// Caller-chosen session key.
    pub session_key: String,
}

impl SessionEntityId {
    /// Create an entity id.
    pub fn new(agent_name: impl Into<String>, session_key: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into().to_lowercase(),
            session_key: session_key.into(),
        }
    }
}

impl fmt::Display for SessionEntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.agent_name, self.session_key)
    }
}

/// One half of a correlated exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LogPart {
    /// Caller-provided request messages.
    Request {
        /// The request messages.
        messages: Vec<ChatMessage>,
    },
    /// The agent's response messages.
    Response {
        /// The response messages.
        messages: Vec<ChatMessage>,
    },
}

/// One entry of the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Client-supplied correlation id deduplicating requests.
    pub correlation_id: String,
    /// Request or response payload.
    pub part: LogPart,
}

/// The persisted state of one session entity.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DurableSessionState {
    /// Append-only conversation log.
    pub log: Vec<LogEntry>,
    /// When the session expires; `None` while TTL is disabled.
    pub expiration_time_utc: Option<DateTime<Utc>>,
    /// Whether a deletion self-signal chain is already running.
    pub eviction_scheduled: bool,
}

impl DurableSessionState {
    /// The full conversation, log order preserved.
    pub fn conversation_messages(&self) -> Vec<ChatMessage> {
        self.log
            .iter()
            .flat_map(|entry| match &entry.part {
                LogPart::Request { messages } | LogPart::Response { messages } => {
                    messages.iter().cloned()
                }
            })
            .collect()
    }

    /// True when a request with this correlation id was already appended.
    pub fn has_request(&self, correlation_id: &str) -> bool {
        self.log.iter().any(|entry| {
            entry.correlation_id == correlation_id
                && matches!(entry.part, LogPart::Request { .. })
        })
    }

    /// The stored response for a correlation id, if the exchange completed.
    pub fn response_for(&self, correlation_id: &str) -> Option<Vec<ChatMessage>> {
        self.log.iter().find_map(|entry| {
            if entry.correlation_id != correlation_id {
                return None;
            }
            match &entry.part {
                LogPart::Response { messages } => Some(messages.clone()),
                LogPart::Request { .. } => None,
            }
        })
    }
}

/// Persistence backend for durable session state.
#[async_trait]
pub trait DurableStateStore: Send + Sync {
    /// Load an entity's state, or `None` when it does not exist.
    async fn load(&self, id: &SessionEntityId) -> Result<Option<DurableSessionState>>;

    /// Persist an entity's state.
    async fn save(&self, id: &SessionEntityId, state: &DurableSessionState) -> Result<()>;

    /// Delete an entity's state atomically. Deleting a missing entity is a
    /// no-op.
    async fn delete(&self, id: &SessionEntityId) -> Result<()>;
}

/// In-memory state store for development and tests.
#[derive(Clone, Default)]
pub struct InMemoryDurableStateStore {
    states: Arc<RwLock<HashMap<SessionEntityId, DurableSessionState>>>,
}

impl InMemoryDurableStateStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the entity currently has state.
    pub async fn contains(&self, id: &SessionEntityId) -> bool {
        self.states.read().await.contains_key(id)
    }

    /// Number of stored entities.
    pub async fn len(&self) -> usize {
        self.states.read().await.len()
    }

    /// True when no entity has state.
    pub async fn is_empty(&self) -> bool {
        self.states.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStateStore for InMemoryDurableStateStore {
    async fn load(&self, id: &SessionEntityId) -> Result<Option<DurableSessionState>> {
        Ok(self.states.read().await.get(id).cloned())
    }

    async fn save(&self, id: &SessionEntityId, state: &DurableSessionState) -> Result<()> {
        self.states.write().await.insert(id.clone(), state.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionEntityId) -> Result<()> {
        self.states.write().await.remove(id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_ids_normalize_agent_names() {
        assert_eq!(
            SessionEntityId::new("Scribe", "user-1"),
            SessionEntityId::new("scribe", "user-1")
        );
        assert_ne!(
            SessionEntityId::new("scribe", "user-1"),
            SessionEntityId::new("scribe", "User-1")
        );
    }

    #[test]
    fn log_queries_distinguish_requests_and_responses() {
        let mut state = DurableSessionState::default();
        state.log.push(LogEntry {
            correlation_id: "c1".into(),
            part: LogPart::Request {
                messages: vec![ChatMessage::user("q")],
            },
        });

        assert!(state.has_request("c1"));
        assert!(state.response_for("c1").is_none());

        state.log.push(LogEntry {
            correlation_id: "c1".into(),
            part: LogPart::Response {
                messages: vec![ChatMessage::assistant("a")],
            },
        });
        assert_eq!(state.response_for("c1").unwrap()[0].text(), "a");
        assert_eq!(state.conversation_messages().len(), 2);
    }

    #[test]
    fn state_round_trips_through_json() {
        let mut state = DurableSessionState::default();
        state.log.push(LogEntry {
            correlation_id: "c1".into(),
            part: LogPart::Request {
                messages: vec![ChatMessage::user("q")],
            },
        });
        state.expiration_time_utc = Some(Utc::now());

        let json = serde_json::to_string(&state).unwrap();
        let back: DurableSessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(back.log, state.log);
        assert_eq!(back.expiration_time_utc, state.expiration_time_utc);
    }
}
