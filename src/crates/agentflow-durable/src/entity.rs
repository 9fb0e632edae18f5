//! The durable session entity and its host.
//!
//! One entity exists per [`SessionEntityId`]. Its two operations are
//! `run` (idempotent on the request's correlation id) and
//! `check_and_delete_if_expired` (the handler behind TTL self-signals).
//! [`DurableSessionHost`] provides the guarantees the operations rely on:
//! per-entity serialization of operations, and timer-backed delivery of
//! deferred self-signals.
//!
//! Durable runs are not externally cancellable; a caller that gives up
//! simply stops awaiting, the entity still completes and persists.

use crate::clock::{Clock, SystemClock};
use crate::error::{DurableError, Result};
use crate::options::DurableSessionOptions;
use crate::state::{DurableSessionState, DurableStateStore, LogEntry, LogPart, SessionEntityId};
use agentflow_agents::{AgentSession, ChatMessage, ChatOptions, ChatResponseUpdate};
use agentflow_host::{AgentCatalog, HostEnvironment, HostError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A request to a durable session entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Client-supplied id deduplicating retries and correlating responses.
    pub correlation_id: String,
    /// New input messages; an empty list makes the run a no-op.
    pub messages: Vec<ChatMessage>,
    /// Desired response format (provider-shaped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    /// Whether the agent may call tools this run.
    pub enable_tool_calls: bool,
    /// When set, restricts tool calling to the named tools.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_tool_names: Option<Vec<String>>,
    /// Id of an enclosing orchestration, when one initiated the run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub orchestration_id: Option<String>,
}

impl RunRequest {
    /// Request with tool calling enabled and no format constraints.
    pub fn new(correlation_id: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            messages,
            response_format: None,
            enable_tool_calls: true,
            enabled_tool_names: None,
            orchestration_id: None,
        }
    }
}

/// A durable entity's response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunResponse {
    /// Name of the agent that produced the response.
    pub agent_name: String,
    /// The response messages; empty for an empty request.
    pub messages: Vec<ChatMessage>,
}

/// Sink receiving streamed response updates while a durable run executes.
pub type StreamingSink = Arc<dyn Fn(&ChatResponseUpdate) + Send + Sync>;

struct HostInner {
    store: Arc<dyn DurableStateStore>,
    catalog: Arc<AgentCatalog>,
    environment: HostEnvironment,
    options: DurableSessionOptions,
    clock: Arc<dyn Clock>,
    locks: Mutex<HashMap<SessionEntityId, Arc<Mutex<()>>>>,
}

/// In-process host for durable session entities.
///
/// Serializes all operations per entity id and delivers scheduled
/// self-signals after any in-flight run returns, matching the guarantees a
/// durable-task backend would provide.
#[derive(Clone)]
pub struct DurableSessionHost {
    inner: Arc<HostInner>,
}

impl DurableSessionHost {
    /// Host over a state store, an agent catalog, and host capabilities.
    pub fn new(
        store: Arc<dyn DurableStateStore>,
        catalog: Arc<AgentCatalog>,
        environment: HostEnvironment,
        options: DurableSessionOptions,
    ) -> Self {
        Self::with_clock(store, catalog, environment, options, Arc::new(SystemClock))
    }

    /// Host with an explicit clock (used by virtual-time tests).
    pub fn with_clock(
        store: Arc<dyn DurableStateStore>,
        catalog: Arc<AgentCatalog>,
        environment: HostEnvironment,
        options: DurableSessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(HostInner {
                store,
                catalog,
                environment,
                options,
                clock,
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    async fn entity_lock(&self, id: &SessionEntityId) -> Arc<Mutex<()>> {
        let mut locks = self.inner.locks.lock().await;
        locks.entry(id.clone()).or_default().clone()
    }

    /// The entity's `Run` operation.
    pub async fn run(&self, id: &SessionEntityId, request: RunRequest) -> Result<RunResponse> {
        self.run_inner(id, request, None).await
    }

    /// The entity's `Run` operation with a streaming sink: every response
    /// update is forwarded before the full response is persisted.
    pub async fn run_streaming(
        &self,
        id: &SessionEntityId,
        request: RunRequest,
        sink: StreamingSink,
    ) -> Result<RunResponse> {
        self.run_inner(id, request, Some(sink)).await
    }

    async fn run_inner(
        &self,
        id: &SessionEntityId,
        request: RunRequest,
        sink: Option<StreamingSink>,
    ) -> Result<RunResponse> {
        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        // An empty request is answered without touching state.
        if request.messages.is_empty() {
            return Ok(RunResponse {
                agent_name: id.agent_name.clone(),
                messages: Vec::new(),
            });
        }

        let mut state = self.inner.store.load(id).await?.unwrap_or_default();

        // Idempotency: a completed exchange is replayed, never re-appended.
        if let Some(previous) = state.response_for(&request.correlation_id) {
            tracing::debug!(entity = %id, correlation_id = %request.correlation_id, "replaying stored response");
            return Ok(RunResponse {
                agent_name: id.agent_name.clone(),
                messages: previous,
            });
        }

        if !state.has_request(&request.correlation_id) {
            state.log.push(LogEntry {
                correlation_id: request.correlation_id.clone(),
                part: LogPart::Request {
                    messages: request.messages.clone(),
                },
            });
        }

        let agent = match self
            .inner
            .catalog
            .resolve(&id.agent_name, &self.inner.environment)
            .await
        {
            Ok(agent) => agent,
            Err(HostError::UnknownAgent { name }) => {
                return Err(DurableError::AgentNotRegistered { name });
            }
            Err(error) => return Err(DurableError::store(error)),
        };

        let options = ChatOptions {
            response_format: request.response_format.clone(),
            enabled_tool_names: if request.enable_tool_calls {
                request.enabled_tool_names.clone()
            } else {
                Some(Vec::new())
            },
            ..ChatOptions::default()
        };

        // The agent sees the concatenated conversation history as input;
        // the session is per-run scratch, history lives in the log.
        let history = state.conversation_messages();
        let mut session = AgentSession::new();
        let response = match &sink {
            Some(sink) => {
                let sink = sink.clone();
                agent
                    .run_streaming(history, &mut session, Some(&options), move |update| {
                        sink(update)
                    })
                    .await?
            }
            None => agent.run(history, &mut session, Some(&options)).await?,
        };

        state.log.push(LogEntry {
            correlation_id: request.correlation_id.clone(),
            part: LogPart::Response {
                messages: response.messages.clone(),
            },
        });

        self.refresh_expiration(id, &mut state);
        self.inner.store.save(id, &state).await?;

        Ok(RunResponse {
            agent_name: id.agent_name.clone(),
            messages: response.messages,
        })
    }

    /// TTL bookkeeping after a completed exchange.
    ///
    /// The deletion check is scheduled once, on the first interaction;
    /// later interactions only refresh the expiration and rely on the check
    /// handler's lazy reschedule.
    fn refresh_expiration(&self, id: &SessionEntityId, state: &mut DurableSessionState) {
        match self.inner.options.time_to_live_for(&id.agent_name) {
            Some(ttl) => {
                let now = self.inner.clock.now();
                let ttl = chrono::Duration::from_std(ttl)
                    .unwrap_or_else(|_| chrono::Duration::days(365 * 100));
                let expiration = now + ttl;
                state.expiration_time_utc = Some(expiration);
                if !state.eviction_scheduled {
                    state.eviction_scheduled = true;
                    self.schedule_check(id.clone(), self.signal_due(expiration));
                }
            }
            None => {
                state.expiration_time_utc = None;
            }
        }
    }

    fn signal_due(&self, expiration: DateTime<Utc>) -> DateTime<Utc> {
        let min_delay = chrono::Duration::from_std(self.inner.options.min_signal_delay())
            .unwrap_or_else(|_| chrono::Duration::zero());
        std::cmp::max(expiration, self.inner.clock.now() + min_delay)
    }

    fn schedule_check(&self, id: SessionEntityId, due: DateTime<Utc>) {
        let host = self.clone();
        tokio::spawn(async move {
            let delay = (due - host.inner.clock.now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO);
            tokio::time::sleep(delay).await;
            if let Err(error) = host.check_and_delete_if_expired(&id).await {
                tracing::warn!(entity = %id, error = %error, "scheduled expiration check failed");
            }
        });
    }

    /// The entity's `CheckAndDeleteIfExpired` operation. Idempotent.
    ///
    /// Deletes the whole state atomically once the expiration has passed;
    /// otherwise reschedules itself for the (possibly refreshed) deadline.
    pub async fn check_and_delete_if_expired(&self, id: &SessionEntityId) -> Result<()> {
        let lock = self.entity_lock(id).await;
        let _guard = lock.lock().await;

        let Some(mut state) = self.inner.store.load(id).await? else {
            return Ok(());
        };

        match state.expiration_time_utc {
            Some(expiration) if expiration <= self.inner.clock.now() => {
                tracing::debug!(entity = %id, "session expired; deleting state");
                self.inner.store.delete(id).await
            }
            Some(expiration) => {
                self.schedule_check(id.clone(), self.signal_due(expiration));
                Ok(())
            }
            None => {
                // TTL was disabled after scheduling; end the signal chain so
                // a later re-enable starts a fresh one.
                state.eviction_scheduled = false;
                self.inner.store.save(id, &state).await
            }
        }
    }
}
