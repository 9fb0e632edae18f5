//! Group chat: a host executor whose manager picks the next speaker.
//!
//! The graph is a star: the host is connected bidirectionally with every
//! participant. Each iteration the host consults its [`GroupChatManager`] -
//! terminate? filter history? who speaks next? - then addresses a
//! [`SpeakRequest`] to the chosen participant, whose reply flows back into
//! the host and bumps the iteration counter.

use crate::agent::ChatAgent;
use crate::error::AgentError;
use crate::executors::{AgentConversation, ParticipantOutput, SpeakRequest};
use crate::messages::ChatMessage;
use crate::session::AgentSession;
use agentflow_core::{
    Envelope, Executor, ExecutorId, Result, TypeId, Workflow, WorkflowBuilder, WorkflowContext,
    WorkflowError,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

const HOST_ID: &str = "host";

/// Strategy steering a group chat.
///
/// The host owns the iteration counter and reports each completed turn via
/// [`record_turn`](Self::record_turn); managers read it back for their
/// termination decision. [`reset`](Self::reset) clears internal counters
/// when the composition's workflow resets.
pub trait GroupChatManager: Send {
    /// Decide whether the chat is over.
    fn should_terminate(&mut self, history: &[ChatMessage]) -> bool;

    /// Pick the participant who speaks next. Must return a participant.
    fn select_next_agent(&mut self, history: &[ChatMessage]) -> std::result::Result<String, AgentError>;

    /// Optionally rewrite the history the next speaker sees.
    fn update_history(&mut self, history: Vec<ChatMessage>) -> Vec<ChatMessage> {
        history
    }

    /// Note one completed turn.
    fn record_turn(&mut self) {}

    /// Completed turns so far.
    fn iteration_count(&self) -> usize {
        0
    }

    /// Clear internal counters.
    fn reset(&mut self) {}
}

/// Manager cycling through a fixed participant list.
///
/// Terminates once the iteration cap is reached; an optional user predicate
/// is evaluated first and terminates the chat when it fires (disjunction
/// with the default check).
pub struct RoundRobinGroupChatManager {
    participants: Vec<String>,
    maximum_iteration_count: usize,
    iteration_count: usize,
    next_index: usize,
    termination_predicate: Option<Arc<dyn Fn(&[ChatMessage]) -> bool + Send + Sync>>,
}

impl std::fmt::Debug for RoundRobinGroupChatManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobinGroupChatManager")
            .field("participants", &self.participants)
            .field("maximum_iteration_count", &self.maximum_iteration_count)
            .field("iteration_count", &self.iteration_count)
            .field("next_index", &self.next_index)
            .field(
                "termination_predicate",
                &self.termination_predicate.as_ref().map(|_| "<fn>"),
            )
            .finish()
    }
}

impl RoundRobinGroupChatManager {
    /// Create a round-robin manager. `maximum_iteration_count` must be at
    /// least 1.
    pub fn new(
        participants: Vec<String>,
        maximum_iteration_count: usize,
    ) -> std::result::Result<Self, AgentError> {
        if maximum_iteration_count < 1 {
            return Err(AgentError::configuration(
                "maximum_iteration_count must be at least 1",
            ));
        }
        if participants.is_empty() {
            return Err(AgentError::configuration(
                "a round-robin manager needs at least one participant",
            ));
        }
        Ok(Self {
            participants,
            maximum_iteration_count,
            iteration_count: 0,
            next_index: 0,
            termination_predicate: None,
        })
    }

    /// Add a user termination predicate, evaluated before the iteration cap.
    pub fn with_termination_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&[ChatMessage]) -> bool + Send + Sync + 'static,
    {
        self.termination_predicate = Some(Arc::new(predicate));
        self
    }
}

impl GroupChatManager for RoundRobinGroupChatManager {
    fn should_terminate(&mut self, history: &[ChatMessage]) -> bool {
        if let Some(predicate) = &self.termination_predicate {
            if predicate(history) {
                return true;
            }
        }
        self.iteration_count >= self.maximum_iteration_count
    }

    fn select_next_agent(&mut self, _history: &[ChatMessage]) -> std::result::Result<String, AgentError> {
        let participant = self.participants[self.next_index % self.participants.len()].clone();
        self.next_index += 1;
        Ok(participant)
    }

    fn record_turn(&mut self) {
        self.iteration_count += 1;
    }

    fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    fn reset(&mut self) {
        self.iteration_count = 0;
        self.next_index = 0;
    }
}

/// Factory producing a fresh manager per run.
pub type ManagerFactory = Arc<dyn Fn() -> Box<dyn GroupChatManager> + Send + Sync>;

/// The host executor of a group chat.
struct HostExecutor {
    id: ExecutorId,
    manager: Box<dyn GroupChatManager>,
    conversation: Vec<ChatMessage>,
}

impl HostExecutor {
    fn new(manager: Box<dyn GroupChatManager>) -> Self {
        Self {
            id: ExecutorId::from(HOST_ID),
            manager,
            conversation: Vec::new(),
        }
    }
}

#[async_trait]
impl Executor for HostExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<AgentConversation>(), TypeId::of::<ParticipantOutput>()]
            .into_iter()
            .collect()
    }

    fn output_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<SpeakRequest>()].into_iter().collect()
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: WorkflowContext,
    ) -> Result<()> {
        if envelope.is::<AgentConversation>() {
            self.conversation = envelope.payload_as::<AgentConversation>()?.messages;
        } else {
            let reply: ParticipantOutput = envelope.payload_as()?;
            self.conversation.extend(reply.messages);
            self.manager.record_turn();
        }

        if self.manager.should_terminate(&self.conversation) {
            tracing::debug!(
                iterations = self.manager.iteration_count(),
                "group chat terminating"
            );
            return ctx.yield_output(&self.conversation);
        }

        let history = self.manager.update_history(self.conversation.clone());
        let next = self
            .manager
            .select_next_agent(&history)
            .map_err(|error| WorkflowError::handler(self.id.to_string(), error.to_string()))?;
        ctx.send_message_to(&SpeakRequest { messages: history }, ExecutorId::from(next))
    }

    fn reset(&mut self) {
        self.conversation.clear();
        self.manager.reset();
    }
}

/// A group-chat participant: answers [`SpeakRequest`]s with its reply batch.
struct ParticipantExecutor {
    id: ExecutorId,
    agent: Arc<ChatAgent>,
}

#[async_trait]
impl Executor for ParticipantExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<SpeakRequest>()].into_iter().collect()
    }

    fn output_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<ParticipantOutput>()].into_iter().collect()
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: WorkflowContext,
    ) -> Result<()> {
        let request: SpeakRequest = envelope.payload_as()?;
        let mut session = AgentSession::new();
        let response = self
            .agent
            .run(request.messages, &mut session, None)
            .await
            .map_err(|error| WorkflowError::handler(self.id.to_string(), error.to_string()))?;
        ctx.send_message(&ParticipantOutput {
            participant: self.agent.name().to_string(),
            messages: response.messages,
        })
    }
}

/// Builder for group-chat workflows.
pub struct GroupChatBuilder {
    manager_factory: ManagerFactory,
    participants: Vec<Arc<ChatAgent>>,
    name: Option<String>,
}

impl GroupChatBuilder {
    /// Start a group chat driven by managers from `manager_factory`.
    pub fn new(manager_factory: ManagerFactory) -> Self {
        Self {
            manager_factory,
            participants: Vec::new(),
            name: None,
        }
    }

    /// Set the workflow name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add one participant.
    pub fn add_participant(mut self, agent: Arc<ChatAgent>) -> Self {
        self.participants.push(agent);
        self
    }

    /// Add several participants, in speaking-priority order.
    pub fn add_participants(mut self, agents: Vec<Arc<ChatAgent>>) -> Self {
        self.participants.extend(agents);
        self
    }

    /// Validate and compile the workflow.
    pub fn build(self) -> Result<Workflow> {
        if self.participants.is_empty() {
            return Err(WorkflowError::configuration(
                "a group chat needs at least one participant",
            ));
        }
        let mut seen = HashSet::new();
        for agent in &self.participants {
            if agent.name() == HOST_ID {
                return Err(WorkflowError::configuration(format!(
                    "agent name '{HOST_ID}' collides with the host executor"
                )));
            }
            if !seen.insert(agent.name().to_string()) {
                return Err(WorkflowError::configuration(format!(
                    "duplicate agent name '{}'",
                    agent.name()
                )));
            }
        }

        let manager_factory = self.manager_factory.clone();
        let mut builder = WorkflowBuilder::new(self.name.as_deref().unwrap_or("group-chat"))
            .start_with(HOST_ID)
            .add_executor(HOST_ID, move || {
                Box::new(HostExecutor::new(manager_factory()))
            })
            .mark_output_producer(HOST_ID);

        for agent in &self.participants {
            let name = agent.name().to_string();
            let id = ExecutorId::from(name.as_str());
            let agent = agent.clone();
            builder = builder
                .add_executor(name, move || {
                    Box::new(ParticipantExecutor {
                        id: ExecutorId::from(agent.name()),
                        agent: agent.clone(),
                    })
                })
                .direct(HOST_ID, id.clone())
                .direct(id, HOST_ID);
        }

        builder.build()
    }
}
