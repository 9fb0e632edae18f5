//! Workflow payload types and the agent-backed executor.
//!
//! Agent workflows route whole conversations: [`AgentConversation`] flows
//! through pipelines, [`ParticipantOutput`] carries one participant's reply
//! batch, [`HandoffRecord`] is the tagged result of a handoff turn, and
//! [`SpeakRequest`] asks a group-chat participant for its turn. All of them
//! are plain payloads; routing stays in the graph's edges.

use crate::agent::ChatAgent;
use crate::client::ChatResponseUpdate;
use crate::messages::ChatMessage;
use crate::session::AgentSession;
use agentflow_core::{
    Envelope, Executor, ExecutorId, TypeId, WorkflowContext, WorkflowError, WorkflowEvent,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

/// A conversation snapshot flowing through an agent workflow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentConversation {
    /// Messages so far, oldest first.
    pub messages: Vec<ChatMessage>,
}

impl AgentConversation {
    /// Conversation opened by a single user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::user(text)],
        }
    }
}

/// One participant's reply batch in a concurrent or group composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantOutput {
    /// Name of the producing agent.
    pub participant: String,
    /// The participant's response messages only.
    pub messages: Vec<ChatMessage>,
}

/// Turn-boundary marker carried through handoff workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnToken {
    /// Whether agent run updates should be surfaced as events.
    pub emit_events: bool,
}

/// Tagged result of one handoff turn, routed by switch edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffRecord {
    /// The turn marker.
    pub turn_token: TurnToken,
    /// Executor id of the agent the conversation was handed to, when the
    /// agent invoked a handoff tool this turn.
    pub invoked_handoff: Option<String>,
    /// Cumulative conversation, including the synthesized tool result.
    pub messages: Vec<ChatMessage>,
}

/// Request for a group-chat participant to produce its turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakRequest {
    /// The (possibly filtered) conversation the participant speaks to.
    pub messages: Vec<ChatMessage>,
}

/// How an [`AgentExecutor`] publishes its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AgentOutputMode {
    /// Send the cumulative conversation (input plus response).
    Pipeline,
    /// Send only the response, wrapped as a [`ParticipantOutput`].
    Participant,
}

/// Executor wrapping a [`ChatAgent`].
///
/// Each delivery runs the agent once over the incoming conversation with a
/// fresh session (compositions pass the complete conversation every turn).
/// Streamed updates surface as `AgentRunUpdate` events.
pub struct AgentExecutor {
    id: ExecutorId,
    agent: Arc<ChatAgent>,
    mode: AgentOutputMode,
    emit_updates: bool,
}

impl AgentExecutor {
    /// Executor forwarding the cumulative conversation (sequential chains,
    /// handoff hops).
    pub fn pipeline(agent: Arc<ChatAgent>) -> Self {
        Self {
            id: ExecutorId::from(agent.name()),
            agent,
            mode: AgentOutputMode::Pipeline,
            emit_updates: true,
        }
    }

    /// Executor emitting only its reply batch (concurrent participants).
    pub fn participant(agent: Arc<ChatAgent>) -> Self {
        Self {
            id: ExecutorId::from(agent.name()),
            agent,
            mode: AgentOutputMode::Participant,
            emit_updates: true,
        }
    }

    /// Suppress `AgentRunUpdate` events.
    pub fn without_updates(mut self) -> Self {
        self.emit_updates = false;
        self
    }

    pub(crate) async fn run_agent(
        agent: &ChatAgent,
        executor_id: &ExecutorId,
        messages: Vec<ChatMessage>,
        options: Option<&crate::client::ChatOptions>,
        emit_updates: bool,
        ctx: &WorkflowContext,
    ) -> agentflow_core::Result<Vec<ChatMessage>> {
        let mut session = AgentSession::new();
        let mut updates: Vec<ChatResponseUpdate> = Vec::new();
        let response = agent
            .run_streaming(messages, &mut session, options, |update| {
                updates.push(update.clone())
            })
            .await
            .map_err(|error| WorkflowError::handler(executor_id.to_string(), error.to_string()))?;

        if emit_updates {
            for update in &updates {
                ctx.add_event(WorkflowEvent::AgentRunUpdate {
                    executor_id: executor_id.clone(),
                    update: serde_json::to_value(update)?,
                });
            }
        }
        Ok(response.messages)
    }
}

#[async_trait]
impl Executor for AgentExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<AgentConversation>()].into_iter().collect()
    }

    fn output_types(&self) -> HashSet<TypeId> {
        match self.mode {
            AgentOutputMode::Pipeline => [TypeId::of::<AgentConversation>()].into_iter().collect(),
            AgentOutputMode::Participant => {
                [TypeId::of::<ParticipantOutput>()].into_iter().collect()
            }
        }
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: WorkflowContext,
    ) -> agentflow_core::Result<()> {
        let conversation: AgentConversation = envelope.payload_as()?;
        let response_messages = Self::run_agent(
            &self.agent,
            &self.id,
            conversation.messages.clone(),
            None,
            self.emit_updates,
            &ctx,
        )
        .await?;

        match self.mode {
            AgentOutputMode::Pipeline => {
                let mut messages = conversation.messages;
                messages.extend(response_messages);
                ctx.send_message(&AgentConversation { messages })
            }
            AgentOutputMode::Participant => ctx.send_message(&ParticipantOutput {
                participant: self.agent.name().to_string(),
                messages: response_messages,
            }),
        }
    }
}

impl std::fmt::Debug for AgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentExecutor")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workflow_payloads_round_trip() {
        let record = HandoffRecord {
            turn_token: TurnToken { emit_events: true },
            invoked_handoff: Some("triage".into()),
            messages: vec![ChatMessage::user("help")],
        };
        let json = serde_json::to_value(&record).unwrap();
        let back: HandoffRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn conversation_helper_builds_a_user_opening() {
        let conversation = AgentConversation::user("hi");
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].text(), "hi");
    }
}
