//! Manager and agent actors over the topic bus.
//!
//! An alternative backing for group conversations: one manager actor plus
//! one agent actor per participant, all exchanging [`ActorMessage`]s on one
//! topic. The manager reacts to every `InputTask` or `Group` by optionally
//! soliciting human input, asking its strategy whether to stop, and
//! otherwise signalling the next speaker.

use crate::bus::{ActorMessage, TopicBus};
use crate::error::{OrchestrationError, Result};
use crate::handle::{ActorResponse, AgentResponseHandle, OrchestrationStatus};
use agentflow_agents::{AgentSession, ChatAgent, ChatMessage};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use uuid::Uuid;

/// Strategy steering an orchestration's manager actor.
pub trait OrchestrationManager: Send {
    /// Decide whether the conversation is complete.
    fn should_terminate(&mut self, history: &[ChatMessage]) -> bool;

    /// Pick the next speaker. Must name a participant.
    fn select_next_agent(&mut self, history: &[ChatMessage]) -> Result<String>;

    /// Distill the finished conversation into the final result string.
    /// Defaults to the text of the last message.
    fn filter_results(&mut self, history: &[ChatMessage]) -> String {
        history.last().map(ChatMessage::text).unwrap_or_default()
    }
}

/// Round-robin manager: fixed speaking order, turn-count termination.
pub struct RoundRobinManager {
    participants: Vec<String>,
    maximum_turns: usize,
    turns: usize,
    next_index: usize,
}

impl RoundRobinManager {
    /// Create a round-robin manager; `maximum_turns` must be at least 1.
    pub fn new(participants: Vec<String>, maximum_turns: usize) -> Result<Self> {
        if maximum_turns < 1 {
            return Err(OrchestrationError::configuration(
                "maximum_turns must be at least 1",
            ));
        }
        if participants.is_empty() {
            return Err(OrchestrationError::configuration(
                "a round-robin manager needs at least one participant",
            ));
        }
        Ok(Self {
            participants,
            maximum_turns,
            turns: 0,
            next_index: 0,
        })
    }
}

impl OrchestrationManager for RoundRobinManager {
    fn should_terminate(&mut self, _history: &[ChatMessage]) -> bool {
        self.turns >= self.maximum_turns
    }

    fn select_next_agent(&mut self, _history: &[ChatMessage]) -> Result<String> {
        let participant = self.participants[self.next_index % self.participants.len()].clone();
        self.next_index += 1;
        self.turns += 1;
        Ok(participant)
    }
}

/// Rule-based manager: closures decide termination and speaker selection.
pub struct RuleBasedManager {
    select_rule: Arc<dyn Fn(&[ChatMessage]) -> Option<String> + Send + Sync>,
    terminate_rule: Arc<dyn Fn(&[ChatMessage]) -> bool + Send + Sync>,
}

impl RuleBasedManager {
    /// Create a rule-based manager from a selection and a termination rule.
    pub fn new<S, T>(select_rule: S, terminate_rule: T) -> Self
    where
        S: Fn(&[ChatMessage]) -> Option<String> + Send + Sync + 'static,
        T: Fn(&[ChatMessage]) -> bool + Send + Sync + 'static,
    {
        Self {
            select_rule: Arc::new(select_rule),
            terminate_rule: Arc::new(terminate_rule),
        }
    }
}

impl OrchestrationManager for RuleBasedManager {
    fn should_terminate(&mut self, history: &[ChatMessage]) -> bool {
        (self.terminate_rule)(history)
    }

    fn select_next_agent(&mut self, history: &[ChatMessage]) -> Result<String> {
        (self.select_rule)(history).ok_or_else(|| {
            OrchestrationError::invalid_argument("selection rule named no participant")
        })
    }
}

/// Callback soliciting optional human input between turns.
pub type HumanInputCallback = Arc<dyn Fn(&[ChatMessage]) -> Option<ChatMessage> + Send + Sync>;

const MANAGER_ACTOR: &str = "__manager__";
const LISTENER_ACTOR: &str = "__listener__";
const INPUT_ACTOR: &str = "__input__";

/// The manager actor's event loop.
pub(crate) struct GroupManagerActor {
    topic: String,
    bus: TopicBus,
    manager: Box<dyn OrchestrationManager>,
    human_input: Option<HumanInputCallback>,
    conversation: Vec<ChatMessage>,
}

impl GroupManagerActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ActorMessage>) {
        while let Some(message) = inbox.recv().await {
            match message {
                ActorMessage::InputTask(messages) | ActorMessage::Group(messages) => {
                    self.conversation.extend(messages);
                    if let Some(callback) = &self.human_input {
                        if let Some(human) = callback(&self.conversation) {
                            self.conversation.push(human.clone());
                            self.bus
                                .publish(&self.topic, MANAGER_ACTOR, ActorMessage::Group(vec![human]))
                                .await;
                        }
                    }

                    if self.manager.should_terminate(&self.conversation) {
                        let result = self.manager.filter_results(&self.conversation);
                        self.bus
                            .publish(&self.topic, MANAGER_ACTOR, ActorMessage::Result(result))
                            .await;
                        return;
                    }
                    match self.manager.select_next_agent(&self.conversation) {
                        Ok(agent) => {
                            self.bus
                                .publish(&self.topic, MANAGER_ACTOR, ActorMessage::Speak { agent })
                                .await;
                        }
                        Err(error) => {
                            tracing::warn!(error = %error, "manager failed to select a speaker");
                            self.bus
                                .publish(
                                    &self.topic,
                                    MANAGER_ACTOR,
                                    ActorMessage::Result(String::new()),
                                )
                                .await;
                            return;
                        }
                    }
                }
                ActorMessage::Speak { .. } => {}
                ActorMessage::Result(_) => return,
            }
        }
    }
}

/// One participant's actor: tracks the conversation and answers `Speak`.
pub(crate) struct AgentActor {
    topic: String,
    bus: TopicBus,
    agent: Arc<ChatAgent>,
    conversation: Vec<ChatMessage>,
}

impl AgentActor {
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<ActorMessage>) {
        let name = self.agent.name().to_string();
        while let Some(message) = inbox.recv().await {
            match message {
                ActorMessage::InputTask(messages) | ActorMessage::Group(messages) => {
                    self.conversation.extend(messages);
                }
                ActorMessage::Speak { agent } if agent == name => {
                    let mut session = AgentSession::new();
                    match self
                        .agent
                        .run(self.conversation.clone(), &mut session, None)
                        .await
                    {
                        Ok(response) => {
                            self.conversation.extend(response.messages.clone());
                            self.bus
                                .publish(&self.topic, &name, ActorMessage::Group(response.messages))
                                .await;
                        }
                        Err(error) => {
                            tracing::warn!(agent = %name, error = %error, "agent turn failed");
                            self.bus
                                .publish(&self.topic, &name, ActorMessage::Result(String::new()))
                                .await;
                            return;
                        }
                    }
                }
                ActorMessage::Speak { .. } => {}
                ActorMessage::Result(_) => return,
            }
        }
    }
}

/// A group orchestration over the actor runtime.
pub struct GroupOrchestration {
    manager: Box<dyn OrchestrationManager>,
    participants: Vec<Arc<ChatAgent>>,
    human_input: Option<HumanInputCallback>,
}

impl GroupOrchestration {
    /// Create an orchestration from a manager strategy and participants.
    pub fn new(
        manager: Box<dyn OrchestrationManager>,
        participants: Vec<Arc<ChatAgent>>,
    ) -> Result<Self> {
        if participants.is_empty() {
            return Err(OrchestrationError::configuration(
                "an orchestration needs at least one participant",
            ));
        }
        Ok(Self {
            manager,
            participants,
            human_input: None,
        })
    }

    /// Solicit optional human input before every manager decision.
    pub fn with_human_input(mut self, callback: HumanInputCallback) -> Self {
        self.human_input = Some(callback);
        self
    }

    /// Spawn the actors, deliver the input task, and return a non-blocking
    /// handle to the result.
    pub async fn start(self, input: Vec<ChatMessage>) -> AgentResponseHandle {
        let topic = format!("orchestration/{}", Uuid::new_v4());
        let bus = TopicBus::new();

        for agent in &self.participants {
            let inbox = bus.subscribe(&topic, agent.name()).await;
            let actor = AgentActor {
                topic: topic.clone(),
                bus: bus.clone(),
                agent: agent.clone(),
                conversation: Vec::new(),
            };
            tokio::spawn(actor.run(inbox));
        }

        let manager_inbox = bus.subscribe(&topic, MANAGER_ACTOR).await;
        let manager_actor = GroupManagerActor {
            topic: topic.clone(),
            bus: bus.clone(),
            manager: self.manager,
            human_input: self.human_input,
            conversation: Vec::new(),
        };
        tokio::spawn(manager_actor.run(manager_inbox));

        let (status_tx, status_rx) = watch::channel(OrchestrationStatus::Working);
        let (result_tx, result_rx) = oneshot::channel();
        let mut listener_inbox = bus.subscribe(&topic, LISTENER_ACTOR).await;
        tokio::spawn(async move {
            let mut result_tx = Some(result_tx);
            while let Some(message) = listener_inbox.recv().await {
                match message {
                    ActorMessage::Speak { agent } => {
                        let _ = status_tx.send(OrchestrationStatus::AgentSpeaking { agent });
                    }
                    ActorMessage::Group(_) | ActorMessage::InputTask(_) => {
                        let _ = status_tx.send(OrchestrationStatus::Working);
                    }
                    ActorMessage::Result(value) => {
                        let _ = status_tx.send(OrchestrationStatus::Completed);
                        if let Some(sender) = result_tx.take() {
                            let _ = sender.send(ActorResponse { value });
                        }
                        return;
                    }
                }
            }
        });

        bus.publish(&topic, INPUT_ACTOR, ActorMessage::InputTask(input))
            .await;

        AgentResponseHandle::new(status_rx, result_rx)
    }
}
