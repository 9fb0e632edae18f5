//! Handoff composition: the active agent picks its successor with a tool.
//!
//! Each participant is offered one auxiliary tool per registered handoff,
//! named `handoff_to_<target>`. Invoking it ends the agent's turn with a
//! synthesized `"Transferred."` tool result and a [`HandoffRecord`] tagged
//! with the chosen target; a switch edge routes the record to the successor.
//! A turn without a handoff call routes to the terminal sink, which yields
//! the accumulated messages. Handoff is data plus routing, not control-flow
//! exceptions.

use crate::agent::ChatAgent;
use crate::client::{ChatOptions, ToolDefinition};
use crate::executors::{AgentConversation, AgentExecutor, HandoffRecord, TurnToken};
use agentflow_core::{
    ActionExecutor, Edge, Envelope, Executor, ExecutorId, Result, SwitchCase, TypeId, Workflow,
    WorkflowBuilder, WorkflowContext, WorkflowError,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

const OUTPUT_SINK_ID: &str = "output";

fn handoff_tool_name(target: &str) -> String {
    format!("handoff_to_{target}")
}

/// One registered handoff route.
#[derive(Debug, Clone)]
struct HandoffRoute {
    target: String,
    reason: Option<String>,
}

/// Executor running one handoff participant.
///
/// Declares both the workflow input ([`AgentConversation`]) and incoming
/// [`HandoffRecord`]s, so it can open the chat or take over mid-way.
pub struct HandoffAgentExecutor {
    id: ExecutorId,
    agent: Arc<ChatAgent>,
    routes: Vec<HandoffRoute>,
}

impl HandoffAgentExecutor {
    fn new(agent: Arc<ChatAgent>, routes: Vec<HandoffRoute>) -> Self {
        Self {
            id: ExecutorId::from(agent.name()),
            agent,
            routes,
        }
    }

    fn handoff_tools(&self) -> Vec<ToolDefinition> {
        self.routes
            .iter()
            .map(|route| {
                let description = match &route.reason {
                    Some(reason) => format!("Transfer the conversation to {}: {reason}", route.target),
                    None => format!("Transfer the conversation to {}.", route.target),
                };
                ToolDefinition::new(
                    handoff_tool_name(&route.target),
                    description,
                    serde_json::json!({
                        "type": "object",
                        "properties": {
                            "reason": { "type": "string" }
                        }
                    }),
                )
            })
            .collect()
    }
}

#[async_trait]
impl Executor for HandoffAgentExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<AgentConversation>(), TypeId::of::<HandoffRecord>()]
            .into_iter()
            .collect()
    }

    fn output_types(&self) -> HashSet<TypeId> {
        [TypeId::of::<HandoffRecord>()].into_iter().collect()
    }

    async fn handle(
        &mut self,
        envelope: Envelope,
        ctx: WorkflowContext,
    ) -> Result<()> {
        let (turn_token, messages) = if envelope.is::<AgentConversation>() {
            (TurnToken::default(), envelope.payload_as::<AgentConversation>()?.messages)
        } else {
            let record: HandoffRecord = envelope.payload_as()?;
            (record.turn_token, record.messages)
        };

        let options = ChatOptions {
            tools: self.handoff_tools(),
            ..ChatOptions::default()
        };
        let response_messages = AgentExecutor::run_agent(
            &self.agent,
            &self.id,
            messages.clone(),
            Some(&options),
            turn_token.emit_events,
            &ctx,
        )
        .await?;

        let mut conversation = messages;
        conversation.extend(response_messages.iter().cloned());

        // A handoff is the first function call naming a registered route.
        let invoked = response_messages
            .iter()
            .flat_map(|message| message.function_calls())
            .find_map(|(name, call_id, _arguments)| {
                self.routes
                    .iter()
                    .find(|route| handoff_tool_name(&route.target) == name)
                    .map(|route| (route.target.clone(), call_id.to_string()))
            });

        let record = match invoked {
            Some((target, call_id)) => {
                conversation.push(crate::messages::ChatMessage::tool_result(
                    call_id,
                    serde_json::json!("Transferred."),
                ));
                HandoffRecord {
                    turn_token,
                    invoked_handoff: Some(target),
                    messages: conversation,
                }
            }
            None => HandoffRecord {
                turn_token,
                invoked_handoff: None,
                messages: conversation,
            },
        };
        ctx.send_message(&record)
    }
}

impl std::fmt::Debug for HandoffAgentExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandoffAgentExecutor")
            .field("id", &self.id)
            .field("routes", &self.routes.len())
            .finish()
    }
}

/// Builder for handoff workflows.
///
/// ```rust,ignore
/// let workflow = HandoffBuilder::new(triage.clone())
///     .with_handoff(triage, billing, Some("billing questions"))
///     .build()?;
/// ```
pub struct HandoffBuilder {
    initial: Arc<ChatAgent>,
    agents: Vec<Arc<ChatAgent>>,
    routes_by_agent: HashMap<String, Vec<HandoffRoute>>,
    name: Option<String>,
}

impl HandoffBuilder {
    /// Start a handoff workflow with the agent that opens the conversation.
    pub fn new(initial: Arc<ChatAgent>) -> Self {
        Self {
            agents: vec![initial.clone()],
            initial,
            routes_by_agent: HashMap::new(),
            name: None,
        }
    }

    /// Set the workflow name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Register a handoff: `from` may transfer the conversation to `to`.
    pub fn with_handoff(
        mut self,
        from: Arc<ChatAgent>,
        to: Arc<ChatAgent>,
        reason: Option<&str>,
    ) -> Self {
        for agent in [&from, &to] {
            if !self.agents.iter().any(|known| known.name() == agent.name()) {
                self.agents.push(agent.clone());
            }
        }
        self.routes_by_agent
            .entry(from.name().to_string())
            .or_default()
            .push(HandoffRoute {
                target: to.name().to_string(),
                reason: reason.map(str::to_string),
            });
        self
    }

    /// Validate and compile the workflow.
    pub fn build(self) -> Result<Workflow> {
        for (from, routes) in &self.routes_by_agent {
            let mut seen = HashSet::new();
            for route in routes {
                if route.target == *from {
                    return Err(WorkflowError::configuration(format!(
                        "agent '{from}' cannot hand off to itself"
                    )));
                }
                if !seen.insert(route.target.clone()) {
                    return Err(WorkflowError::configuration(format!(
                        "duplicate handoff '{from}' -> '{}'",
                        route.target
                    )));
                }
            }
        }
        if self.agents.iter().any(|agent| agent.name() == OUTPUT_SINK_ID) {
            return Err(WorkflowError::configuration(format!(
                "agent name '{OUTPUT_SINK_ID}' collides with the output sink"
            )));
        }

        let mut builder = WorkflowBuilder::new(
            self.name.as_deref().unwrap_or("handoff"),
        )
        .start_with(self.initial.name());

        for agent in &self.agents {
            let name = agent.name().to_string();
            let routes = self
                .routes_by_agent
                .get(&name)
                .cloned()
                .unwrap_or_default();
            let agent = agent.clone();
            builder = builder.add_executor(name, move || {
                Box::new(HandoffAgentExecutor::new(agent.clone(), routes.clone()))
            });
        }

        let sink = ActionExecutor::handling::<HandoffRecord, _>(OUTPUT_SINK_ID, |record, ctx| {
            Box::pin(async move { ctx.yield_output(&record.messages) })
        });
        builder = builder
            .add_action(sink)
            .mark_output_producer(OUTPUT_SINK_ID);

        // One switch per agent: a case per registered target, the sink as
        // the no-handoff default.
        for agent in &self.agents {
            let routes = self
                .routes_by_agent
                .get(agent.name())
                .cloned()
                .unwrap_or_default();
            let cases = routes
                .iter()
                .map(|route| {
                    let target = route.target.clone();
                    SwitchCase::on_payload::<HandoffRecord, _>(
                        move |record| record.invoked_handoff.as_deref() == Some(target.as_str()),
                        route.target.as_str(),
                    )
                })
                .collect();
            builder = builder.add_edge(
                agent.name(),
                Edge::switch(cases, Some(ExecutorId::from(OUTPUT_SINK_ID))),
            );
        }

        builder.build()
    }
}
