//! Sequential agent pipeline.

use crate::agent::ChatAgent;
use crate::executors::{AgentConversation, AgentExecutor};
use crate::messages::ChatMessage;
use agentflow_core::{
    ActionExecutor, Result, Workflow, WorkflowBuilder, WorkflowError,
};
use std::collections::HashSet;
use std::sync::Arc;

const OUTPUT_SINK_ID: &str = "output";

/// Chain agents into a pipeline.
///
/// Each agent receives the cumulative conversation (original input plus all
/// prior replies); a terminating sink yields the collected messages as the
/// workflow output. The workflow's input type is [`AgentConversation`].
pub fn build_sequential(agents: Vec<Arc<ChatAgent>>, name: Option<&str>) -> Result<Workflow> {
    if agents.is_empty() {
        return Err(WorkflowError::configuration(
            "a sequential workflow needs at least one agent",
        ));
    }
    validate_unique_names(&agents)?;

    let mut builder = WorkflowBuilder::new(name.unwrap_or("sequential"))
        .start_with(agents[0].name());

    for agent in &agents {
        let name = agent.name().to_string();
        let agent = agent.clone();
        builder = builder.add_executor(name, move || {
            Box::new(AgentExecutor::pipeline(agent.clone()))
        });
    }
    for pair in agents.windows(2) {
        builder = builder.direct(pair[0].name(), pair[1].name());
    }

    let sink = ActionExecutor::handling::<AgentConversation, _>(OUTPUT_SINK_ID, |conversation, ctx| {
        Box::pin(async move { ctx.yield_output(&conversation.messages) })
    });
    builder
        .add_action(sink)
        .direct(agents[agents.len() - 1].name(), OUTPUT_SINK_ID)
        .mark_output_producer(OUTPUT_SINK_ID)
        .build()
}

pub(crate) fn validate_unique_names(agents: &[Arc<ChatAgent>]) -> Result<()> {
    let mut seen = HashSet::new();
    for agent in agents {
        if agent.name() == OUTPUT_SINK_ID {
            return Err(WorkflowError::configuration(format!(
                "agent name '{OUTPUT_SINK_ID}' collides with the output sink"
            )));
        }
        if !seen.insert(agent.name().to_string()) {
            return Err(WorkflowError::configuration(format!(
                "duplicate agent name '{}'",
                agent.name()
            )));
        }
    }
    Ok(())
}

/// The collected messages a sequential workflow yields.
pub type SequentialOutput = Vec<ChatMessage>;
