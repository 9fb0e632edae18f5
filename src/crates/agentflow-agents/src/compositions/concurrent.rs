//! Concurrent fan-out / aggregate composition.

use crate::agent::ChatAgent;
use crate::compositions::sequential::validate_unique_names;
use crate::executors::{AgentConversation, AgentExecutor, ParticipantOutput};
use crate::messages::ChatMessage;
use agentflow_core::{
    ActionExecutor, Edge, ExecutorId, JoinBatch, JoinPolicy, Result, Workflow, WorkflowBuilder,
    WorkflowError,
};
use std::sync::Arc;

const START_ID: &str = "start";
const AGGREGATE_ID: &str = "aggregate";

/// Combines every participant's reply batch into the final message list.
/// Batches arrive in participant declaration order.
pub type ConcurrentAggregator = Arc<dyn Fn(&[ParticipantOutput]) -> Vec<ChatMessage> + Send + Sync>;

/// Fan the input out to every agent, gather one reply batch per agent, and
/// aggregate.
///
/// The default aggregator keeps the last message of each non-empty
/// participant, in declaration order. The workflow's input type is
/// [`AgentConversation`]; its output is the aggregated `Vec<ChatMessage>`.
pub fn build_concurrent(
    agents: Vec<Arc<ChatAgent>>,
    aggregator: Option<ConcurrentAggregator>,
    name: Option<&str>,
) -> Result<Workflow> {
    if agents.is_empty() {
        return Err(WorkflowError::configuration(
            "a concurrent workflow needs at least one agent",
        ));
    }
    validate_unique_names(&agents)?;
    for agent in &agents {
        if agent.name() == START_ID || agent.name() == AGGREGATE_ID {
            return Err(WorkflowError::configuration(format!(
                "agent name '{}' collides with a reserved executor id",
                agent.name()
            )));
        }
    }

    let participant_ids: Vec<ExecutorId> =
        agents.iter().map(|agent| ExecutorId::from(agent.name())).collect();
    let aggregator = aggregator.unwrap_or_else(|| Arc::new(last_message_of_each));

    let start = ActionExecutor::handling::<AgentConversation, _>(START_ID, |conversation, ctx| {
        Box::pin(async move { ctx.send_message(&conversation) })
    });

    let aggregate = ActionExecutor::handling::<JoinBatch, _>(AGGREGATE_ID, move |batch, ctx| {
        let aggregator = aggregator.clone();
        Box::pin(async move {
            let outputs = batch.payloads::<ParticipantOutput>()?;
            ctx.yield_output(&aggregator(&outputs))
        })
    });

    let mut builder = WorkflowBuilder::new(name.unwrap_or("concurrent"))
        .start_with(START_ID)
        .add_action(start)
        .add_action(aggregate)
        .add_edge(START_ID, Edge::fan_out(participant_ids.clone()))
        .fan_in(participant_ids, AGGREGATE_ID, JoinPolicy::AllSources)
        .mark_output_producer(AGGREGATE_ID);

    for agent in &agents {
        let name = agent.name().to_string();
        let agent = agent.clone();
        builder = builder.add_executor(name, move || {
            Box::new(AgentExecutor::participant(agent.clone()))
        });
    }
    builder.build()
}

fn last_message_of_each(outputs: &[ParticipantOutput]) -> Vec<ChatMessage> {
    outputs
        .iter()
        .filter_map(|output| output.messages.last().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ChatMessage;

    #[test]
    fn default_aggregator_keeps_last_message_of_non_empty_participants() {
        let outputs = vec![
            ParticipantOutput {
                participant: "a".into(),
                messages: vec![ChatMessage::assistant("a1"), ChatMessage::assistant("a2")],
            },
            ParticipantOutput {
                participant: "b".into(),
                messages: vec![],
            },
            ParticipantOutput {
                participant: "c".into(),
                messages: vec![ChatMessage::assistant("c1")],
            },
        ];

        let texts: Vec<String> = last_message_of_each(&outputs)
            .iter()
            .map(ChatMessage::text)
            .collect();
        assert_eq!(texts, vec!["a2", "c1"]);
    }
}
