//! Integration tests for the agent compositions.
//!
//! Mock clients stand in for real providers; each test drives a compiled
//! workflow end to end through the superstep scheduler.

use agentflow_agents::{
    build_concurrent, build_sequential, AgentConversation, AgentError, ChatAgent, ChatClient,
    ChatMessage, ChatOptions, ChatResponse, Content, GroupChatBuilder, HandoffBuilder,
    RoundRobinGroupChatManager,
};
use agentflow_core::{RunStatus, WorkflowEvent, WorkflowRunner};
use async_trait::async_trait;
use std::sync::Arc;

/// Client answering every request with one fixed assistant message.
struct FixedReplyClient {
    reply: String,
}

impl FixedReplyClient {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
        })
    }
}

#[async_trait]
impl ChatClient for FixedReplyClient {
    async fn respond(
        &self,
        _messages: Vec<ChatMessage>,
        _options: &ChatOptions,
    ) -> agentflow_agents::Result<ChatResponse> {
        Ok(ChatResponse::from_text(self.reply.clone()))
    }
}

/// Client that invokes a named tool on its first turn, then replies in text.
struct ToolOnFirstTurnClient {
    tool_name: String,
    follow_up: String,
}

#[async_trait]
impl ChatClient for ToolOnFirstTurnClient {
    async fn respond(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> agentflow_agents::Result<ChatResponse> {
        let already_called = messages
            .iter()
            .any(|m| m.function_calls().iter().any(|(name, _, _)| *name == self.tool_name));
        if already_called {
            return Ok(ChatResponse::from_text(self.follow_up.clone()));
        }
        if !options.tools.iter().any(|tool| tool.name == self.tool_name) {
            return Err(AgentError::client(format!(
                "tool '{}' was not offered",
                self.tool_name
            )));
        }
        Ok(ChatResponse {
            messages: vec![ChatMessage::from_contents(
                agentflow_agents::ChatRole::Assistant,
                vec![Content::function_call(
                    self.tool_name.clone(),
                    "call-1",
                    serde_json::json!({ "reason": "needs B" }),
                )],
            )],
            conversation_id: None,
            usage: None,
        })
    }
}

fn fixed_agent(name: &str, reply: &str) -> Arc<ChatAgent> {
    Arc::new(
        ChatAgent::builder(name, FixedReplyClient::new(reply))
            .build()
            .unwrap(),
    )
}

fn final_output(events: &[WorkflowEvent]) -> Vec<ChatMessage> {
    let value = events
        .iter()
        .rev()
        .find_map(|event| match event {
            WorkflowEvent::WorkflowOutput { value } => Some(value.clone()),
            _ => None,
        })
        .expect("workflow yielded output");
    serde_json::from_value(value).expect("output is a message list")
}

#[tokio::test]
async fn sequential_pipeline_accumulates_the_conversation() {
    let workflow = build_sequential(
        vec![fixed_agent("drafter", "draft"), fixed_agent("editor", "edit")],
        None,
    )
    .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &AgentConversation::user("write it"))
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    let messages = final_output(&events);
    let texts: Vec<String> = messages.iter().map(ChatMessage::text).collect();
    assert_eq!(texts, vec!["write it", "draft", "edit"]);
    assert_eq!(messages[1].author_name.as_deref(), Some("drafter"));
    assert_eq!(messages[2].author_name.as_deref(), Some("editor"));
}

#[tokio::test]
async fn concurrent_aggregate_keeps_declaration_order() {
    let workflow = build_concurrent(
        vec![
            fixed_agent("alpha", "α"),
            fixed_agent("beta", "β"),
            fixed_agent("gamma", "γ"),
        ],
        None,
        None,
    )
    .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &AgentConversation::user("go"))
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    let texts: Vec<String> = final_output(&events).iter().map(ChatMessage::text).collect();
    assert_eq!(texts, vec!["α", "β", "γ"]);
}

#[tokio::test]
async fn group_chat_round_robin_terminates_after_the_cap() {
    let participants = vec![
        fixed_agent("first", "reply-1"),
        fixed_agent("second", "reply-2"),
        fixed_agent("third", "reply-3"),
    ];
    let names: Vec<String> = participants.iter().map(|a| a.name().to_string()).collect();

    let workflow = GroupChatBuilder::new(Arc::new(move || {
        Box::new(RoundRobinGroupChatManager::new(names.clone(), 3).unwrap())
            as Box<dyn agentflow_agents::GroupChatManager>
    }))
    .add_participants(participants)
    .build()
    .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &AgentConversation::user("kick off"))
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    let messages = final_output(&events);
    // Opening message plus one reply per iteration.
    assert_eq!(messages.len(), 4);
    assert_eq!(messages.last().unwrap().text(), "reply-3");
    assert_eq!(
        messages.last().unwrap().author_name.as_deref(),
        Some("third")
    );
}

#[tokio::test]
async fn handoff_transfers_the_conversation_and_collects_messages() {
    let triage = Arc::new(
        ChatAgent::builder(
            "triage",
            Arc::new(ToolOnFirstTurnClient {
                tool_name: "handoff_to_expert".to_string(),
                follow_up: "handled by triage".to_string(),
            }),
        )
        .build()
        .unwrap(),
    );
    let expert = fixed_agent("expert", "expert answer");

    let workflow = HandoffBuilder::new(triage.clone())
        .with_handoff(triage, expert, Some("needs B"))
        .build()
        .unwrap();

    let run = WorkflowRunner::new()
        .run_streaming(workflow, &AgentConversation::user("please help"))
        .unwrap();
    let (events, status) = run.drain().await;

    assert_eq!(status, RunStatus::Completed);
    let messages = final_output(&events);
    let texts: Vec<String> = messages.iter().map(ChatMessage::text).collect();
    // user input, triage tool call (no text), synthesized tool result
    // (no text), expert reply
    assert_eq!(messages.len(), 4);
    assert_eq!(texts[0], "please help");
    assert_eq!(texts[3], "expert answer");

    let tool_result = &messages[2];
    assert!(matches!(
        &tool_result.contents[0],
        Content::FunctionResult { value, .. } if value == &serde_json::json!("Transferred.")
    ));
    assert!(messages[1]
        .function_calls()
        .iter()
        .any(|(name, _, _)| *name == "handoff_to_expert"));
}

#[tokio::test]
async fn handoff_to_self_is_rejected_at_build() {
    let solo = fixed_agent("solo", "hi");
    let err = HandoffBuilder::new(solo.clone())
        .with_handoff(solo.clone(), solo, None)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("itself"));
}

#[tokio::test]
async fn agent_run_updates_surface_as_events() {
    let workflow = build_sequential(vec![fixed_agent("soloist", "melody")], None).unwrap();
    let run = WorkflowRunner::new()
        .run_streaming(workflow, &AgentConversation::user("play"))
        .unwrap();
    let (events, _) = run.drain().await;

    assert!(events.iter().any(|event| matches!(
        event,
        WorkflowEvent::AgentRunUpdate { executor_id, .. } if executor_id.as_str() == "soloist"
    )));
}
