//! Provider-agnostic chat client abstraction.
//!
//! agentflow is an orchestration runtime, not an LLM client library: the
//! core exposes the [`ChatClient`] trait and users implement it for their
//! provider. Everything above the trait (option merging, sessions,
//! providers, compositions) works with any implementation, shared as
//! `Arc<dyn ChatClient>`.

use crate::error::Result;
use crate::messages::{ChatMessage, ChatRole, Content};
use async_trait::async_trait;
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;

/// A tool the model may invoke.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, as offered to the model.
    pub name: String,
    /// Natural-language description of what the tool does.
    pub description: String,
    /// JSON schema of the tool's arguments.
    pub parameters: Value,
}

impl ToolDefinition {
    /// Create a tool definition.
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// Options for a chat request.
///
/// Agents carry default options; callers may pass per-run options which are
/// merged by [`ChatOptions::merged`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatOptions {
    /// System-level instructions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Provider model identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    /// Sampling temperature.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Response token budget.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    /// Desired response format (provider-shaped).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<Value>,
    /// Service-side conversation to continue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Tools offered to the model.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    /// When set, clients must expose only the named tools; an empty list
    /// disables tool calling entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_tool_names: Option<Vec<String>>,
    /// Stop sequences.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,
    /// Provider-specific extras.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_properties: serde_json::Map<String, Value>,
}

impl ChatOptions {
    /// Merge agent defaults with per-run options.
    ///
    /// Scalar fields: the per-run value wins, falling back to the agent
    /// default. `instructions`: agent default then per-run, joined with a
    /// newline. `tools`, `stop_sequences`, `additional_properties`: union,
    /// agent first then per-run (per-run entries overwrite equal keys).
    pub fn merged(agent_default: &ChatOptions, per_run: Option<&ChatOptions>) -> ChatOptions {
        let Some(run) = per_run else {
            return agent_default.clone();
        };

        let instructions = match (&agent_default.instructions, &run.instructions) {
            (Some(base), Some(extra)) => Some(format!("{base}\n{extra}")),
            (Some(base), None) => Some(base.clone()),
            (None, Some(extra)) => Some(extra.clone()),
            (None, None) => None,
        };

        let mut tools = agent_default.tools.clone();
        tools.extend(run.tools.iter().cloned());

        let mut stop_sequences = agent_default.stop_sequences.clone();
        stop_sequences.extend(run.stop_sequences.iter().cloned());

        let mut additional_properties = agent_default.additional_properties.clone();
        for (key, value) in &run.additional_properties {
            additional_properties.insert(key.clone(), value.clone());
        }

        ChatOptions {
            instructions,
            model_id: run.model_id.clone().or_else(|| agent_default.model_id.clone()),
            temperature: run.temperature.or(agent_default.temperature),
            max_tokens: run.max_tokens.or(agent_default.max_tokens),
            response_format: run
                .response_format
                .clone()
                .or_else(|| agent_default.response_format.clone()),
            conversation_id: run
                .conversation_id
                .clone()
                .or_else(|| agent_default.conversation_id.clone()),
            tools,
            enabled_tool_names: run
                .enabled_tool_names
                .clone()
                .or_else(|| agent_default.enabled_tool_names.clone()),
            stop_sequences,
            additional_properties,
        }
    }
}

/// Token usage reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    /// Tokens consumed by the request.
    pub input_tokens: u64,
    /// Tokens produced in the response.
    pub output_tokens: u64,
}

/// A complete chat response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Response messages, in order.
    pub messages: Vec<ChatMessage>,
    /// Service-assigned conversation id, when the provider manages
    /// conversation state server-side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Token usage, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<UsageStats>,
}

impl ChatResponse {
    /// Response with a single assistant text message.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(text)],
            conversation_id: None,
            usage: None,
        }
    }

    /// Accumulate a stream of updates into a complete response.
    ///
    /// Adjacent text parts are folded together; the last update carrying a
    /// conversation id wins.
    pub fn from_updates(updates: Vec<ChatResponseUpdate>) -> Self {
        let mut contents: Vec<Content> = Vec::new();
        let mut role = ChatRole::Assistant;
        let mut author_name = None;
        let mut conversation_id = None;

        for update in updates {
            if let Some(update_role) = update.role {
                role = update_role;
            }
            if update.author_name.is_some() {
                author_name = update.author_name;
            }
            if update.conversation_id.is_some() {
                conversation_id = update.conversation_id;
            }
            for part in update.contents {
                let folded = match (contents.last_mut(), &part) {
                    (Some(Content::Text { text }), Content::Text { text: next }) => {
                        text.push_str(next);
                        true
                    }
                    _ => false,
                };
                if !folded {
                    contents.push(part);
                }
            }
        }

        let mut message = ChatMessage::from_contents(role, contents);
        message.author_name = author_name;
        Self {
            messages: vec![message],
            conversation_id,
            usage: None,
        }
    }

    /// Concatenated text of every response message.
    pub fn text(&self) -> String {
        self.messages
            .iter()
            .map(ChatMessage::text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One incremental piece of a streamed response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatResponseUpdate {
    /// Role of the message under construction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ChatRole>,
    /// Author of the message under construction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// New content parts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contents: Vec<Content>,
    /// Service-assigned conversation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

impl ChatResponseUpdate {
    /// Update carrying one text delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            contents: vec![Content::text(text)],
            ..Self::default()
        }
    }
}

/// Stream of response updates.
pub type ChatUpdateStream = Pin<Box<dyn Stream<Item = Result<ChatResponseUpdate>> + Send>>;

/// Chat-completion capability, implemented per provider.
///
/// Implementations must be `Send + Sync`; share them as
/// `Arc<dyn ChatClient>` across agents.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Produce a complete response for the given conversation.
    async fn respond(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<ChatResponse>;

    /// Stream a response incrementally.
    ///
    /// The default implementation performs a non-streaming request and
    /// yields one update per response message.
    async fn respond_streaming(
        &self,
        messages: Vec<ChatMessage>,
        options: &ChatOptions,
    ) -> Result<ChatUpdateStream> {
        let response = self.respond(messages, options).await?;
        let conversation_id = response.conversation_id;
        let total = response.messages.len();
        let updates: Vec<Result<ChatResponseUpdate>> = response
            .messages
            .into_iter()
            .enumerate()
            .map(|(index, message)| {
                Ok(ChatResponseUpdate {
                    role: Some(message.role),
                    author_name: message.author_name,
                    contents: message.contents,
                    conversation_id: if index + 1 == total {
                        conversation_id.clone()
                    } else {
                        None
                    },
                })
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(updates)))
    }
}
