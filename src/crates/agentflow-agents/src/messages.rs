//! Chat message types for conversational agents.
//!
//! A [`ChatMessage`] is an ordered list of typed content parts under a role.
//! The wire shape is fixed: roles serialize lowercase and every content part
//! carries a `type` tag (`text`, `data`, `uri`, `function_call`,
//! `function_result`, `error`, `reasoning`), which is what session
//! round-trips and the durable conversation log rely on.
//!
//! # Examples
//!
//! ```rust
//! use agentflow_agents::messages::{ChatMessage, Content};
//!
//! let question = ChatMessage::user("What's the weather in Oslo?");
//! let answer = ChatMessage::assistant("Partly cloudy, 14°C.")
//!     .with_author_name("forecaster");
//!
//! assert_eq!(answer.text(), "Partly cloudy, 14°C.");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Speaker of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions and constraints for the model.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
    /// Result of a tool invocation.
    Tool,
    /// Developer-supplied steering, distinct from system instructions.
    Developer,
}

/// One typed content part of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Content {
    /// Plain text.
    Text {
        /// The text.
        text: String,
    },
    /// Inline binary content addressed by a data URI.
    Data {
        /// Data URI carrying the content.
        uri: String,
        /// Media type of the content.
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    /// Content referenced by an external URI.
    Uri {
        /// Location of the content.
        uri: String,
        /// Media type of the content.
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
    /// A model-requested tool invocation.
    FunctionCall {
        /// Tool name.
        name: String,
        /// Correlates the call with its result.
        call_id: String,
        /// Tool arguments.
        arguments: Value,
    },
    /// The result of a tool invocation.
    FunctionResult {
        /// Id of the call this answers.
        call_id: String,
        /// Result value.
        value: Value,
    },
    /// An error surfaced as content.
    Error {
        /// Machine-readable error code.
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Human-readable message.
        message: String,
    },
    /// Model reasoning, kept separate from the answer text.
    Reasoning {
        /// The reasoning text.
        text: String,
    },
}

impl Content {
    /// Text content part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Function-call content part.
    pub fn function_call(
        name: impl Into<String>,
        call_id: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self::FunctionCall {
            name: name.into(),
            call_id: call_id.into(),
            arguments,
        }
    }

    /// Function-result content part.
    pub fn function_result(call_id: impl Into<String>, value: Value) -> Self {
        Self::FunctionResult {
            call_id: call_id.into(),
            value,
        }
    }
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who speaks.
    pub role: ChatRole,
    /// Display name of the author (e.g. the producing agent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_name: Option<String>,
    /// Ordered content parts.
    pub contents: Vec<Content>,
    /// Application metadata carried alongside the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, Value>>,
}

impl ChatMessage {
    /// Message with a role and a single text part.
    pub fn new(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            author_name: None,
            contents: vec![Content::text(text)],
            metadata: None,
        }
    }

    /// User message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(ChatRole::User, text)
    }

    /// Assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, text)
    }

    /// System message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(ChatRole::System, text)
    }

    /// Tool message carrying a function result.
    pub fn tool_result(call_id: impl Into<String>, value: Value) -> Self {
        Self {
            role: ChatRole::Tool,
            author_name: None,
            contents: vec![Content::function_result(call_id, value)],
            metadata: None,
        }
    }

    /// Message from raw content parts.
    pub fn from_contents(role: ChatRole, contents: Vec<Content>) -> Self {
        Self {
            role,
            author_name: None,
            contents,
            metadata: None,
        }
    }

    /// Set the author name.
    pub fn with_author_name(mut self, author_name: impl Into<String>) -> Self {
        self.author_name = Some(author_name.into());
        self
    }

    /// Concatenated text of every `Text` part.
    pub fn text(&self) -> String {
        self.contents
            .iter()
            .filter_map(|part| match part {
                Content::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    /// Every function call in the message, in order.
    pub fn function_calls(&self) -> Vec<(&str, &str, &Value)> {
        self.contents
            .iter()
            .filter_map(|part| match part {
                Content::FunctionCall {
                    name,
                    call_id,
                    arguments,
                } => Some((name.as_str(), call_id.as_str(), arguments)),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(ChatRole::Developer).unwrap(),
            serde_json::json!("developer")
        );
    }

    #[test]
    fn content_parts_carry_type_tags() {
        let call = Content::function_call("lookup", "call-1", serde_json::json!({"q": "x"}));
        let value = serde_json::to_value(&call).unwrap();
        assert_eq!(value["type"], "function_call");
        assert_eq!(value["call_id"], "call-1");

        let reasoning = Content::Reasoning {
            text: "thinking".into(),
        };
        assert_eq!(serde_json::to_value(&reasoning).unwrap()["type"], "reasoning");
    }

    #[test]
    fn messages_round_trip_with_parts_intact() {
        let message = ChatMessage::from_contents(
            ChatRole::Assistant,
            vec![
                Content::text("Calling a tool."),
                Content::function_call("search", "c1", serde_json::json!({})),
            ],
        )
        .with_author_name("researcher");

        let json = serde_json::to_string(&message).unwrap();
        let back: ChatMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, message);
        assert_eq!(back.function_calls().len(), 1);
    }

    #[test]
    fn text_concatenates_only_text_parts() {
        let message = ChatMessage::from_contents(
            ChatRole::Assistant,
            vec![
                Content::text("a"),
                Content::Reasoning { text: "hidden".into() },
                Content::text("b"),
            ],
        );
        assert_eq!(message.text(), "ab");
    }
}
