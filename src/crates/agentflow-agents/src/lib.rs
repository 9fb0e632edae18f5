//! # agentflow-agents - Chat Agents over the Workflow Runtime
//!
//! Everything between the workflow engine and an LLM provider:
//!
//! - **Messages** - [`ChatMessage`] with typed, tagged content parts
//!   (`text`, `function_call`, `reasoning`, ...).
//! - **Clients** - the provider-agnostic [`ChatClient`] trait plus
//!   [`ChatOptions`] merging. agentflow orchestrates; it is not an LLM
//!   client library.
//! - **Sessions** - [`AgentSession`], per-conversation state under exactly
//!   one discipline: a service-held conversation id, or a locally owned
//!   [`ChatMessageStore`]. Serialized to a single-key JSON object.
//! - **Providers** - [`ChatHistoryProvider`] and [`ContextProvider`] hooks
//!   around each invocation, persisting their own state in the session's
//!   state bag under unique state keys.
//! - **Agents** - [`ChatAgent`] with the seven-step invocation pipeline
//!   (merge options, merge history, fold context providers, call, notify,
//!   reconcile conversation id).
//! - **Compositions** - sequential, concurrent, handoff, and group-chat
//!   builders producing plain [`Workflow`](agentflow_core::Workflow)s.
//!
//! ## Example
//!
//! ```rust,ignore
//! use agentflow_agents::{build_sequential, AgentConversation, ChatAgent};
//! use agentflow_core::WorkflowRunner;
//!
//! let writer = Arc::new(ChatAgent::builder("writer", client.clone())
//!     .instructions("Draft the answer.")
//!     .build()?);
//! let editor = Arc::new(ChatAgent::builder("editor", client)
//!     .instructions("Tighten the draft.")
//!     .build()?);
//!
//! let workflow = build_sequential(vec![writer, editor], None)?;
//! let run = WorkflowRunner::new()
//!     .run_streaming(workflow, &AgentConversation::user("Explain supersteps"))?;
//! ```

pub mod agent;
pub mod client;
pub mod compositions;
pub mod error;
pub mod executors;
pub mod messages;
pub mod providers;
pub mod session;

pub use agent::{AgentRunResponse, ChatAgent, ChatAgentBuilder};
pub use client::{
    ChatClient, ChatOptions, ChatResponse, ChatResponseUpdate, ChatUpdateStream, ToolDefinition,
    UsageStats,
};
pub use compositions::{
    build_concurrent, build_sequential, ConcurrentAggregator, GroupChatBuilder, GroupChatManager,
    HandoffBuilder, ManagerFactory, RoundRobinGroupChatManager,
};
pub use error::{AgentError, Result};
pub use executors::{
    AgentConversation, AgentExecutor, HandoffRecord, ParticipantOutput, SpeakRequest, TurnToken,
};
pub use messages::{ChatMessage, ChatRole, Content};
pub use providers::{AiContext, ChatHistoryProvider, ContextProvider, InMemoryHistoryProvider};
pub use session::{AgentSession, ChatMessageStore, InMemoryChatMessageStore, SessionStorage};
