//! # agentflow-orchestration - Actor Runtime for Group Conversations
//!
//! An alternative backing for group chats and handoffs: instead of a
//! compiled workflow graph, one manager actor and one actor per
//! participating agent exchange messages on an in-process topic bus.
//!
//! - [`TopicBus`] / [`ActorMessage`] - the pub/sub fabric
//!   (`InputTask`, `Group`, `Speak`, `Result`).
//! - [`GroupOrchestration`] - spawns the actors and returns an
//!   [`AgentResponseHandle`] for non-blocking callers: status updates while
//!   the conversation runs, a terminal [`ActorResponse`] when done.
//! - [`RoundRobinManager`] and [`RuleBasedManager`] - the bundled
//!   [`OrchestrationManager`] strategies.
//! - [`ConversationCache`] - the in-memory conversation store used by
//!   OpenAI-compatible host shims: ordered items, duplicate-id rejection,
//!   cursor listing, TTL touched on every mutation.

pub mod actors;
pub mod bus;
pub mod cache;
pub mod error;
pub mod handle;

pub use actors::{
    GroupOrchestration, HumanInputCallback, OrchestrationManager, RoundRobinManager,
    RuleBasedManager,
};
pub use bus::{ActorMessage, TopicBus};
pub use cache::{ConversationCache, ConversationItem, ListOrder, ListPage};
pub use error::{OrchestrationError, Result};
pub use handle::{ActorResponse, AgentResponseHandle, OrchestrationStatus};
