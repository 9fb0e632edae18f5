//! Canonical agent compositions.
//!
//! Four proven multi-agent shapes, each compiled down to a plain
//! [`Workflow`](agentflow_core::Workflow):
//!
//! - [`build_sequential`](sequential::build_sequential) - a pipeline where
//!   every agent sees the prior output list including the original input.
//! - [`build_concurrent`](concurrent::build_concurrent) - fan-out to every
//!   participant, fan-in once each has answered, aggregate.
//! - [`HandoffBuilder`](handoff::HandoffBuilder) - the active agent picks
//!   its successor by invoking a handoff tool; no handoff ends the chat.
//! - [`GroupChatBuilder`](group_chat::GroupChatBuilder) - a host executor
//!   whose manager picks the next speaker each iteration.

pub mod concurrent;
pub mod group_chat;
pub mod handoff;
pub mod sequential;

pub use concurrent::{build_concurrent, ConcurrentAggregator};
pub use group_chat::{
    GroupChatBuilder, GroupChatManager, ManagerFactory, RoundRobinGroupChatManager,
};
pub use handoff::HandoffBuilder;
pub use sequential::build_sequential;
