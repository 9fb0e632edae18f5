//! # agentflow-durable - Durable Session Entities
//!
//! One addressable entity per `(agentName, sessionKey)` pair, holding an
//! append-only conversation log and expiration metadata, with TTL eviction
//! driven by deferred self-signals.
//!
//! - [`DurableSessionHost`] hosts the entities in-process: operations are
//!   serialized per entity id, requests are idempotent on their correlation
//!   id, and scheduled deletion checks are delivered after in-flight runs
//!   return.
//! - [`DurableSessionOptions`] bounds the configuration: the minimum signal
//!   delay tops out at five minutes, the default time-to-live is 14 days,
//!   per-agent overrides win over the default, and `None` disables
//!   eviction.
//! - [`DurableStateStore`] abstracts persistence;
//!   [`InMemoryDurableStateStore`] is the reference implementation.
//!
//! Durable runs are not externally cancellable: once an operation is
//! dispatched it completes and persists, and cancellation surfaces only as
//! a failure at the caller.

pub mod clock;
pub mod entity;
pub mod error;
pub mod options;
pub mod state;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entity::{DurableSessionHost, RunRequest, RunResponse, StreamingSink};
pub use error::{DurableError, Result};
pub use options::{DurableSessionOptions, DEFAULT_TIME_TO_LIVE, MAX_SIGNAL_DELAY};
pub use state::{
    DurableSessionState, DurableStateStore, InMemoryDurableStateStore, LogEntry, LogPart,
    SessionEntityId,
};
