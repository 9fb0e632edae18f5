//! # agentflow-core - Deterministic Agent Workflow Execution
//!
//! The graph model and superstep scheduler of the agentflow runtime: typed
//! message-processing executors composed into directed graphs and driven by
//! a deterministic message-delivery loop.
//!
//! ## Core Concepts
//!
//! ### Executors and envelopes
//!
//! An [`Executor`] is a unit of computation with a declared set of handled
//! payload types. Messages travel as [`Envelope`]s: opaque JSON payloads
//! tagged with a stable [`TypeId`], the producing executor, and an optional
//! explicit target. Declared-type dispatch replaces runtime reflection; the
//! closed set of types is known when the graph builds.
//!
//! ### Edges
//!
//! Routing is static: [`Edge::Direct`], [`Edge::FanOut`] (with an optional
//! pure partition selector), [`Edge::Switch`] (first matching case wins),
//! and fan-in joins ([`FanInEdge`]) that release a [`JoinBatch`] once every
//! source has contributed.
//!
//! ### Supersteps
//!
//! Execution advances in supersteps, following the Pregel discipline:
//!
//! 1. **Advance** - swap the next-step queue in.
//! 2. **Dispatch** - deliver each message to its executor, buffering all
//!    effects in a per-superstep transaction.
//! 3. **Commit** - apply state writes atomically, in executor-id order.
//! 4. **Route** - produce the new next-step queue from the edges.
//! 5. **Quiescence** - complete, idle, or await external input.
//!
//! Messages emitted in superstep *N* are delivered in *N+1*; no handler
//! observes another handler's uncommitted state. Two runs of the same
//! workflow over the same input produce the same output sequence.
//!
//! ### Runs
//!
//! [`WorkflowRunner::run_streaming`] spawns the loop and hands back a
//! [`WorkflowRun`]: a stream of [`WorkflowEvent`]s plus a [`RunHandle`] for
//! cancellation and for answering external requests. With checkpointing
//! configured, every superstep boundary is persisted and
//! [`WorkflowRunner::resume`] continues from the stored queue and state.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use agentflow_core::{ActionExecutor, WorkflowBuilder, WorkflowRunner};
//!
//! let upper = ActionExecutor::handling::<String, _>("upper", |text, ctx| {
//!     Box::pin(async move { ctx.send_message(&text.to_uppercase()) })
//! });
//! let emit = ActionExecutor::handling::<String, _>("emit", |text, ctx| {
//!     Box::pin(async move { ctx.yield_output(&text) })
//! });
//!
//! let workflow = WorkflowBuilder::new("shout")
//!     .start_with("upper")
//!     .add_action(upper)
//!     .add_action(emit)
//!     .direct("upper", "emit")
//!     .mark_output_producer("emit")
//!     .build()?;
//!
//! let run = WorkflowRunner::new().run_streaming(workflow, &"hi".to_string())?;
//! let (events, status) = run.drain().await;
//! ```

pub mod cancellation;
pub mod context;
pub mod edge;
pub mod envelope;
pub mod error;
pub mod events;
pub mod executor;
pub mod registry;
pub mod runner;
pub mod workflow;

pub use cancellation::CancellationToken;
pub use context::{StateScope, WorkflowContext};
pub use edge::{CorrelationFn, Edge, FanInEdge, FanOutAssigner, JoinPolicy, SwitchCase, SwitchPredicate};
pub use envelope::{Envelope, ExecutorId, JoinBatch, Payload, TypeId};
pub use error::{Result, WorkflowError};
pub use events::{CompletionReason, ExternalResponse, RequestId, RunStatus, WorkflowEvent};
pub use executor::{ActionExecutor, BoxHandlerFuture, Executor, HandlerFn};
pub use registry::MessageTypeRegistry;
pub use runner::{CheckpointingConfig, EventStream, RunHandle, WorkflowRun, WorkflowRunner};
pub use workflow::{ExecutorFactory, Workflow, WorkflowBuilder};
