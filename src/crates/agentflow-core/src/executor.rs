//! Executors: the units of computation in a workflow graph.
//!
//! An executor declares the payload types it handles and reacts to delivered
//! envelopes by producing effects through its [`WorkflowContext`]. The graph
//! registers factories, not instances; a run owns fresh instances created on
//! first delivery.
//!
//! Specialization is by composition: [`ActionExecutor`] carries a handler
//! closure, and richer executors (agent wrappers, hosts, aggregators) are
//! their own concrete types implementing [`Executor`].

use crate::context::WorkflowContext;
use crate::envelope::{Envelope, ExecutorId, Payload, TypeId};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by handler closures. The context travels into the
/// future by value (it is a clonable handle), so no borrows are involved.
pub type BoxHandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Raw handler closure over an undecoded envelope.
pub type HandlerFn = Arc<dyn Fn(Envelope, WorkflowContext) -> BoxHandlerFuture + Send + Sync>;

/// A message handler registered in a workflow graph.
#[async_trait]
pub trait Executor: Send {
    /// Stable identifier of this executor within its workflow.
    fn id(&self) -> &ExecutorId;

    /// Payload types this executor handles. Non-empty unless the executor is
    /// an external-input sink (enforced when the workflow builds).
    fn input_types(&self) -> HashSet<TypeId>;

    /// Payload types this executor may emit. Advisory; used for
    /// introspection and tooling.
    fn output_types(&self) -> HashSet<TypeId> {
        HashSet::new()
    }

    /// Handle one delivered envelope. Effects go through `ctx` and commit at
    /// the end of the superstep; an error is a handler fault.
    async fn handle(&mut self, envelope: Envelope, ctx: WorkflowContext) -> Result<()>;

    /// Clear internal state. Called when a composition resets its workflow.
    fn reset(&mut self) {}
}

/// Closure-backed executor.
///
/// The workhorse of compositions and tests: a declared input set plus a
/// handler, with no subclassing involved.
///
/// # Example
///
/// ```rust,ignore
/// let upper = ActionExecutor::handling::<String, _>("upper", |text, ctx| {
///     Box::pin(async move { ctx.send_message(&text.to_uppercase()) })
/// });
/// ```
#[derive(Clone)]
pub struct ActionExecutor {
    id: ExecutorId,
    input_types: HashSet<TypeId>,
    output_types: HashSet<TypeId>,
    handler: HandlerFn,
}

impl ActionExecutor {
    /// Create an executor from a raw envelope handler with no declared
    /// inputs yet; chain [`accepts`](Self::accepts) to declare them.
    pub fn new(id: impl Into<ExecutorId>, handler: HandlerFn) -> Self {
        Self {
            id: id.into(),
            input_types: HashSet::new(),
            output_types: HashSet::new(),
            handler,
        }
    }

    /// Create an executor handling exactly one payload type, decoded before
    /// the closure runs. A payload of any other type is a handler fault.
    pub fn handling<T, F>(id: impl Into<ExecutorId>, handler: F) -> Self
    where
        T: Payload,
        F: Fn(T, WorkflowContext) -> BoxHandlerFuture + Send + Sync + 'static,
    {
        let raw: HandlerFn = Arc::new(move |envelope: Envelope, ctx: WorkflowContext| {
            match envelope.payload_as::<T>() {
                Ok(payload) => handler(payload, ctx),
                Err(err) => Box::pin(async move { Err(err) }),
            }
        });
        Self::new(id, raw).accepts::<T>()
    }

    /// Declare an additional handled input type.
    pub fn accepts<T: Payload>(mut self) -> Self {
        self.input_types.insert(TypeId::of::<T>());
        self
    }

    /// Declare an emitted output type.
    pub fn emits<T: Payload>(mut self) -> Self {
        self.output_types.insert(TypeId::of::<T>());
        self
    }

    /// Turn this executor into a factory producing clones of itself.
    ///
    /// Suitable for stateless actions; stateful executors should register a
    /// factory that builds a fresh instance instead.
    pub fn into_factory(self) -> impl Fn() -> Box<dyn Executor> + Send + Sync + 'static {
        move || Box::new(self.clone()) as Box<dyn Executor>
    }
}

#[async_trait]
impl Executor for ActionExecutor {
    fn id(&self) -> &ExecutorId {
        &self.id
    }

    fn input_types(&self) -> HashSet<TypeId> {
        self.input_types.clone()
    }

    fn output_types(&self) -> HashSet<TypeId> {
        self.output_types.clone()
    }

    async fn handle(&mut self, envelope: Envelope, ctx: WorkflowContext) -> Result<()> {
        (self.handler)(envelope, ctx).await
    }
}

impl std::fmt::Debug for ActionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionExecutor")
            .field("id", &self.id)
            .field("input_types", &self.input_types)
            .field("output_types", &self.output_types)
            .finish()
    }
}
