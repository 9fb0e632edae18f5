//! The workflow context handed to executors.
//!
//! A [`WorkflowContext`] is created per handler invocation. Every effect a
//! handler produces (sends, events, outputs, state updates, external
//! requests, halt) is buffered here and applied by the scheduler as one
//! transaction at the end of the superstep. Reads see committed state
//! overlaid with this handler's own pending writes (program order), never
//! the uncommitted writes of another handler in the same superstep.
//!
//! The context is a cheap clonable handle: the scheduler keeps one clone to
//! collect the buffered effects after the handler returns, the handler
//! moves another into its future.

use crate::cancellation::CancellationToken;
use crate::envelope::{Envelope, ExecutorId, Payload};
use crate::error::{Result, WorkflowError};
use crate::events::{RequestId, WorkflowEvent};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Namespace for transactional state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateScope {
    /// An executor's private scope (the default for its own state access).
    Executor(ExecutorId),
    /// A named scope shared between executors of one workflow.
    Named(String),
}

impl StateScope {
    fn prefix(&self) -> &str {
        match self {
            Self::Executor(id) => id.as_str(),
            Self::Named(name) => name.as_str(),
        }
    }

    /// The storage key for `key` within this scope.
    pub(crate) fn storage_key(&self, key: &str) -> String {
        format!("{}/{}", self.prefix(), key)
    }
}

/// One buffered state mutation, kept in program order.
#[derive(Debug, Clone)]
pub(crate) enum StateWrite {
    Set { storage_key: String, value: Value },
    ClearScope { prefix: String },
}

/// An external request posted during a handler invocation.
#[derive(Debug, Clone)]
pub(crate) struct PendingRequest {
    pub request_id: RequestId,
    pub request: Value,
}

/// Buffered effects of one handler invocation.
#[derive(Debug, Default)]
pub(crate) struct ExecutorEffects {
    pub messages: Vec<Envelope>,
    pub events: Vec<WorkflowEvent>,
    pub outputs: Vec<Value>,
    pub state_writes: Vec<StateWrite>,
    pub requests: Vec<PendingRequest>,
    pub halt_requested: bool,
}

struct ContextInner {
    executor_id: ExecutorId,
    can_yield_output: bool,
    committed: Arc<BTreeMap<String, Value>>,
    cancellation: CancellationToken,
    effects: Mutex<ExecutorEffects>,
}

/// Per-invocation view of the run, exposed to executor handlers.
#[derive(Clone)]
pub struct WorkflowContext {
    inner: Arc<ContextInner>,
}

impl WorkflowContext {
    pub(crate) fn new(
        executor_id: ExecutorId,
        can_yield_output: bool,
        committed: Arc<BTreeMap<String, Value>>,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                executor_id,
                can_yield_output,
                committed,
                cancellation,
                effects: Mutex::new(ExecutorEffects::default()),
            }),
        }
    }

    fn effects(&self) -> MutexGuard<'_, ExecutorEffects> {
        self.inner
            .effects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Drain the buffered effects. Called by the scheduler once the handler
    /// has returned.
    pub(crate) fn take_effects(&self) -> ExecutorEffects {
        std::mem::take(&mut *self.effects())
    }

    /// Id of the executor this context belongs to.
    pub fn executor_id(&self) -> &ExecutorId {
        &self.inner.executor_id
    }

    /// The run's cancellation token, for cooperative checks at suspension
    /// points inside a handler.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancellation
    }

    /// Enqueue a message for edge-based routing after this superstep.
    pub fn send_message<T: Payload>(&self, payload: &T) -> Result<()> {
        let envelope = Envelope::of(payload, self.inner.executor_id.clone())?;
        self.effects().messages.push(envelope);
        Ok(())
    }

    /// Enqueue a message addressed to a specific executor, bypassing edges.
    pub fn send_message_to<T: Payload>(&self, payload: &T, target: ExecutorId) -> Result<()> {
        let envelope =
            Envelope::of(payload, self.inner.executor_id.clone())?.addressed_to(target);
        self.effects().messages.push(envelope);
        Ok(())
    }

    /// Raise a lifecycle event, observed by the run's stream consumer in
    /// emission order.
    pub fn add_event(&self, event: WorkflowEvent) {
        self.effects().events.push(event);
    }

    /// Yield a workflow output.
    ///
    /// Only valid for executors declared as output producers; the run
    /// completes once it reaches quiescence after at least one output.
    pub fn yield_output<T: Payload>(&self, value: &T) -> Result<()> {
        if !self.inner.can_yield_output {
            return Err(WorkflowError::configuration(format!(
                "executor '{}' is not a declared output producer",
                self.inner.executor_id
            )));
        }
        let value = serde_json::to_value(value)?;
        self.effects().outputs.push(value);
        Ok(())
    }

    /// Request cooperative termination after the current superstep.
    pub fn request_halt(&self) {
        self.effects().halt_requested = true;
    }

    /// Register a pending external request.
    ///
    /// The run cannot reach quiescence while the request is outstanding; the
    /// response arrives as an [`ExternalResponse`](crate::events::ExternalResponse)
    /// message addressed to this executor.
    pub fn post_external_request(&self, request: Value) -> RequestId {
        let request_id = RequestId::generate();
        self.effects().requests.push(PendingRequest {
            request_id: request_id.clone(),
            request,
        });
        request_id
    }

    fn resolve_scope(&self, scope: Option<&StateScope>) -> StateScope {
        scope
            .cloned()
            .unwrap_or_else(|| StateScope::Executor(self.inner.executor_id.clone()))
    }

    /// Read a state value. Sees committed state overlaid with this handler's
    /// pending writes.
    pub fn read_state<T: Payload>(&self, key: &str, scope: Option<&StateScope>) -> Result<Option<T>> {
        let scope = self.resolve_scope(scope);
        let storage_key = scope.storage_key(key);

        // Pending writes shadow committed state, latest first.
        {
            let effects = self.effects();
            for write in effects.state_writes.iter().rev() {
                match write {
                    StateWrite::Set { storage_key: k, value } if *k == storage_key => {
                        return Ok(Some(serde_json::from_value(value.clone())?));
                    }
                    StateWrite::ClearScope { prefix } if *prefix == scope.prefix() => {
                        return Ok(None);
                    }
                    _ => {}
                }
            }
        }

        match self.inner.committed.get(&storage_key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    /// Buffer a state update, committed atomically at the end of the
    /// superstep.
    pub fn queue_state_update<T: Payload>(
        &self,
        key: &str,
        value: &T,
        scope: Option<&StateScope>,
    ) -> Result<()> {
        let scope = self.resolve_scope(scope);
        let write = StateWrite::Set {
            storage_key: scope.storage_key(key),
            value: serde_json::to_value(value)?,
        };
        self.effects().state_writes.push(write);
        Ok(())
    }

    /// Buffer removal of every key in a scope.
    pub fn clear_scope(&self, scope: Option<&StateScope>) {
        let scope = self.resolve_scope(scope);
        self.effects().state_writes.push(StateWrite::ClearScope {
            prefix: scope.prefix().to_string(),
        });
    }

    /// List the keys visible in a scope, pending writes included.
    pub fn read_state_keys(&self, scope: Option<&StateScope>) -> Vec<String> {
        let scope = self.resolve_scope(scope);
        let prefix = format!("{}/", scope.prefix());

        let mut keys: BTreeSet<String> = self
            .inner
            .committed
            .keys()
            .filter_map(|k| k.strip_prefix(&prefix).map(str::to_string))
            .collect();

        let effects = self.effects();
        for write in &effects.state_writes {
            match write {
                StateWrite::Set { storage_key, .. } => {
                    if let Some(key) = storage_key.strip_prefix(&prefix) {
                        keys.insert(key.to_string());
                    }
                }
                StateWrite::ClearScope { prefix: cleared } if *cleared == scope.prefix() => {
                    keys.clear();
                }
                StateWrite::ClearScope { .. } => {}
            }
        }

        keys.into_iter().collect()
    }

    /// Read a state value, initializing it from `init` when absent.
    ///
    /// The initialization is buffered like any other write and becomes
    /// visible to other executors only after commit.
    pub fn read_or_init_state<T, F>(
        &self,
        key: &str,
        init: F,
        scope: Option<&StateScope>,
    ) -> Result<T>
    where
        T: Payload,
        F: FnOnce() -> T,
    {
        if let Some(existing) = self.read_state::<T>(key, scope)? {
            return Ok(existing);
        }
        let value = init();
        self.queue_state_update(key, &value, scope)?;
        Ok(value)
    }
}

impl std::fmt::Debug for WorkflowContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowContext")
            .field("executor_id", &self.inner.executor_id)
            .field("can_yield_output", &self.inner.can_yield_output)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(can_yield: bool) -> WorkflowContext {
        WorkflowContext::new(
            ExecutorId::from("worker"),
            can_yield,
            Arc::new(BTreeMap::new()),
            CancellationToken::new(),
        )
    }

    #[test]
    fn reads_observe_own_pending_writes_in_program_order() {
        let ctx = context(false);
        assert_eq!(ctx.read_state::<i64>("count", None).unwrap(), None);

        ctx.queue_state_update("count", &1i64, None).unwrap();
        assert_eq!(ctx.read_state::<i64>("count", None).unwrap(), Some(1));

        ctx.queue_state_update("count", &2i64, None).unwrap();
        assert_eq!(ctx.read_state::<i64>("count", None).unwrap(), Some(2));

        ctx.clear_scope(None);
        assert_eq!(ctx.read_state::<i64>("count", None).unwrap(), None);
        assert!(ctx.read_state_keys(None).is_empty());
    }

    #[test]
    fn committed_state_is_visible_under_the_right_scope() {
        let mut committed = BTreeMap::new();
        committed.insert("worker/seen".to_string(), serde_json::json!(true));
        committed.insert("shared/total".to_string(), serde_json::json!(7));

        let ctx = WorkflowContext::new(
            ExecutorId::from("worker"),
            false,
            Arc::new(committed),
            CancellationToken::new(),
        );

        assert_eq!(ctx.read_state::<bool>("seen", None).unwrap(), Some(true));
        let shared = StateScope::Named("shared".into());
        assert_eq!(
            ctx.read_state::<i64>("total", Some(&shared)).unwrap(),
            Some(7)
        );
        assert_eq!(ctx.read_state_keys(Some(&shared)), vec!["total"]);
    }

    #[test]
    fn read_or_init_buffers_the_initial_value() {
        let ctx = context(false);
        let first = ctx.read_or_init_state("ids", Vec::<String>::new, None).unwrap();
        assert!(first.is_empty());
        assert_eq!(ctx.read_state_keys(None), vec!["ids"]);
    }

    #[test]
    fn yield_output_requires_declaration() {
        let ctx = context(false);
        let err = ctx.yield_output(&"x".to_string()).unwrap_err();
        assert!(matches!(err, WorkflowError::Configuration(_)));

        let ctx = context(true);
        ctx.yield_output(&"x".to_string()).unwrap();
    }

    #[test]
    fn clones_share_the_effect_buffer() {
        let ctx = context(false);
        let clone = ctx.clone();
        clone.request_halt();
        assert!(ctx.take_effects().halt_requested);
    }
}
