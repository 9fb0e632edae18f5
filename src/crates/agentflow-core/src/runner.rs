//! The superstep scheduler.
//!
//! A run advances one superstep at a time: the next-step queue is swapped
//! in, every queued message is dispatched to its executor, the buffered
//! effects are committed as one transaction, routing produces the new
//! next-step queue, and quiescence is checked. Messages emitted in superstep
//! *N* are delivered in *N+1*, never within *N*.
//!
//! The loop runs as a single task; handlers are cooperative coroutines and
//! all scheduler bookkeeping is serialized against them. Determinism falls
//! out of stable dispatch order plus executor-id-ordered state commits.

use crate::cancellation::CancellationToken;
use crate::context::{ExecutorEffects, StateWrite};
use crate::envelope::{Envelope, ExecutorId, JoinBatch, Payload, TypeId};
use crate::error::{Result, WorkflowError};
use crate::events::{CompletionReason, ExternalResponse, RequestId, RunStatus, WorkflowEvent};
use crate::edge::{Edge, FanInEdge, JoinPolicy};
use crate::executor::Executor;
use crate::registry::MessageTypeRegistry;
use crate::workflow::Workflow;
use agentflow_checkpoint::{CheckpointStore, QueuedDelivery, RunCheckpoint, StoredEnvelope, StoredRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

/// Reserved state key holding serialized fan-in buffers inside a checkpoint.
const JOIN_BUFFER_STATE_KEY: &str = "__join__/buffers";

/// Stream of [`WorkflowEvent`]s for one run.
pub type EventStream = UnboundedReceiverStream<WorkflowEvent>;

/// Checkpointing configuration: where snapshots go and how payloads map to
/// durable type names.
#[derive(Clone)]
pub struct CheckpointingConfig {
    store: Arc<dyn CheckpointStore>,
    registry: Arc<MessageTypeRegistry>,
}

/// Entry point for executing workflows.
#[derive(Clone, Default)]
pub struct WorkflowRunner {
    checkpointing: Option<CheckpointingConfig>,
}

impl WorkflowRunner {
    /// Runner without checkpointing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable superstep checkpointing.
    pub fn with_checkpointing(
        mut self,
        store: Arc<dyn CheckpointStore>,
        registry: Arc<MessageTypeRegistry>,
    ) -> Self {
        self.checkpointing = Some(CheckpointingConfig { store, registry });
        self
    }

    /// Start a run with `input` delivered to the workflow's starting
    /// executor in superstep 0.
    pub fn run_streaming<T: Payload>(&self, workflow: Workflow, input: &T) -> Result<WorkflowRun> {
        let starting = workflow.starting_executor().clone();
        if let Some(inputs) = workflow.declared_inputs(&starting) {
            if !inputs.is_empty() && !inputs.contains(&TypeId::of::<T>()) {
                return Err(WorkflowError::routing(format!(
                    "starting executor '{starting}' does not handle input type '{}'",
                    TypeId::of::<T>()
                )));
            }
        }
        let envelope = Envelope::of(input, ExecutorId::external())?;
        let delivery = Delivery {
            target: starting,
            envelope,
        };
        Ok(self.spawn(workflow, RunSeed::fresh(vec![delivery])))
    }

    /// Resume a run from a previously saved superstep boundary.
    ///
    /// Requires checkpointing to be configured: the same type registry that
    /// encoded the checkpoint decodes its queue.
    pub fn resume(&self, workflow: Workflow, checkpoint: RunCheckpoint) -> Result<WorkflowRun> {
        let config = self.checkpointing.as_ref().ok_or_else(|| {
            WorkflowError::configuration("resume requires a checkpoint store and type registry")
        })?;

        let mut queue = Vec::with_capacity(checkpoint.queue.len());
        for entry in checkpoint.queue {
            queue.push(Delivery {
                target: ExecutorId::from(entry.target),
                envelope: config.registry.decode(entry.envelope)?,
            });
        }

        let mut committed = checkpoint.state;
        let join_buffers = match committed.remove(JOIN_BUFFER_STATE_KEY) {
            Some(raw) => decode_join_buffers(raw, &config.registry)?,
            None => HashMap::new(),
        };

        let mut pending_requests = BTreeMap::new();
        for request in checkpoint.pending_requests {
            pending_requests.insert(
                RequestId::from(request.request_id),
                (ExecutorId::from(request.executor_id), request.request),
            );
        }

        Ok(self.spawn(
            workflow,
            RunSeed {
                run_id: checkpoint.run_id,
                queue,
                committed,
                pending_requests,
                join_buffers,
                superstep: checkpoint.superstep + 1,
                events_emitted: checkpoint.events_emitted,
            },
        ))
    }

    fn spawn(&self, workflow: Workflow, seed: RunSeed) -> WorkflowRun {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(RunStatus::Created);
        let cancellation = CancellationToken::new();

        let handle = RunHandle {
            run_id: seed.run_id.clone(),
            commands: commands_tx,
            status: status_rx,
            cancellation: cancellation.clone(),
        };

        let run_loop = RunLoop {
            workflow,
            run_id: seed.run_id,
            instances: HashMap::new(),
            committed: seed.committed,
            next_queue: seed.queue,
            join_buffers: seed.join_buffers,
            pending_requests: seed.pending_requests,
            superstep: seed.superstep,
            events_emitted: seed.events_emitted,
            output_yielded: false,
            halt_requested: false,
            events_tx,
            commands_rx,
            status_tx,
            cancellation,
            checkpointing: self.checkpointing.clone(),
        };
        tokio::spawn(run_loop.run());

        WorkflowRun {
            handle,
            events: UnboundedReceiverStream::new(events_rx),
        }
    }
}

/// A live workflow run: its control handle plus its event stream.
pub struct WorkflowRun {
    handle: RunHandle,
    events: EventStream,
}

impl WorkflowRun {
    /// Clone the control handle.
    pub fn handle(&self) -> RunHandle {
        self.handle.clone()
    }

    /// The event stream, for manual consumption.
    pub fn events(&mut self) -> &mut EventStream {
        &mut self.events
    }

    /// Split into handle and stream.
    pub fn into_parts(self) -> (RunHandle, EventStream) {
        (self.handle, self.events)
    }

    /// Next event, or `None` once the run has shut its stream.
    pub async fn next_event(&mut self) -> Option<WorkflowEvent> {
        self.events.next().await
    }

    /// Consume every event until the stream closes and return them together
    /// with the final run status. Only sensible for runs that terminate.
    pub async fn drain(mut self) -> (Vec<WorkflowEvent>, RunStatus) {
        let mut events = Vec::new();
        while let Some(event) = self.events.next().await {
            events.push(event);
        }
        let status = self.handle.join().await;
        (events, status)
    }
}

/// Clonable control surface of a run.
#[derive(Clone)]
pub struct RunHandle {
    run_id: String,
    commands: mpsc::UnboundedSender<RunCommand>,
    status: watch::Receiver<RunStatus>,
    cancellation: CancellationToken,
}

impl RunHandle {
    /// Identifier of the run (also the checkpoint key).
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Current run status.
    pub fn status(&self) -> RunStatus {
        *self.status.borrow()
    }

    /// Request cancellation. Observed between supersteps and inside
    /// cooperative handlers.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Satisfy an outstanding external request, re-enabling progress.
    ///
    /// Fails when the run is no longer accepting input; an id that matches
    /// no outstanding request is ignored by the run (with a warning).
    pub fn provide_external_response(&self, request_id: RequestId, payload: Value) -> Result<()> {
        self.commands
            .send(RunCommand::ProvideResponse {
                request_id: request_id.clone(),
                payload,
            })
            .map_err(|_| WorkflowError::UnknownRequest {
                request_id: request_id.to_string(),
            })
    }

    /// Wait until the run reaches a state it cannot leave on its own.
    pub async fn join(&self) -> RunStatus {
        let mut status = self.status.clone();
        loop {
            let current = *status.borrow();
            if current.is_terminal() {
                return current;
            }
            if status.changed().await.is_err() {
                return *status.borrow();
            }
        }
    }
}

enum RunCommand {
    ProvideResponse { request_id: RequestId, payload: Value },
}

struct Delivery {
    target: ExecutorId,
    envelope: Envelope,
}

struct RunSeed {
    run_id: String,
    queue: Vec<Delivery>,
    committed: BTreeMap<String, Value>,
    pending_requests: BTreeMap<RequestId, (ExecutorId, Value)>,
    join_buffers: JoinBuffers,
    superstep: u64,
    events_emitted: u64,
}

impl RunSeed {
    fn fresh(queue: Vec<Delivery>) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            queue,
            committed: BTreeMap::new(),
            pending_requests: BTreeMap::new(),
            join_buffers: HashMap::new(),
            superstep: 0,
            events_emitted: 0,
        }
    }
}

/// Fan-in buffers: per fan-in edge index, per correlation key, per source.
type JoinBuffers = HashMap<usize, HashMap<String, HashMap<ExecutorId, VecDeque<Envelope>>>>;

/// Serialized form of one buffered fan-in message queue, kept inside the
/// checkpoint state under [`JOIN_BUFFER_STATE_KEY`].
#[derive(Serialize, Deserialize)]
struct StoredJoinQueue {
    edge: usize,
    key: String,
    source: String,
    envelopes: Vec<StoredEnvelope>,
}

enum StepOutcome {
    Continue,
    Failed(WorkflowError),
    CancelledInHandler,
}

struct RunLoop {
    workflow: Workflow,
    run_id: String,
    instances: HashMap<ExecutorId, Box<dyn Executor>>,
    committed: BTreeMap<String, Value>,
    next_queue: Vec<Delivery>,
    join_buffers: JoinBuffers,
    pending_requests: BTreeMap<RequestId, (ExecutorId, Value)>,
    superstep: u64,
    events_emitted: u64,
    output_yielded: bool,
    halt_requested: bool,
    events_tx: mpsc::UnboundedSender<WorkflowEvent>,
    commands_rx: mpsc::UnboundedReceiver<RunCommand>,
    status_tx: watch::Sender<RunStatus>,
    cancellation: CancellationToken,
    checkpointing: Option<CheckpointingConfig>,
}

impl RunLoop {
    async fn run(mut self) {
        self.set_status(RunStatus::Running);
        loop {
            // Superstep boundaries are suspension points even when every
            // handler completes synchronously.
            tokio::task::yield_now().await;
            self.drain_commands();

            // Cancellation between supersteps: the pending step never runs.
            if self.cancellation.is_cancelled() {
                tracing::debug!(run_id = %self.run_id, "cancellation observed between supersteps");
                self.set_status(RunStatus::Cancelled);
                return;
            }

            if self.next_queue.is_empty() {
                if !self.pending_requests.is_empty() {
                    self.set_status(RunStatus::AwaitingExternalInput);
                    tokio::select! {
                        command = self.commands_rx.recv() => match command {
                            Some(command) => {
                                self.apply_command(command);
                                self.set_status(RunStatus::Running);
                                continue;
                            }
                            // Every handle is gone; no response can arrive.
                            None => return,
                        },
                        _ = self.cancellation.cancelled() => {
                            self.set_status(RunStatus::Cancelled);
                            return;
                        }
                    }
                }

                if self.output_yielded {
                    self.emit(WorkflowEvent::WorkflowCompleted {
                        reason: CompletionReason::OutputYielded,
                    });
                    self.set_status(RunStatus::Completed);
                } else {
                    self.set_status(RunStatus::Idle);
                }
                return;
            }

            match self.execute_superstep().await {
                StepOutcome::Continue => {}
                StepOutcome::Failed(error) => {
                    self.emit(WorkflowEvent::WorkflowFailed {
                        error: error.to_string(),
                    });
                    self.set_status(RunStatus::Failed);
                    return;
                }
                StepOutcome::CancelledInHandler => {
                    self.set_status(RunStatus::Cancelled);
                    return;
                }
            }

            // Halt ends the run right after the superstep that requested it,
            // even with messages already routed for the next one.
            if self.halt_requested {
                self.emit(WorkflowEvent::WorkflowCompleted {
                    reason: CompletionReason::HaltRequested,
                });
                self.set_status(RunStatus::Halted);
                return;
            }
        }
    }

    async fn execute_superstep(&mut self) -> StepOutcome {
        // Advance: swap in the current-step queue.
        let current = std::mem::take(&mut self.next_queue);
        let committed_snapshot = Arc::new(self.committed.clone());
        let mut batch: Vec<(ExecutorId, ExecutorEffects)> = Vec::new();
        let mut failure: Option<WorkflowError> = None;
        let mut cancelled_in_handler = false;

        tracing::debug!(
            run_id = %self.run_id,
            superstep = self.superstep,
            queued = current.len(),
            "superstep starting"
        );

        // Dispatch, in stable queue order.
        for Delivery { target, envelope } in current {
            if !self.instances.contains_key(&target) {
                match self.workflow.create_instance(&target) {
                    Some(instance) => {
                        self.instances.insert(target.clone(), instance);
                    }
                    None => {
                        let error =
                            WorkflowError::routing(format!("executor '{target}' is not registered"));
                        if failure.is_none() {
                            failure = Some(error);
                        }
                        continue;
                    }
                }
            }

            self.emit(WorkflowEvent::ExecutorInvoked {
                executor_id: target.clone(),
            });
            let ctx = crate::context::WorkflowContext::new(
                target.clone(),
                self.workflow.is_output_producer(&target),
                committed_snapshot.clone(),
                self.cancellation.clone(),
            );
            let instance = self
                .instances
                .get_mut(&target)
                .expect("instance inserted above");

            match instance.handle(envelope, ctx.clone()).await {
                Ok(()) => {
                    let effects = ctx.take_effects();
                    for event in &effects.events {
                        self.emit(event.clone());
                    }
                    self.emit(WorkflowEvent::ExecutorCompleted {
                        executor_id: target.clone(),
                        data: completed_data(&effects),
                    });
                    batch.push((target, effects));
                }
                Err(error) => {
                    // The faulting handler's effects are discarded; other
                    // handlers of this superstep still run.
                    let cancelled = error.is_cancellation() || self.cancellation.is_cancelled();
                    cancelled_in_handler |= cancelled;
                    tracing::warn!(
                        run_id = %self.run_id,
                        executor = %target,
                        error = %error,
                        "handler fault"
                    );
                    self.emit(WorkflowEvent::ExecutorFailed {
                        executor_id: target.clone(),
                        error: error.to_string(),
                    });
                    if failure.is_none() && !cancelled {
                        failure = Some(WorkflowError::handler(
                            target.to_string(),
                            error.to_string(),
                        ));
                    }
                }
            }
        }

        // Commit state atomically, in executor-id order for determinism.
        let mut by_executor: Vec<&(ExecutorId, ExecutorEffects)> = batch.iter().collect();
        by_executor.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, effects) in by_executor {
            apply_state_writes(&mut self.committed, effects);
        }

        // Outputs, halt requests, and external requests, in dispatch order.
        for (executor_id, effects) in &batch {
            for output in &effects.outputs {
                self.output_yielded = true;
                self.emit(WorkflowEvent::WorkflowOutput {
                    value: output.clone(),
                });
            }
            if effects.halt_requested {
                self.halt_requested = true;
                self.emit(WorkflowEvent::RequestHalt {
                    executor_id: executor_id.clone(),
                });
            }
            for request in &effects.requests {
                self.pending_requests.insert(
                    request.request_id.clone(),
                    (executor_id.clone(), request.request.clone()),
                );
                self.emit(WorkflowEvent::RequestInfo {
                    request_id: request.request_id.clone(),
                    executor_id: executor_id.clone(),
                    request: request.request.clone(),
                });
            }
        }

        // Route queued messages into the next-step queue.
        for (_, effects) in &batch {
            for envelope in &effects.messages {
                if let Err(error) = self.route(envelope.clone()) {
                    if failure.is_none() {
                        failure = Some(error);
                    }
                }
            }
        }

        self.emit(WorkflowEvent::SuperstepCompleted {
            superstep: self.superstep,
        });

        if let Some(config) = self.checkpointing.clone() {
            if let Err(error) = self.save_checkpoint(&config).await {
                if failure.is_none() {
                    failure = Some(error);
                }
            }
        }
        self.superstep += 1;

        if cancelled_in_handler {
            return StepOutcome::CancelledInHandler;
        }
        if let Some(error) = failure {
            return StepOutcome::Failed(error);
        }
        StepOutcome::Continue
    }

    /// Apply routing rules to one queued message: an explicit target wins,
    /// then the source's edges, then fan-in joins.
    fn route(&mut self, envelope: Envelope) -> Result<()> {
        if let Some(target) = envelope.target.clone() {
            let inputs = self.workflow.declared_inputs(&target).ok_or_else(|| {
                WorkflowError::routing(format!("directed send to unregistered executor '{target}'"))
            })?;
            if !inputs.contains(&envelope.type_id) {
                return Err(WorkflowError::routing(format!(
                    "executor '{target}' does not handle directed payload '{}'",
                    envelope.type_id
                )));
            }
            self.enqueue(target, envelope);
            return Ok(());
        }

        let source = envelope.source.clone();
        let edges: Vec<Edge> = self.workflow.edges_from(&source).to_vec();
        let fan_ins: Vec<FanInEdge> = self.workflow.fan_ins().to_vec();
        let mut routed = false;

        for edge in &edges {
            match edge {
                Edge::Direct { target } => {
                    self.enqueue(target.clone(), envelope.clone());
                    routed = true;
                }
                Edge::FanOut { targets, assigner } => {
                    let indices: Vec<usize> = match assigner {
                        Some(assigner) => assigner(&envelope, targets.len()),
                        None => (0..targets.len()).collect(),
                    };
                    for index in indices {
                        match targets.get(index) {
                            Some(target) => self.enqueue(target.clone(), envelope.clone()),
                            None => tracing::warn!(
                                source = %source,
                                index,
                                targets = targets.len(),
                                "fan-out assigner returned an out-of-range index"
                            ),
                        }
                    }
                    routed = true;
                }
                Edge::Switch { cases, default } => {
                    let case_target = cases
                        .iter()
                        .find(|case| (case.predicate)(&envelope))
                        .map(|case| case.target.clone());
                    match case_target.or_else(|| default.clone()) {
                        Some(target) => {
                            self.enqueue(target, envelope.clone());
                            routed = true;
                        }
                        None => {
                            return Err(WorkflowError::routing(format!(
                                "switch from '{source}' matched no case and has no default"
                            )));
                        }
                    }
                }
            }
        }

        for (index, fan_in) in fan_ins.iter().enumerate() {
            if !fan_in.sources.contains(&source) {
                continue;
            }
            routed = true;
            let key = match &fan_in.join {
                JoinPolicy::AllSources => String::new(),
                JoinPolicy::CorrelationKey(extract) => extract(&envelope),
            };
            let by_source = self
                .join_buffers
                .entry(index)
                .or_default()
                .entry(key.clone())
                .or_default();
            by_source
                .entry(source.clone())
                .or_default()
                .push_back(envelope.clone());

            let satisfied = fan_in
                .sources
                .iter()
                .all(|s| by_source.get(s).is_some_and(|queue| !queue.is_empty()));
            if satisfied {
                let mut items = Vec::with_capacity(fan_in.sources.len());
                for s in &fan_in.sources {
                    if let Some(item) = by_source.get_mut(s).and_then(VecDeque::pop_front) {
                        items.push(item);
                    }
                }
                let release = Envelope::of(&JoinBatch { items }, source.clone())?;
                self.enqueue(fan_in.target.clone(), release);
            }
        }

        if !routed {
            self.emit(WorkflowEvent::UnroutedMessage { source });
        }
        Ok(())
    }

    fn enqueue(&mut self, target: ExecutorId, envelope: Envelope) {
        self.emit(WorkflowEvent::MessageSend {
            source: envelope.source.clone(),
            target: target.clone(),
        });
        self.next_queue.push(Delivery { target, envelope });
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands_rx.try_recv() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: RunCommand) {
        match command {
            RunCommand::ProvideResponse {
                request_id,
                payload,
            } => match self.pending_requests.remove(&request_id) {
                Some((executor_id, _)) => {
                    let response = ExternalResponse {
                        request_id,
                        payload,
                    };
                    match Envelope::of(&response, ExecutorId::external()) {
                        Ok(envelope) => self.next_queue.push(Delivery {
                            target: executor_id,
                            envelope,
                        }),
                        Err(error) => tracing::warn!(error = %error, "failed to encode external response"),
                    }
                }
                None => tracing::warn!(
                    request_id = %request_id,
                    "response for unknown external request ignored"
                ),
            },
        }
    }

    async fn save_checkpoint(&mut self, config: &CheckpointingConfig) -> Result<()> {
        let mut checkpoint = RunCheckpoint::new(self.run_id.clone());
        checkpoint.superstep = self.superstep;
        checkpoint.events_emitted = self.events_emitted;
        checkpoint.state = self.committed.clone();

        for delivery in &self.next_queue {
            checkpoint.queue.push(QueuedDelivery {
                target: delivery.target.to_string(),
                envelope: config.registry.encode(&delivery.envelope)?,
            });
        }
        for (request_id, (executor_id, request)) in &self.pending_requests {
            checkpoint.pending_requests.push(StoredRequest {
                request_id: request_id.to_string(),
                executor_id: executor_id.to_string(),
                request: request.clone(),
            });
        }
        if !self.join_buffers.is_empty() {
            checkpoint.state.insert(
                JOIN_BUFFER_STATE_KEY.to_string(),
                encode_join_buffers(&self.join_buffers, &config.registry)?,
            );
        }

        config.store.put(checkpoint).await?;
        Ok(())
    }

    fn emit(&mut self, event: WorkflowEvent) {
        self.events_emitted += 1;
        let _ = self.events_tx.send(event);
    }

    fn set_status(&self, status: RunStatus) {
        let _ = self.status_tx.send(status);
    }
}

fn completed_data(effects: &ExecutorEffects) -> Option<Value> {
    effects
        .messages
        .last()
        .map(|envelope| envelope.payload.clone())
        .or_else(|| effects.outputs.last().cloned())
}

fn apply_state_writes(committed: &mut BTreeMap<String, Value>, effects: &ExecutorEffects) {
    for write in &effects.state_writes {
        match write {
            StateWrite::Set { storage_key, value } => {
                committed.insert(storage_key.clone(), value.clone());
            }
            StateWrite::ClearScope { prefix } => {
                let prefix = format!("{prefix}/");
                committed.retain(|key, _| !key.starts_with(&prefix));
            }
        }
    }
}

fn encode_join_buffers(buffers: &JoinBuffers, registry: &MessageTypeRegistry) -> Result<Value> {
    let mut stored = Vec::new();
    for (edge, by_key) in buffers {
        for (key, by_source) in by_key {
            for (source, queue) in by_source {
                if queue.is_empty() {
                    continue;
                }
                let envelopes = queue
                    .iter()
                    .map(|envelope| registry.encode(envelope))
                    .collect::<Result<Vec<_>>>()?;
                stored.push(StoredJoinQueue {
                    edge: *edge,
                    key: key.clone(),
                    source: source.to_string(),
                    envelopes,
                });
            }
        }
    }
    stored.sort_by(|a, b| (a.edge, &a.key, &a.source).cmp(&(b.edge, &b.key, &b.source)));
    Ok(serde_json::to_value(stored)?)
}

fn decode_join_buffers(raw: Value, registry: &MessageTypeRegistry) -> Result<JoinBuffers> {
    let stored: Vec<StoredJoinQueue> = serde_json::from_value(raw)?;
    let mut buffers: JoinBuffers = HashMap::new();
    for entry in stored {
        let queue = entry
            .envelopes
            .into_iter()
            .map(|envelope| registry.decode(envelope))
            .collect::<Result<VecDeque<_>>>()?;
        buffers
            .entry(entry.edge)
            .or_default()
            .entry(entry.key)
            .or_default()
            .insert(ExecutorId::from(entry.source), queue);
    }
    Ok(buffers)
}
