//! Run lifecycle events and run status.
//!
//! Events are the only window into a live run: the scheduler emits them in a
//! deterministic order (handler emission order within a superstep, stable
//! dispatch order across handlers) and the consumer reads them from the
//! run's event stream.

use crate::envelope::ExecutorId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier correlating an external request with its response.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a fresh request id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Why a run reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionReason {
    /// At least one executor yielded a workflow output.
    OutputYielded,
    /// An executor requested cooperative termination.
    HaltRequested,
}

/// Lifecycle state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// Run object exists but the loop has not started.
    Created,
    /// A superstep is executing.
    Running,
    /// Quiescent with no outputs, halt, or pending requests.
    Idle,
    /// Quiescent with at least one external request outstanding.
    AwaitingExternalInput,
    /// Terminal: quiescent after yielding output.
    Completed,
    /// Terminal: a handler fault ended the run.
    Failed,
    /// Terminal: cancellation was observed.
    Cancelled,
    /// Terminal: an executor requested halt.
    Halted,
}

impl RunStatus {
    /// True for states the run can never leave.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Halted | Self::Idle
        )
    }
}

/// Event raised during a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkflowEvent {
    /// An executor's handler is about to run.
    ExecutorInvoked {
        /// The executor being dispatched.
        executor_id: ExecutorId,
    },
    /// An executor's handler returned successfully.
    ExecutorCompleted {
        /// The executor that completed.
        executor_id: ExecutorId,
        /// The handler's visible result: its last sent message payload, or
        /// its last yielded output when it sent nothing.
        data: Option<serde_json::Value>,
    },
    /// An executor's handler raised a fault.
    ExecutorFailed {
        /// The executor that failed.
        executor_id: ExecutorId,
        /// Fault description.
        error: String,
    },
    /// A message was routed to an executor for the next superstep.
    MessageSend {
        /// Producing executor.
        source: ExecutorId,
        /// Receiving executor.
        target: ExecutorId,
    },
    /// A message had no matching edge and no explicit target; it was dropped.
    UnroutedMessage {
        /// Producing executor.
        source: ExecutorId,
    },
    /// An executor posted an external request (e.g. human-in-the-loop input).
    RequestInfo {
        /// Correlation id for [`provide_external_response`](crate::runner::RunHandle::provide_external_response).
        request_id: RequestId,
        /// Executor awaiting the response.
        executor_id: ExecutorId,
        /// Application-defined request payload.
        request: serde_json::Value,
    },
    /// An executor yielded a workflow output.
    WorkflowOutput {
        /// The yielded value.
        value: serde_json::Value,
    },
    /// A handler fault terminated the run.
    WorkflowFailed {
        /// Fault description.
        error: String,
    },
    /// The run reached a terminal state normally.
    WorkflowCompleted {
        /// What ended the run.
        reason: CompletionReason,
    },
    /// An executor requested cooperative termination.
    RequestHalt {
        /// The requesting executor.
        executor_id: ExecutorId,
    },
    /// Incremental update from an agent-backed executor.
    AgentRunUpdate {
        /// The executor running the agent.
        executor_id: ExecutorId,
        /// Provider-shaped update payload.
        update: serde_json::Value,
    },
    /// A superstep finished: effects committed and routing applied.
    SuperstepCompleted {
        /// Index of the finished superstep (0-based).
        superstep: u64,
    },
}

/// The response to an external request, delivered back into the graph as a
/// regular message addressed to the requesting executor.
///
/// Executors that post external requests declare this as an input type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExternalResponse {
    /// Id of the request this answers.
    pub request_id: RequestId,
    /// Application-defined response payload.
    pub payload: serde_json::Value,
}
