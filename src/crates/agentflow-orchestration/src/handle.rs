//! Non-blocking handle onto a running orchestration.

use crate::error::{OrchestrationError, Result};
use tokio::sync::{oneshot, watch};

/// Coarse progress of an orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestrationStatus {
    /// The manager is processing the conversation.
    Working,
    /// A participant is producing its turn.
    AgentSpeaking {
        /// Name of the speaking agent.
        agent: String,
    },
    /// The orchestration produced its result.
    Completed,
}

/// Terminal result of an orchestration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorResponse {
    /// The manager's filtered final message.
    pub value: String,
}

/// Handle for callers that must not block: status updates via
/// [`status`](Self::status) / [`status_changed`](Self::status_changed), the
/// terminal [`ActorResponse`] via [`response`](Self::response) or the
/// non-blocking [`try_response`](Self::try_response).
pub struct AgentResponseHandle {
    status: watch::Receiver<OrchestrationStatus>,
    result: oneshot::Receiver<ActorResponse>,
}

impl AgentResponseHandle {
    pub(crate) fn new(
        status: watch::Receiver<OrchestrationStatus>,
        result: oneshot::Receiver<ActorResponse>,
    ) -> Self {
        Self { status, result }
    }

    /// Latest observed status.
    pub fn status(&self) -> OrchestrationStatus {
        self.status.borrow().clone()
    }

    /// Wait for the next status change and return it.
    pub async fn status_changed(&mut self) -> Result<OrchestrationStatus> {
        self.status
            .changed()
            .await
            .map_err(|_| OrchestrationError::ChannelClosed)?;
        Ok(self.status.borrow().clone())
    }

    /// Check for the terminal response without blocking.
    pub fn try_response(&mut self) -> Option<ActorResponse> {
        self.result.try_recv().ok()
    }

    /// Wait for the terminal response.
    pub async fn response(self) -> Result<ActorResponse> {
        self.result
            .await
            .map_err(|_| OrchestrationError::ChannelClosed)
    }
}
