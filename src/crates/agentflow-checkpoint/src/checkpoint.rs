//! Checkpoint data model.
//!
//! A [`RunCheckpoint`] is taken at a superstep boundary, after all state
//! writes of the finished superstep were committed and the next-step queue
//! was produced by routing. Restoring from it replays neither handlers nor
//! events of earlier supersteps; execution continues with the stored queue
//! against the stored state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Durable form of an in-flight message.
///
/// The runtime keeps live payloads as opaque JSON tagged with a stable type
/// identifier; that pair round-trips through storage unchanged. Rehydration
/// back into a typed payload happens in the runtime's type registry, not
/// here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredEnvelope {
    /// Stable identifier of the payload type.
    pub type_id: String,
    /// The payload, serialized by the registered codec for `type_id`.
    pub payload: serde_json::Value,
    /// Executor that produced the message.
    pub source: String,
    /// Explicit delivery target, if the sender addressed one.
    pub target: Option<String>,
}

/// One entry of the next-step queue.
///
/// Every queue entry is a single envelope. A fan-in release is no special
/// case: the joined messages are nested inside the release envelope's
/// payload, so the batch boundary survives restore unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueuedDelivery {
    /// Executor the envelope is scheduled for.
    pub target: String,
    /// The envelope to deliver.
    pub envelope: StoredEnvelope,
}

/// An external request that was still outstanding at the boundary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRequest {
    /// Identifier the response must be correlated with.
    pub request_id: String,
    /// Executor that posted the request and will receive the response.
    pub executor_id: String,
    /// Application-defined request payload.
    pub request: serde_json::Value,
}

/// Complete snapshot of a run at a superstep boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunCheckpoint {
    /// Run this checkpoint belongs to.
    pub run_id: String,
    /// Index of the superstep that just committed (0-based).
    pub superstep: u64,
    /// Messages scheduled for the next superstep.
    pub queue: Vec<QueuedDelivery>,
    /// Committed state, keyed `"<scope>/<key>"`. The sorted map order equals
    /// the runtime's deterministic commit order.
    pub state: BTreeMap<String, serde_json::Value>,
    /// External requests still awaiting a response.
    pub pending_requests: Vec<StoredRequest>,
    /// Number of events emitted so far, so a resumed observer can tell
    /// replayed history from new progress.
    pub events_emitted: u64,
    /// When the checkpoint was taken.
    pub created_at: DateTime<Utc>,
}

impl RunCheckpoint {
    /// Create an empty checkpoint for a run at superstep zero.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            superstep: 0,
            queue: Vec::new(),
            state: BTreeMap::new(),
            pending_requests: Vec::new(),
            events_emitted: 0,
            created_at: Utc::now(),
        }
    }

    /// True when nothing is queued and no external request is outstanding.
    ///
    /// Resuming from a quiescent checkpoint performs no further supersteps;
    /// the run settles immediately into an idle or awaiting state.
    pub fn is_quiescent(&self) -> bool {
        self.queue.is_empty() && self.pending_requests.is_empty()
    }
}
