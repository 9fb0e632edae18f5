//! Message envelopes and stable payload type identifiers.
//!
//! Every in-flight message is an [`Envelope`]: an opaque JSON payload tagged
//! with the [`TypeId`] of the Rust type it was encoded from, the executor
//! that produced it, and an optional explicit delivery target. The scheduler
//! routes on the tag and never inspects the payload itself.
//!
//! Executors declare the [`TypeId`]s they handle, which replaces
//! runtime-reflected dispatch with a closed set known at graph build time.

use crate::error::{Result, WorkflowError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Marker for types that can travel through a workflow.
///
/// Blanket-implemented for every `Serialize + DeserializeOwned` type, so any
/// plain data struct qualifies without opt-in.
pub trait Payload: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Payload for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Identifier of a registered executor, stable within one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutorId(String);

impl ExecutorId {
    /// Create an executor id. Emptiness is rejected when the workflow builds.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Synthetic source id for messages injected from outside the graph.
    pub(crate) fn external() -> Self {
        Self("__external__".into())
    }
}

impl fmt::Display for ExecutorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExecutorId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ExecutorId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Stable identifier for a message payload type.
///
/// Content-addressable: the same Rust type always maps to the same id within
/// one binary. Durable runs additionally register payload types in a
/// [`MessageTypeRegistry`](crate::registry::MessageTypeRegistry), which maps
/// ids to names that stay stable across binaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeId(String);

impl TypeId {
    /// The id of a payload type.
    pub fn of<T: 'static>() -> Self {
        Self(std::any::type_name::<T>().to_string())
    }

    /// An id from an explicit name (used by the type registry's durable
    /// mapping).
    pub fn named(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An in-flight message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    /// Identifier of the payload's type.
    pub type_id: TypeId,
    /// The payload, encoded as JSON. Opaque to the scheduler.
    pub payload: serde_json::Value,
    /// Executor that produced the message.
    pub source: ExecutorId,
    /// Explicit delivery target; bypasses edge routing when set.
    pub target: Option<ExecutorId>,
}

impl Envelope {
    /// Encode a payload into an envelope originating at `source`.
    pub fn of<T: Payload>(payload: &T, source: ExecutorId) -> Result<Self> {
        Ok(Self {
            type_id: TypeId::of::<T>(),
            payload: serde_json::to_value(payload)?,
            source,
            target: None,
        })
    }

    /// Address the envelope to an explicit target.
    pub fn addressed_to(mut self, target: ExecutorId) -> Self {
        self.target = Some(target);
        self
    }

    /// True when the payload is of type `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Decode the payload as `T`.
    pub fn payload_as<T: Payload>(&self) -> Result<T> {
        if !self.is::<T>() {
            return Err(WorkflowError::routing(format!(
                "payload is '{}', not '{}'",
                self.type_id,
                TypeId::of::<T>()
            )));
        }
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// The batch a fan-in edge releases once its join is satisfied.
///
/// Delivered as a single envelope so the joined messages keep their source
/// attribution and arrive together. Items are ordered by the fan-in's source
/// declaration order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JoinBatch {
    /// The joined envelopes.
    pub items: Vec<Envelope>,
}

impl JoinBatch {
    /// Decode every item whose payload is of type `T`, in batch order.
    pub fn payloads<T: Payload>(&self) -> Result<Vec<T>> {
        self.items.iter().map(Envelope::payload_as).collect()
    }
}
