//! Durable name mapping for payload types.
//!
//! In-memory runs identify payloads by [`TypeId`], which is derived from the
//! Rust type name and therefore only guaranteed stable within one binary.
//! Checkpoints outlive binaries, so a durable run registers each payload type
//! under an explicit name; [`MessageTypeRegistry`] translates between the two
//! when envelopes cross the storage boundary.

use crate::envelope::{Envelope, ExecutorId, Payload, TypeId};
use crate::error::{Result, WorkflowError};
use agentflow_checkpoint::StoredEnvelope;
use std::collections::HashMap;

/// Bidirectional map between in-memory [`TypeId`]s and durable type names.
#[derive(Debug, Default, Clone)]
pub struct MessageTypeRegistry {
    names_by_type: HashMap<TypeId, String>,
    types_by_name: HashMap<String, TypeId>,
}

impl MessageTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register payload type `T` under a stable durable name.
    ///
    /// Fails with a configuration error when the name or the type is already
    /// registered, so one checkpoint namespace cannot hold two meanings for
    /// the same tag.
    pub fn register<T: Payload>(&mut self, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let type_id = TypeId::of::<T>();
        if self.types_by_name.contains_key(&name) {
            return Err(WorkflowError::configuration(format!(
                "durable type name '{name}' is already registered"
            )));
        }
        if self.names_by_type.contains_key(&type_id) {
            return Err(WorkflowError::configuration(format!(
                "payload type '{type_id}' is already registered"
            )));
        }
        self.names_by_type.insert(type_id.clone(), name.clone());
        self.types_by_name.insert(name, type_id);
        Ok(())
    }

    /// True when payload type `T` has a durable name.
    pub fn contains<T: Payload>(&self) -> bool {
        self.names_by_type.contains_key(&TypeId::of::<T>())
    }

    /// Encode an envelope into its durable form.
    ///
    /// The payload itself is already JSON; only the type tag is rewritten to
    /// the registered name. Unregistered types cannot be checkpointed.
    pub fn encode(&self, envelope: &Envelope) -> Result<StoredEnvelope> {
        let name = self.names_by_type.get(&envelope.type_id).ok_or_else(|| {
            WorkflowError::routing(format!(
                "payload type '{}' is not registered for durable storage",
                envelope.type_id
            ))
        })?;
        Ok(StoredEnvelope {
            type_id: name.clone(),
            payload: envelope.payload.clone(),
            source: envelope.source.to_string(),
            target: envelope.target.as_ref().map(ExecutorId::to_string),
        })
    }

    /// Decode a stored envelope back into its in-memory form.
    pub fn decode(&self, stored: StoredEnvelope) -> Result<Envelope> {
        let type_id = self.types_by_name.get(&stored.type_id).ok_or_else(|| {
            WorkflowError::routing(format!(
                "stored type name '{}' is not registered",
                stored.type_id
            ))
        })?;
        Ok(Envelope {
            type_id: type_id.clone(),
            payload: stored.payload,
            source: ExecutorId::from(stored.source),
            target: stored.target.map(ExecutorId::from),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registered_types_round_trip_through_storage() {
        let mut registry = MessageTypeRegistry::new();
        registry.register::<String>("text").unwrap();

        let env = Envelope::of(&"hi".to_string(), ExecutorId::from("a"))
            .unwrap()
            .addressed_to(ExecutorId::from("b"));
        let stored = registry.encode(&env).unwrap();
        assert_eq!(stored.type_id, "text");

        let back = registry.decode(stored).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn duplicate_names_and_types_are_rejected() {
        let mut registry = MessageTypeRegistry::new();
        registry.register::<String>("text").unwrap();

        assert!(matches!(
            registry.register::<bool>("text"),
            Err(WorkflowError::Configuration(_))
        ));
        assert!(matches!(
            registry.register::<String>("other"),
            Err(WorkflowError::Configuration(_))
        ));
    }

    #[test]
    fn unregistered_types_cannot_be_encoded() {
        let registry = MessageTypeRegistry::new();
        let env = Envelope::of(&1i64, ExecutorId::from("a")).unwrap();
        assert!(matches!(
            registry.encode(&env),
            Err(WorkflowError::Routing(_))
        ));
    }
}
