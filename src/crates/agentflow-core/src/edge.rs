//! Static routing rules between executors.
//!
//! Edges describe where messages leaving an executor go. They are declared
//! on the workflow builder and never change after the graph compiles.
//! Assigners and predicates must be pure and deterministic: the scheduler
//! applies each exactly once per routed message, so purity is what makes a
//! resumed run route identically.

use crate::envelope::{Envelope, ExecutorId, Payload};
use std::sync::Arc;

/// Partition selector for a fan-out edge: given the message and the target
/// count, returns the indices of the targets that receive it.
pub type FanOutAssigner = Arc<dyn Fn(&Envelope, usize) -> Vec<usize> + Send + Sync>;

/// Predicate of a switch case.
pub type SwitchPredicate = Arc<dyn Fn(&Envelope) -> bool + Send + Sync>;

/// Correlation-key extractor for a fan-in join.
pub type CorrelationFn = Arc<dyn Fn(&Envelope) -> String + Send + Sync>;

/// Outgoing routing rule, keyed by its source in the workflow's edge map.
#[derive(Clone)]
pub enum Edge {
    /// Deliver to a single executor.
    Direct {
        /// Receiving executor.
        target: ExecutorId,
    },
    /// Deliver to a subset of targets chosen by the assigner (all targets
    /// when no assigner is set).
    FanOut {
        /// Candidate targets, in declaration order.
        targets: Vec<ExecutorId>,
        /// Optional pure partition selector.
        assigner: Option<FanOutAssigner>,
    },
    /// Deliver to the first case whose predicate matches, else the default.
    ///
    /// A message matching neither a case nor a default is a routing error.
    Switch {
        /// Cases, evaluated in declaration order.
        cases: Vec<SwitchCase>,
        /// Fallback target.
        default: Option<ExecutorId>,
    },
}

impl Edge {
    /// Direct edge to `target`.
    pub fn direct(target: impl Into<ExecutorId>) -> Self {
        Self::Direct {
            target: target.into(),
        }
    }

    /// Fan-out edge delivering to every target.
    pub fn fan_out(targets: Vec<ExecutorId>) -> Self {
        Self::FanOut {
            targets,
            assigner: None,
        }
    }

    /// Fan-out edge with a partition selector.
    pub fn fan_out_with<F>(targets: Vec<ExecutorId>, assigner: F) -> Self
    where
        F: Fn(&Envelope, usize) -> Vec<usize> + Send + Sync + 'static,
    {
        Self::FanOut {
            targets,
            assigner: Some(Arc::new(assigner)),
        }
    }

    /// Switch edge over the given cases.
    pub fn switch(cases: Vec<SwitchCase>, default: Option<ExecutorId>) -> Self {
        Self::Switch { cases, default }
    }

    /// Every executor this edge can deliver to, for build-time validation.
    pub(crate) fn targets(&self) -> Vec<&ExecutorId> {
        match self {
            Self::Direct { target } => vec![target],
            Self::FanOut { targets, .. } => targets.iter().collect(),
            Self::Switch { cases, default } => {
                let mut all: Vec<&ExecutorId> = cases.iter().map(|c| &c.target).collect();
                if let Some(default) = default {
                    all.push(default);
                }
                all
            }
        }
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { target } => f.debug_struct("Direct").field("target", target).finish(),
            Self::FanOut { targets, assigner } => f
                .debug_struct("FanOut")
                .field("targets", targets)
                .field("assigner", &assigner.as_ref().map(|_| "<fn>"))
                .finish(),
            Self::Switch { cases, default } => f
                .debug_struct("Switch")
                .field("cases", &cases.len())
                .field("default", default)
                .finish(),
        }
    }
}

/// One arm of a switch edge.
#[derive(Clone)]
pub struct SwitchCase {
    /// Pure predicate over the routed envelope.
    pub predicate: SwitchPredicate,
    /// Target when the predicate matches.
    pub target: ExecutorId,
}

impl SwitchCase {
    /// Case from a raw envelope predicate.
    pub fn when<F>(predicate: F, target: impl Into<ExecutorId>) -> Self
    where
        F: Fn(&Envelope) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
            target: target.into(),
        }
    }

    /// Case matching payloads of type `T` that satisfy `predicate`.
    /// Envelopes of other types never match.
    pub fn on_payload<T, F>(predicate: F, target: impl Into<ExecutorId>) -> Self
    where
        T: Payload,
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self::when(
            move |envelope| {
                envelope
                    .payload_as::<T>()
                    .map(|payload| predicate(&payload))
                    .unwrap_or(false)
            },
            target,
        )
    }
}

/// Join rule of a fan-in edge.
#[derive(Clone)]
pub enum JoinPolicy {
    /// Release once every source contributed at least one message (one
    /// message per source is taken into the batch).
    AllSources,
    /// Like [`AllSources`](Self::AllSources), but messages only join when
    /// they share the extracted correlation key.
    CorrelationKey(CorrelationFn),
}

impl std::fmt::Debug for JoinPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AllSources => f.write_str("AllSources"),
            Self::CorrelationKey(_) => f.write_str("CorrelationKey(<fn>)"),
        }
    }
}

/// Fan-in edge: joins messages from several sources into one batched
/// delivery at the target.
#[derive(Debug, Clone)]
pub struct FanInEdge {
    /// Sources that feed the join, in declaration order (which is also the
    /// released batch order).
    pub sources: Vec<ExecutorId>,
    /// Executor receiving the released [`JoinBatch`](crate::envelope::JoinBatch).
    pub target: ExecutorId,
    /// When the join releases.
    pub join: JoinPolicy,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_switch_case_ignores_other_payload_types() {
        let case = SwitchCase::on_payload::<bool, _>(|flag| *flag, "remove");

        let spam = Envelope::of(&true, ExecutorId::from("detect")).unwrap();
        let text = Envelope::of(&"hi".to_string(), ExecutorId::from("detect")).unwrap();

        assert!((case.predicate)(&spam));
        assert!(!(case.predicate)(&text));
    }

    #[test]
    fn edge_targets_cover_every_arm() {
        let edge = Edge::switch(
            vec![SwitchCase::on_payload::<bool, _>(|b| *b, "yes")],
            Some(ExecutorId::from("no")),
        );
        let targets: Vec<String> = edge.targets().iter().map(|t| t.to_string()).collect();
        assert_eq!(targets, vec!["yes", "no"]);
    }
}
