//! The compiled workflow graph and its builder.
//!
//! A [`Workflow`] is immutable once built: a starting executor, a factory
//! per registered executor, the outgoing edges per node, the fan-in joins,
//! and the set of executors allowed to yield workflow output. Validation
//! happens in [`WorkflowBuilder::build`]; the scheduler can assume a
//! well-formed graph.

use crate::edge::{Edge, FanInEdge, JoinPolicy};
use crate::envelope::{ExecutorId, TypeId};
use crate::error::{Result, WorkflowError};
use crate::executor::{ActionExecutor, Executor};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Factory producing a fresh executor instance for a run.
pub type ExecutorFactory = Arc<dyn Fn() -> Box<dyn Executor> + Send + Sync>;

/// Immutable compiled workflow graph.
#[derive(Clone)]
pub struct Workflow {
    name: String,
    starting_executor: ExecutorId,
    factories: HashMap<ExecutorId, ExecutorFactory>,
    input_types: HashMap<ExecutorId, HashSet<TypeId>>,
    edges: HashMap<ExecutorId, Vec<Edge>>,
    fan_ins: Vec<FanInEdge>,
    output_producers: HashSet<ExecutorId>,
}

impl Workflow {
    /// Workflow name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The executor that receives external workflow input.
    pub fn starting_executor(&self) -> &ExecutorId {
        &self.starting_executor
    }

    /// True when an executor with this id is registered.
    pub fn contains(&self, id: &ExecutorId) -> bool {
        self.factories.contains_key(id)
    }

    /// Declared input types of a registered executor.
    pub fn declared_inputs(&self, id: &ExecutorId) -> Option<&HashSet<TypeId>> {
        self.input_types.get(id)
    }

    /// Outgoing edges of an executor, in declaration order.
    pub fn edges_from(&self, id: &ExecutorId) -> &[Edge] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All fan-in edges of the graph.
    pub fn fan_ins(&self) -> &[FanInEdge] {
        &self.fan_ins
    }

    /// True when the executor may yield workflow output.
    pub fn is_output_producer(&self, id: &ExecutorId) -> bool {
        self.output_producers.contains(id)
    }

    /// Instantiate a registered executor for a run.
    pub fn create_instance(&self, id: &ExecutorId) -> Option<Box<dyn Executor>> {
        self.factories.get(id).map(|factory| factory())
    }

    /// Ids of all registered executors, sorted for deterministic iteration.
    pub fn executor_ids(&self) -> Vec<ExecutorId> {
        let mut ids: Vec<ExecutorId> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("starting_executor", &self.starting_executor)
            .field("executors", &self.factories.len())
            .field("fan_ins", &self.fan_ins.len())
            .field("output_producers", &self.output_producers)
            .finish()
    }
}

/// Builder assembling and validating a [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    starting_executor: Option<ExecutorId>,
    factories: HashMap<ExecutorId, ExecutorFactory>,
    edges: HashMap<ExecutorId, Vec<Edge>>,
    fan_ins: Vec<FanInEdge>,
    output_producers: HashSet<ExecutorId>,
    external_input_sinks: HashSet<ExecutorId>,
    duplicate: Option<ExecutorId>,
}

impl WorkflowBuilder {
    /// Start a workflow definition.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            starting_executor: None,
            factories: HashMap::new(),
            edges: HashMap::new(),
            fan_ins: Vec::new(),
            output_producers: HashSet::new(),
            external_input_sinks: HashSet::new(),
            duplicate: None,
        }
    }

    /// Declare the executor that receives external workflow input.
    pub fn start_with(mut self, id: impl Into<ExecutorId>) -> Self {
        self.starting_executor = Some(id.into());
        self
    }

    /// Register an executor factory under an id.
    pub fn add_executor<F>(mut self, id: impl Into<ExecutorId>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Executor> + Send + Sync + 'static,
    {
        let id = id.into();
        if self.factories.contains_key(&id) && self.duplicate.is_none() {
            self.duplicate = Some(id.clone());
        }
        self.factories.insert(id, Arc::new(factory));
        self
    }

    /// Register a stateless [`ActionExecutor`], cloned per run.
    pub fn add_action(self, action: ActionExecutor) -> Self {
        let id = action.id().clone();
        self.add_executor(id, action.into_factory())
    }

    /// Add an outgoing edge to a source executor.
    pub fn add_edge(mut self, source: impl Into<ExecutorId>, edge: Edge) -> Self {
        self.edges.entry(source.into()).or_default().push(edge);
        self
    }

    /// Shorthand for a direct edge.
    pub fn direct(self, source: impl Into<ExecutorId>, target: impl Into<ExecutorId>) -> Self {
        self.add_edge(source, Edge::direct(target))
    }

    /// Add a fan-in join from several sources into one target.
    pub fn fan_in(
        mut self,
        sources: Vec<ExecutorId>,
        target: impl Into<ExecutorId>,
        join: JoinPolicy,
    ) -> Self {
        self.fan_ins.push(FanInEdge {
            sources,
            target: target.into(),
            join,
        });
        self
    }

    /// Allow an executor to yield workflow output.
    pub fn mark_output_producer(mut self, id: impl Into<ExecutorId>) -> Self {
        self.output_producers.insert(id.into());
        self
    }

    /// Exempt an executor from the non-empty-input-types rule. Intended for
    /// sinks fed only by injected external input.
    pub fn mark_external_input_sink(mut self, id: impl Into<ExecutorId>) -> Self {
        self.external_input_sinks.insert(id.into());
        self
    }

    /// Validate and compile the graph.
    pub fn build(self) -> Result<Workflow> {
        if self.name.is_empty() {
            return Err(WorkflowError::configuration("workflow name must not be empty"));
        }
        if let Some(id) = self.duplicate {
            return Err(WorkflowError::configuration(format!(
                "executor '{id}' is registered twice"
            )));
        }
        if self.factories.keys().any(|id| id.as_str().is_empty()) {
            return Err(WorkflowError::configuration("executor id must not be empty"));
        }

        let starting_executor = self
            .starting_executor
            .ok_or_else(|| WorkflowError::configuration("no starting executor declared"))?;
        if !self.factories.contains_key(&starting_executor) {
            return Err(WorkflowError::configuration(format!(
                "starting executor '{starting_executor}' is not registered"
            )));
        }

        for (source, edges) in &self.edges {
            if !self.factories.contains_key(source) {
                return Err(WorkflowError::configuration(format!(
                    "edge source '{source}' is not registered"
                )));
            }
            for edge in edges {
                for target in edge.targets() {
                    if !self.factories.contains_key(target) {
                        return Err(WorkflowError::configuration(format!(
                            "edge target '{target}' is not registered"
                        )));
                    }
                }
            }
        }
        for fan_in in &self.fan_ins {
            if fan_in.sources.is_empty() {
                return Err(WorkflowError::configuration(format!(
                    "fan-in into '{}' has no sources",
                    fan_in.target
                )));
            }
            for endpoint in fan_in.sources.iter().chain(std::iter::once(&fan_in.target)) {
                if !self.factories.contains_key(endpoint) {
                    return Err(WorkflowError::configuration(format!(
                        "fan-in endpoint '{endpoint}' is not registered"
                    )));
                }
            }
        }
        for id in &self.output_producers {
            if !self.factories.contains_key(id) {
                return Err(WorkflowError::configuration(format!(
                    "output producer '{id}' is not registered"
                )));
            }
        }

        // Probe one instance per factory to capture declared input types.
        let mut input_types = HashMap::new();
        for (id, factory) in &self.factories {
            let probe = factory();
            let declared = probe.input_types();
            if declared.is_empty() && !self.external_input_sinks.contains(id) {
                return Err(WorkflowError::configuration(format!(
                    "executor '{id}' declares no input types"
                )));
            }
            input_types.insert(id.clone(), declared);
        }

        Ok(Workflow {
            name: self.name,
            starting_executor,
            factories: self.factories,
            input_types,
            edges: self.edges,
            fan_ins: self.fan_ins,
            output_producers: self.output_producers,
        })
    }
}
