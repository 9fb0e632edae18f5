//! Name-keyed catalogs of agents and workflows.
//!
//! Registration verifies the factory's honesty up front: the produced
//! agent's (or workflow's) name must equal the key it is registered under.
//! Lookups are case-insensitive; the originally registered name is kept for
//! error messages and listings.

use crate::environment::HostEnvironment;
use crate::error::{HostError, Result};
use agentflow_agents::ChatAgent;
use agentflow_core::Workflow;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Factory producing an agent from host capabilities.
pub type AgentFactory = Arc<dyn Fn(&HostEnvironment) -> Result<ChatAgent> + Send + Sync>;

/// Factory producing a workflow from host capabilities.
pub type WorkflowFactory = Arc<dyn Fn(&HostEnvironment) -> Result<Workflow> + Send + Sync>;

struct Registration<F> {
    name: String,
    factory: F,
}

/// Case-insensitive registry of agent factories.
#[derive(Default)]
pub struct AgentCatalog {
    registrations: RwLock<HashMap<String, Registration<AgentFactory>>>,
}

impl AgentCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent factory under `name`.
    ///
    /// The factory runs once against `environment` to verify that it
    /// produces an agent of exactly this name.
    pub async fn register(
        &self,
        name: &str,
        factory: AgentFactory,
        environment: &HostEnvironment,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(HostError::configuration("agent name must not be empty"));
        }
        let probe = factory(environment)?;
        if probe.name() != name {
            return Err(HostError::NameMismatch {
                registered: name.to_string(),
                actual: probe.name().to_string(),
            });
        }

        let key = name.to_lowercase();
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&key) {
            return Err(HostError::configuration(format!(
                "an agent is already registered under '{name}'"
            )));
        }
        registrations.insert(
            key,
            Registration {
                name: name.to_string(),
                factory,
            },
        );
        Ok(())
    }

    /// True when an agent is registered under `name` (case-insensitive).
    pub async fn contains(&self, name: &str) -> bool {
        self.registrations
            .read()
            .await
            .contains_key(&name.to_lowercase())
    }

    /// Materialize the agent registered under `name` (case-insensitive).
    pub async fn resolve(&self, name: &str, environment: &HostEnvironment) -> Result<ChatAgent> {
        let registrations = self.registrations.read().await;
        let registration = registrations.get(&name.to_lowercase()).ok_or_else(|| {
            HostError::UnknownAgent {
                name: name.to_string(),
            }
        })?;
        (registration.factory)(environment)
    }

    /// Registered names, as originally written, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registrations
            .read()
            .await
            .values()
            .map(|registration| registration.name.clone())
            .collect();
        names.sort();
        names
    }
}

/// Case-insensitive registry of workflow factories.
#[derive(Default)]
pub struct WorkflowCatalog {
    registrations: RwLock<HashMap<String, Registration<WorkflowFactory>>>,
}

impl WorkflowCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a workflow factory under `name`, verifying the produced
    /// workflow carries the same name.
    pub async fn register(
        &self,
        name: &str,
        factory: WorkflowFactory,
        environment: &HostEnvironment,
    ) -> Result<()> {
        if name.is_empty() {
            return Err(HostError::configuration("workflow name must not be empty"));
        }
        let probe = factory(environment)?;
        if probe.name() != name {
            return Err(HostError::NameMismatch {
                registered: name.to_string(),
                actual: probe.name().to_string(),
            });
        }

        let key = name.to_lowercase();
        let mut registrations = self.registrations.write().await;
        if registrations.contains_key(&key) {
            return Err(HostError::configuration(format!(
                "a workflow is already registered under '{name}'"
            )));
        }
        registrations.insert(
            key,
            Registration {
                name: name.to_string(),
                factory,
            },
        );
        Ok(())
    }

    /// Materialize the workflow registered under `name`.
    pub async fn resolve(&self, name: &str, environment: &HostEnvironment) -> Result<Workflow> {
        let registrations = self.registrations.read().await;
        let registration = registrations.get(&name.to_lowercase()).ok_or_else(|| {
            HostError::UnknownWorkflow {
                name: name.to_string(),
            }
        })?;
        (registration.factory)(environment)
    }

    /// Registered names, as originally written, sorted.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .registrations
            .read()
            .await
            .values()
            .map(|registration| registration.name.clone())
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentflow_agents::{ChatClient, ChatMessage, ChatOptions, ChatResponse};
    use async_trait::async_trait;

    struct SilentClient;

    #[async_trait]
    impl ChatClient for SilentClient {
        async fn respond(
            &self,
            _messages: Vec<ChatMessage>,
            _options: &ChatOptions,
        ) -> agentflow_agents::Result<ChatResponse> {
            Ok(ChatResponse::from_text(""))
        }
    }

    fn environment() -> HostEnvironment {
        HostEnvironment::new(Arc::new(SilentClient))
    }

    fn agent_factory(name: &'static str) -> AgentFactory {
        Arc::new(move |environment: &HostEnvironment| {
            ChatAgent::builder(name, environment.chat_client())
                .build()
                .map_err(HostError::Agent)
        })
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let catalog = AgentCatalog::new();
        let environment = environment();
        catalog
            .register("Helper", agent_factory("Helper"), &environment)
            .await
            .unwrap();

        assert!(catalog.contains("helper").await);
        assert!(catalog.contains("HELPER").await);
        let agent = catalog.resolve("hElPeR", &environment).await.unwrap();
        assert_eq!(agent.name(), "Helper");
    }

    #[tokio::test]
    async fn name_mismatch_is_rejected_at_registration() {
        let catalog = AgentCatalog::new();
        let environment = environment();
        let err = catalog
            .register("alias", agent_factory("real-name"), &environment)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HostError::NameMismatch { registered, actual }
                if registered == "alias" && actual == "real-name"
        ));
    }

    #[tokio::test]
    async fn unknown_agents_are_reported_by_name() {
        let catalog = AgentCatalog::new();
        let err = catalog
            .resolve("ghost", &environment())
            .await
            .unwrap_err();
        assert!(matches!(err, HostError::UnknownAgent { name } if name == "ghost"));
    }
}
