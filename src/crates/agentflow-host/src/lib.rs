//! # agentflow-host - Catalogs, Session Stores, and the Host Agent
//!
//! The registry layer of agentflow:
//!
//! - [`AgentCatalog`] / [`WorkflowCatalog`] - case-insensitive, name-keyed
//!   factory registries. Registration probes the factory and rejects it when
//!   the produced name differs from the key.
//! - [`HostEnvironment`] - the explicit capability struct factories receive
//!   (chat client, session store, durable type registry); no service
//!   locators.
//! - [`SessionStore`] - pluggable session persistence, with
//!   [`InMemorySessionStore`] and the discarding [`NoopSessionStore`].
//! - [`HostAgent`] - wraps any agent with `get_or_create_session` /
//!   `save_session` hooks against the configured store.

pub mod catalog;
pub mod environment;
pub mod error;
pub mod host_agent;
pub mod session_store;

pub use catalog::{AgentCatalog, AgentFactory, WorkflowCatalog, WorkflowFactory};
pub use environment::HostEnvironment;
pub use error::{HostError, Result};
pub use host_agent::HostAgent;
pub use session_store::{InMemorySessionStore, NoopSessionStore, SessionStore};
