//! Extensible checkpoint storage trait for custom backend implementations.
//!
//! [`CheckpointStore`] is the single abstraction a persistence backend has to
//! implement to host durable workflow runs. Implementations must be
//! `Send + Sync` and are shared as `Arc<dyn CheckpointStore>`.
//!
//! # Implementing a backend
//!
//! ```rust,ignore
//! use agentflow_checkpoint::{CheckpointStore, RunCheckpoint, Result};
//! use async_trait::async_trait;
//!
//! struct SqlCheckpointStore { pool: Pool }
//!
//! #[async_trait]
//! impl CheckpointStore for SqlCheckpointStore {
//!     async fn put(&self, checkpoint: RunCheckpoint) -> Result<()> {
//!         let row = serde_json::to_value(&checkpoint)?;
//!         self.pool.insert("checkpoints", &checkpoint.run_id, row).await
//!             .map_err(agentflow_checkpoint::CheckpointError::storage)
//!     }
//!     // latest / list analogous
//! }
//! ```

use crate::checkpoint::RunCheckpoint;
use crate::error::Result;
use async_trait::async_trait;

/// Storage backend for superstep checkpoints.
///
/// Checkpoints for one run form an append-only history in `put` order;
/// backends must preserve that order for [`list`](CheckpointStore::list) and
/// serve the most recent entry from [`latest`](CheckpointStore::latest).
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Append a checkpoint to the run's history.
    async fn put(&self, checkpoint: RunCheckpoint) -> Result<()>;

    /// Fetch the most recent checkpoint for a run, if any exists.
    async fn latest(&self, run_id: &str) -> Result<Option<RunCheckpoint>>;

    /// Fetch the full checkpoint history of a run in `put` order.
    async fn list(&self, run_id: &str) -> Result<Vec<RunCheckpoint>>;
}
