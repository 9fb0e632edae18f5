//! In-memory checkpoint storage for development and testing.
//!
//! [`InMemoryCheckpointStore`] keeps every checkpoint in a process-local map
//! behind a `tokio::sync::RwLock`. Data does not survive a restart; use it
//! for tests, demos, and short-lived runs, and a real backend everywhere
//! else.

use crate::checkpoint::RunCheckpoint;
use crate::error::Result;
use crate::store::CheckpointStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Reference [`CheckpointStore`] backed by a process-local map.
///
/// Cloning is cheap and shares the underlying storage.
#[derive(Clone, Default)]
pub struct InMemoryCheckpointStore {
    runs: Arc<RwLock<HashMap<String, Vec<RunCheckpoint>>>>,
}

impl InMemoryCheckpointStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs with at least one checkpoint.
    pub async fn run_count(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Total number of stored checkpoints across all runs.
    pub async fn checkpoint_count(&self) -> usize {
        self.runs.read().await.values().map(Vec::len).sum()
    }

    /// Drop all stored checkpoints. Intended for test isolation.
    pub async fn clear(&self) {
        self.runs.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn put(&self, checkpoint: RunCheckpoint) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.entry(checkpoint.run_id.clone())
            .or_default()
            .push(checkpoint);
        Ok(())
    }

    async fn latest(&self, run_id: &str) -> Result<Option<RunCheckpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).and_then(|history| history.last().cloned()))
    }

    async fn list(&self, run_id: &str) -> Result<Vec<RunCheckpoint>> {
        let runs = self.runs.read().await;
        Ok(runs.get(run_id).cloned().unwrap_or_default())
    }
}
