//! Optional persistence helper for snapshots.
//!
//! The engine never calls any of this itself — `spec.md` is explicit that the caller
//! supplies and externalizes snapshots. `SnapshotStore` exists only as a convenience
//! for embedders who want a drop-in place to stash a run's terminal `state_map`
//! between process invocations, mirroring the role `CheckpointSaver` plays for the
//! teacher's Pregel loop.

use crate::error::{Result, SnapshotError};
use crate::output::Snapshot;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Persists and retrieves snapshots keyed by run id.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn put(&self, run_id: &str, snapshot: Snapshot) -> Result<()>;
    async fn get(&self, run_id: &str) -> Result<Snapshot>;
}

/// In-process [`SnapshotStore`] backed by a `RwLock<HashMap>`. Suitable for tests
/// and single-process embeddings; nothing here survives a process restart.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<RwLock<HashMap<String, Snapshot>>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn put(&self, run_id: &str, snapshot: Snapshot) -> Result<()> {
        self.entries.write().await.insert(run_id.to_string(), snapshot);
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Snapshot> {
        self.entries
            .read()
            .await
            .get(run_id)
            .cloned()
            .ok_or_else(|| SnapshotError::NotFound(run_id.to_string()))
    }
}
