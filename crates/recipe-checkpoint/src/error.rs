//! Error types for snapshot store operations.

use thiserror::Error;

/// Result type for snapshot store operations.
pub type Result<T> = std::result::Result<T, SnapshotError>;

/// Errors that can occur while persisting or loading a [`crate::Snapshot`].
///
/// The execution engine itself never constructs these — it only consumes a
/// caller-supplied snapshot and never round-trips it through a store. These
/// variants exist for callers who choose to use [`crate::InMemorySnapshotStore`]
/// or implement their own [`crate::SnapshotStore`].
#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("no snapshot found for run '{0}'")]
    NotFound(String),

    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("snapshot store error: {0}")]
    Storage(String),
}
