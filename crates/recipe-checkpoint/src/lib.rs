//! # recipe-checkpoint
//!
//! Snapshot types shared by the recipe engine and its embedders. This crate has no
//! dependency on `recipe-core`: it is the foundation layer, exactly as
//! `langgraph-checkpoint` sits beneath `langgraph-core` in the teacher workspace, so
//! that a caller who only needs to serialize/store snapshots (e.g. a wire layer
//! persisting `NODE_DONE` outputs between requests) doesn't have to pull in the
//! execution engine itself.

mod error;
mod output;
mod store;

pub use error::{Result, SnapshotError};
pub use output::{Output, Snapshot};
pub use store::{InMemorySnapshotStore, SnapshotStore};
