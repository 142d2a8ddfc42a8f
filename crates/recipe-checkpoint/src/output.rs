//! The value a node produces, and the snapshot map used to resume a run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Result of executing a single node.
///
/// `value` is the node's raw output: handed to downstream nodes as an input and
/// surfaced to callers via `NODE_DONE`/`NODE_RESTORED` event payloads. `branch_key`
/// is the node's routing decision — an outgoing edge whose `condition` is
/// `Some(label)` is only traversed when `branch_key == Some(label)` (the
/// named-branch-label interpretation fixed for the conditional router). `cost` is
/// optional accounting metadata forwarded verbatim in `NODE_DONE`.
///
/// Large outputs should be externalized by the caller and referenced here via an
/// `artifact_id` field inside `value` — the engine does not enforce or inspect size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Output {
    pub value: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub branch_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub cost: Option<f64>,
}

impl Output {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value, branch_key: None, cost: None }
    }

    pub fn with_branch_key(mut self, branch_key: impl Into<String>) -> Self {
        self.branch_key = Some(branch_key.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }
}

/// An unordered mapping of completed node outputs, supplied by the caller to resume
/// a prior run. Nodes present as keys are treated as already complete: the runner
/// emits `NODE_RESTORED` for each and never re-executes them. The engine does not
/// serialize this itself — see [`crate::SnapshotStore`] for an optional persistence
/// helper.
pub type Snapshot = HashMap<String, Output>;
