//! The declarative recipe: nodes, edges, and the council configuration that
//! promotes an agent node to a consensus vote. Immutable and read-only once built
//! into a [`crate::topology::Topology`] (`spec.md §3`).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

pub type NodeId = String;

/// Declarative workflow manifest: metadata, an inputs schema, and a graph of
/// nodes/edges. Constructed once by the caller's manifest validator and never
/// mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Free-form mapping from input name to a type tag (e.g. "string", "number").
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    pub graph: RecipeGraph,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeGraph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// A single node in the declarative graph. Polymorphic over [`NodeKind`]; the
/// remaining fields are common to every variant (`spec.md §3`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub node_id: NodeId,
    #[serde(flatten)]
    pub kind: NodeKind,
    /// Promotes an `AgentNode` to a consensus node when present.
    #[serde(default)]
    pub council_config: Option<CouncilConfig>,
    /// Opaque UI hints, forwarded verbatim in every event's `visuals` map (never
    /// interpreted by the engine).
    #[serde(default)]
    pub visual_metadata: Option<HashMap<String, String>>,
    #[serde(default)]
    pub metadata: Option<HashMap<String, Value>>,
}

/// The tagged variant the scheduler dispatches on. A sum type rather than scattered
/// trait objects per node, so dispatch logic stays concentrated in the runner
/// (`spec.md §9`, "Dynamic dispatch on node kind").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeKind {
    Agent {
        agent_name: String,
        #[serde(default)]
        overrides: Option<Value>,
    },
    Human {
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// The manifest field is named `code` for compatibility, but it names a tool
    /// identifier, not executable source (`spec.md §3`).
    Logic {
        #[serde(rename = "code")]
        tool_name: String,
    },
}

impl NodeKind {
    pub fn tag(&self) -> &'static str {
        match self {
            NodeKind::Agent { .. } => "agent",
            NodeKind::Human { .. } => "human",
            NodeKind::Logic { .. } => "logic",
        }
    }
}

/// An edge between two declared nodes. At most one edge is permitted per
/// `(source, target)` pair within a [`RecipeGraph`] — enforced at topology build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub source_node_id: NodeId,
    pub target_node_id: NodeId,
    /// Opaque branch label. `None` means unconditional. `Some(label)` is satisfied
    /// when the source node's `Output::branch_key` equals `label`.
    #[serde(default)]
    pub condition: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouncilStrategy {
    Consensus,
    Majority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouncilConfig {
    pub strategy: CouncilStrategy,
    pub voters: Vec<String>,
}
