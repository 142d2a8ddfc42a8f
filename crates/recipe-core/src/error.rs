//! Error taxonomy for topology construction, manifest validation and execution.
//!
//! Topology and manifest errors are raised synchronously, before any event is
//! emitted (`spec.md §7`); execution errors instead surface as a single terminal
//! `ERROR` event and are never returned from `Runner::run` itself (see `event.rs`).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RecipeError>;

/// Errors raised synchronously by topology construction, manifest validation, or
/// controller setup. One variant per `error_kind` tag in `spec.md §7` that can occur
/// before the event stream opens.
#[derive(Error, Debug)]
pub enum RecipeError {
    /// The declared graph contains a cycle. Raised by [`crate::topology::Topology::build`].
    #[error("cyclic dependency detected among nodes: {0:?}")]
    CyclicDependency(Vec<String>),

    /// An edge references a node id that was never declared.
    #[error("edge references undeclared node '{0}'")]
    DanglingEdge(String),

    /// The undirected projection of the graph has more than one connected
    /// component (and the graph has two or more nodes).
    #[error("graph is disconnected: found {0} connected components")]
    DisconnectedGraph(usize),

    /// The untyped manifest failed to parse into a [`crate::model::Recipe`].
    #[error("manifest is invalid: {0}")]
    ManifestInvalid(String),

    /// A node's `kind` discriminator did not match any known variant.
    #[error("unknown node kind '{0}' for node '{1}'")]
    UnknownNodeKind(String, String),

    /// Structural error not covered by a more specific variant (e.g. duplicate
    /// node id, duplicate edge, empty recipe).
    #[error("graph validation failed: {0}")]
    Validation(String),
}

/// The `error_kind` tag carried by a terminal `ERROR` event (`spec.md §4.1`, §7).
/// Distinct from [`RecipeError`]: these describe failures *during* execution, which
/// the runner turns into an event rather than a `Result::Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionErrorKind {
    NodeExecutionFailed,
    HumanTimeout,
}

impl std::fmt::Display for ExecutionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeExecutionFailed => write!(f, "NODE_EXECUTION_FAILED"),
            Self::HumanTimeout => write!(f, "HUMAN_TIMEOUT"),
        }
    }
}

/// Error returned by a capability (agent executor, tool executor, human gate).
/// Wrapped into a terminal `ERROR` event by the runner; never propagated as a Rust
/// panic or silently dropped.
#[derive(Error, Debug)]
pub enum CapabilityError {
    #[error("{0}")]
    Failed(String),

    #[error("human gate timed out after {0}ms")]
    Timeout(u64),
}
