//! `recipe-core`: a DAG-structured workflow execution engine.
//!
//! A [`model::Recipe`] declares nodes (`agent`, `human`, `logic`) and the edges
//! between them. [`topology::Topology::build`] validates the declared graph and
//! partitions it into parallel execution generations. [`controller::Controller`]
//! validates a recipe, builds its topology, and hands it to a [`runner::Runner`],
//! which walks the generations one layer at a time, dispatching each node to the
//! capability implementation the caller supplied via
//! [`context::ExecutionContext`], and streaming an ordered [`event::Event`] for
//! every state transition.
//!
//! The engine owns none of: model/tool invocation, transport, persistence, auth,
//! or UI rendering. Those live entirely behind the traits in [`context`]; this
//! crate only sequences calls to them and reports what happened.

mod context;
mod controller;
mod error;
mod event;
mod model;
mod runner;
mod topology;

pub use context::{
    AgentExecutor, AuditSink, CouncilExecutor, CouncilResult, ExecutionContext, ExecutorResult,
    HumanGate, ManifestValidator, ToolExecutor,
};
pub use controller::Controller;
pub use error::{CapabilityError, ExecutionErrorKind, RecipeError, Result};
pub use event::{Event, EventKind, EventPayload, EventStream};
pub use model::{CouncilConfig, CouncilStrategy, Edge, Node, NodeId, NodeKind, Recipe, RecipeGraph};
pub use runner::Runner;
pub use topology::Topology;

pub use recipe_checkpoint::{InMemorySnapshotStore, Output, Snapshot, SnapshotStore};
