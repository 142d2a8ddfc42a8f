//! The Event Protocol (`spec.md §4.1`): the closed set of events a run emits, and
//! the visual hints a UI can use without understanding node semantics.

use chrono::{DateTime, Utc};
use recipe_checkpoint::Output;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::pin::Pin;

use crate::error::ExecutionErrorKind;
use crate::model::NodeId;

/// A boxed, ordered stream of [`Event`]s. The sole output of [`crate::runner::Runner::run`]
/// and [`crate::controller::Controller::execute_recipe`].
pub type EventStream = Pin<Box<dyn futures::Stream<Item = Event> + Send>>;

/// One envelope in the event stream. `sequence_id` is strictly increasing within a
/// single run and is the only ordering guarantee callers may rely on across
/// concurrently-dispatched nodes (`spec.md §5`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub trace_id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub sequence_id: u64,
    /// Empty for run-scoped events that precede any node dispatch.
    pub node_id: String,
    pub event_type: EventKind,
    pub payload: EventPayload,
    pub visuals: HashMap<String, String>,
}

impl Event {
    pub fn new(
        trace_id: impl Into<String>,
        run_id: impl Into<String>,
        sequence_id: u64,
        node_id: impl Into<String>,
        payload: EventPayload,
    ) -> Self {
        let event_type = payload.kind();
        let visuals = default_visuals(event_type);
        Self {
            trace_id: trace_id.into(),
            run_id: run_id.into(),
            timestamp: Utc::now(),
            sequence_id,
            node_id: node_id.into(),
            event_type,
            payload,
            visuals,
        }
    }
}

/// The discriminant of [`EventPayload`], carried redundantly on [`Event`] so
/// consumers can switch on `event_type` without matching the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    NodeInit,
    NodeStart,
    NodeStream,
    NodeDone,
    NodeRestored,
    NodeSkipped,
    EdgeActive,
    CouncilVote,
    Error,
}

/// The closed union of event payloads (`spec.md §4.1`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Emitted once per node at the start of a run, before any execution begins,
    /// so a UI can render the full graph skeleton immediately.
    NodeInit { kind: String },
    NodeStart { inputs_summary: Value },
    /// A pre-collected chunk of incremental output from a capability executor.
    /// Node execution in this engine is single-shot (`ExecutorResult` is returned
    /// whole), so `NODE_STREAM` events are emitted back-to-back immediately before
    /// the terminal `NODE_DONE`, rather than interleaved with execution in real time.
    NodeStream { chunk: Value },
    NodeDone { output: Value, cost: Option<f64> },
    /// A node whose output was supplied via the resume [`recipe_checkpoint::Snapshot`]
    /// rather than executed this run.
    NodeRestored { output: Value },
    /// A node pruned because none of its inbound edges' conditions were satisfied
    /// (directly, or transitively through a skipped predecessor).
    NodeSkipped { reason: String },
    /// `from`/`to` identify the edge; emitted once an edge's condition is known to
    /// be satisfied, whether the source node executed this run or was restored.
    EdgeActive { from: NodeId, to: NodeId },
    /// `votes` is keyed by voter name, per `spec.md §4.1`'s
    /// `{votes: {voter → verdict}, synthesis}`.
    CouncilVote { votes: HashMap<String, Value>, synthesis: Value },
    /// Terminal for the run: no further events follow. `snapshot` carries the
    /// `state_map` accumulated up to the failure, so a caller can persist it for a
    /// later resume.
    Error {
        node_id: NodeId,
        error_kind: ExecutionErrorKind,
        message: String,
        snapshot: HashMap<NodeId, Output>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeInit { .. } => EventKind::NodeInit,
            Self::NodeStart { .. } => EventKind::NodeStart,
            Self::NodeStream { .. } => EventKind::NodeStream,
            Self::NodeDone { .. } => EventKind::NodeDone,
            Self::NodeRestored { .. } => EventKind::NodeRestored,
            Self::NodeSkipped { .. } => EventKind::NodeSkipped,
            Self::EdgeActive { .. } => EventKind::EdgeActive,
            Self::CouncilVote { .. } => EventKind::CouncilVote,
            Self::Error { .. } => EventKind::Error,
        }
    }
}

/// Per-kind default visual hints (`spec.md §4.1` visuals table). A UI is free to
/// ignore these or override them via node `visual_metadata`; the runner never reads
/// them back.
fn default_visuals(kind: EventKind) -> HashMap<String, String> {
    let pairs: &[(&str, &str)] = match kind {
        EventKind::NodeInit => &[("state", "IDLE")],
        EventKind::NodeStart => &[("state", "PULSING"), ("anim", "BREATHE")],
        EventKind::NodeStream => &[("overlay", "TEXT_BUBBLE")],
        EventKind::NodeDone => &[("state", "SOLID"), ("color", "GREEN")],
        EventKind::NodeRestored => &[("state", "SOLID"), ("color", "GREEN"), ("anim", "INSTANT")],
        EventKind::NodeSkipped => &[("state", "DIMMED")],
        EventKind::EdgeActive => &[("flow_speed", "FAST")],
        EventKind::CouncilVote => &[("widget", "VOTING_BOOTH")],
        EventKind::Error => &[("state", "RED")],
    };
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}
