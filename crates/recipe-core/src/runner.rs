//! The Workflow Runner (`spec.md §4.3`): walks a [`Topology`] one execution layer at
//! a time, dispatching nodes to their capability executor, pruning dead branches,
//! and streaming an ordered [`Event`] for every state transition.

use async_stream::stream;
use futures::future::join_all;
use recipe_checkpoint::{Output, Snapshot};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::{CapabilityError, ExecutionErrorKind};
use crate::event::{Event, EventPayload, EventStream};
use crate::model::{NodeId, NodeKind};
use crate::topology::Topology;

/// Per-run mutable bookkeeping: every node's recorded output and the set of nodes
/// pruned as unreachable. Owned exclusively by the single task driving a run —
/// never shared, so no synchronization is needed around it. The `sequence_id`
/// counter lives separately (see [`Emitter`]) because it alone is touched from
/// concurrently-dispatched node tasks.
struct RunState {
    state_map: HashMap<NodeId, Output>,
    skip_set: HashSet<NodeId>,
    /// Edges that have already had `EDGE_ACTIVE` emitted. A successor can sit more
    /// than one layer past a given predecessor (it waits on its slowest-resolving
    /// predecessor), so `propagate_edges` revisits every completed node on each
    /// call and needs this to avoid re-emitting the same edge.
    activated_edges: HashSet<(NodeId, NodeId)>,
}

impl RunState {
    fn new() -> Self {
        Self { state_map: HashMap::new(), skip_set: HashSet::new(), activated_edges: HashSet::new() }
    }
}

/// Bundles everything needed to publish an [`Event`]: the channel to the caller's
/// stream, the shared monotonic sequence counter, and the optional audit sink
/// (`spec.md §6`: `AuditSink.record` is best-effort and never fails the run).
/// Cheap to clone — cloned into every concurrently dispatched node task.
#[derive(Clone)]
struct Emitter {
    tx: mpsc::Sender<Event>,
    sequence: Arc<AtomicU64>,
    audit_sink: Option<Arc<dyn crate::context::AuditSink>>,
    trace_id: String,
    run_id: String,
    /// Flipped when the consumer drops the event stream, so the scheduler stops
    /// issuing new work (`spec.md §5`: dropping the stream cooperatively cancels
    /// in-flight node executions rather than leaving them to run unobserved).
    cancel: CancellationToken,
}

impl Emitter {
    fn new(
        tx: mpsc::Sender<Event>,
        trace_id: String,
        run_id: String,
        audit_sink: Option<Arc<dyn crate::context::AuditSink>>,
        cancel: CancellationToken,
    ) -> Self {
        Self { tx, sequence: Arc::new(AtomicU64::new(1)), audit_sink, trace_id, run_id, cancel }
    }

    async fn emit(&self, node_id: &str, payload: EventPayload) {
        let sequence_id = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = Event::new(&self.trace_id, &self.run_id, sequence_id, node_id, payload);
        if let Some(sink) = &self.audit_sink {
            sink.record(&event).await;
        }
        if self.tx.send(event).await.is_err() {
            // Consumer dropped the stream; stop scheduling further work. No
            // terminal `ERROR` is emitted for this case (`spec.md §5`).
            self.cancel.cancel();
        }
    }
}

/// Executes exactly one recipe over its lifetime. `run` consumes `self` by value:
/// a `Runner` cannot be reused for a second run, which gives the "at most one
/// in-flight run per runner" invariant (`spec.md §3`) a static guarantee instead of
/// a runtime-checked flag.
pub struct Runner {
    trace_id: String,
}

impl Runner {
    pub fn new() -> Self {
        Self { trace_id: Uuid::new_v4().to_string() }
    }

    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self { trace_id: trace_id.into() }
    }

    /// Runs `topology` to completion (or to its first execution error) and returns
    /// the resulting stream of events. The stream is driven lazily: nothing runs
    /// until the caller polls it.
    pub fn run(
        self,
        topology: Arc<Topology>,
        context: ExecutionContext,
        inputs: Value,
        snapshot: Option<Snapshot>,
    ) -> EventStream {
        let run_id = Uuid::new_v4().to_string();
        let trace_id = self.trace_id;
        let (tx, mut rx) = mpsc::channel::<Event>(256);
        let cancel = CancellationToken::new();
        let emitter = Emitter::new(tx, trace_id, run_id, context.audit_sink.clone(), cancel.clone());

        tokio::spawn(drive_run(topology, context, inputs, snapshot, emitter, cancel));

        Box::pin(stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        })
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

async fn drive_run(
    topology: Arc<Topology>,
    context: ExecutionContext,
    inputs: Value,
    snapshot: Option<Snapshot>,
    emitter: Emitter,
    cancel: CancellationToken,
) {
    let mut state = RunState::new();

    // Layer order, then unspecified intra-layer order (`spec.md §4.3`), rather than
    // `topology.node_ids()`'s arbitrary `HashMap` order.
    for layer in topology.layers() {
        for node_id in layer {
            let kind_tag = topology.node(node_id).expect("node id came from topology").kind.tag();
            emitter.emit(node_id, EventPayload::NodeInit { kind: kind_tag.to_string() }).await;
        }
    }

    if let Some(snapshot) = snapshot {
        restore_snapshot(&topology, &mut state, &emitter, snapshot).await;
    }

    for (layer_index, layer) in topology.layers().iter().enumerate() {
        if cancel.is_cancelled() {
            return;
        }

        let runnable: Vec<NodeId> = layer
            .iter()
            .filter(|id| !state.state_map.contains_key(*id) && !state.skip_set.contains(*id))
            .cloned()
            .collect();

        if runnable.is_empty() {
            continue;
        }

        tracing::debug!(run_id = %emitter.run_id, layer = layer_index, nodes = ?runnable, "entering layer barrier");

        let permits = context
            .max_parallel_nodes
            .unwrap_or(crate::context::DEFAULT_MAX_PARALLEL_NODES)
            .max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        // Every predecessor output a node may read was written by an earlier,
        // already-settled layer, so a single clone taken before dispatch is a
        // valid snapshot for the whole layer (`spec.md §5`: reads of completed
        // predecessor outputs happen on the scheduler side, before dispatch).
        let predecessor_snapshot = state.state_map.clone();

        let tasks = runnable.into_iter().map(|node_id| {
            let topology = Arc::clone(&topology);
            let context = context.clone();
            let semaphore = Arc::clone(&semaphore);
            let emitter = emitter.clone();
            let cancel = cancel.clone();
            let resolved_inputs = resolve_inputs(&topology, &predecessor_snapshot, &node_id, &inputs);

            async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                if cancel.is_cancelled() {
                    return None;
                }
                dispatch_node(&topology, &context, &emitter, &cancel, &node_id, &resolved_inputs)
                    .await
                    .map(|result| (node_id, result))
            }
        });

        let outcomes = join_all(tasks).await;

        // Insert every success into `state_map` before acting on any failure: `join_all`
        // has already awaited all siblings, so a node that completed but sorts after a
        // failing sibling in `outcomes` must still land in the ERROR event's snapshot
        // (`spec.md §4.3`: the snapshot must be "sufficient to resume").
        let mut failure = None;
        for outcome in outcomes.into_iter().flatten() {
            let (node_id, result) = outcome;
            match result {
                Ok(output) => {
                    state.state_map.insert(node_id, output);
                }
                Err(err) => {
                    if failure.is_none() {
                        failure = Some((node_id, err));
                    }
                }
            }
        }

        if let Some((node_id, (kind, message))) = failure {
            tracing::error!(run_id = %emitter.run_id, node_id = %node_id, error_kind = %kind, message = %message, "node execution failed, cancelling run");
            cancel.cancel();
            emitter
                .emit(
                    "",
                    EventPayload::Error {
                        node_id: node_id.clone(),
                        error_kind: kind,
                        message,
                        snapshot: state.state_map.clone(),
                    },
                )
                .await;
            return;
        }

        if cancel.is_cancelled() {
            return;
        }

        propagate_edges(&topology, &mut state, &emitter).await;
    }
}

/// Builds the resolved-inputs value handed to a single node's executor
/// (`spec.md §4.3`): a mapping keyed by predecessor `node_id` to that predecessor's
/// output, plus the run's global `inputs` under the reserved `__inputs__` key.
/// `predecessor_snapshot` is a scheduler-side copy of `state_map` taken before the
/// layer's concurrent dispatch begins, never the live map.
fn resolve_inputs(
    topology: &Topology,
    predecessor_snapshot: &HashMap<NodeId, Output>,
    node_id: &str,
    global_inputs: &Value,
) -> Value {
    let mut resolved = serde_json::Map::new();
    for predecessor in topology.predecessors(node_id) {
        if let Some(output) = predecessor_snapshot.get(predecessor) {
            resolved.insert(predecessor.clone(), output.value.clone());
        }
    }
    resolved.insert("__inputs__".to_string(), global_inputs.clone());
    Value::Object(resolved)
}

async fn restore_snapshot(topology: &Topology, state: &mut RunState, emitter: &Emitter, snapshot: Snapshot) {
    for (node_id, output) in snapshot {
        if topology.node(&node_id).is_none() {
            continue;
        }
        emitter.emit(&node_id, EventPayload::NodeRestored { output: output.value.clone() }).await;
        state.state_map.insert(node_id, output);
    }
    propagate_edges(topology, state, emitter).await;
}

/// After a layer (or a snapshot restore) settles, walk every completed node's
/// outgoing edges: emit `EDGE_ACTIVE` for satisfied edges, and mark the target
/// unreachable (adding it to `skip_set`, transitively) once every inbound edge is
/// either unsatisfied or sourced from an already-skipped node (`spec.md §4.3`,
/// "transitive dead-branch pruning").
async fn propagate_edges(topology: &Topology, state: &mut RunState, emitter: &Emitter) {
    let completed: Vec<NodeId> = state.state_map.keys().cloned().collect();

    for source in &completed {
        let output = &state.state_map[source];
        for target in topology.successors(source) {
            if state.activated_edges.contains(&(source.clone(), target.clone())) {
                continue;
            }
            let edge = topology.edge(source, target).expect("successor implies edge exists");
            let satisfied = match &edge.condition {
                None => true,
                Some(label) => output.branch_key.as_deref() == Some(label.as_str()),
            };
            if satisfied {
                state.activated_edges.insert((source.clone(), target.clone()));
                emitter.emit("", EventPayload::EdgeActive { from: source.clone(), to: target.clone() }).await;
            }
        }
    }

    loop {
        let mut newly_skipped = Vec::new();
        for node_id in topology.node_ids() {
            if state.state_map.contains_key(node_id) || state.skip_set.contains(node_id) {
                continue;
            }
            let predecessors = topology.predecessors(node_id);
            if predecessors.is_empty() {
                continue;
            }
            let all_dead = predecessors.iter().all(|pred| {
                if state.skip_set.contains(pred) {
                    return true;
                }
                match state.state_map.get(pred) {
                    None => false,
                    Some(output) => {
                        let edge = topology.edge(pred, node_id).expect("predecessor implies edge exists");
                        match &edge.condition {
                            None => false,
                            Some(label) => output.branch_key.as_deref() != Some(label.as_str()),
                        }
                    }
                }
            });
            if all_dead {
                newly_skipped.push(node_id.clone());
            }
        }

        if newly_skipped.is_empty() {
            break;
        }

        for node_id in newly_skipped {
            state.skip_set.insert(node_id.clone());
            emitter.emit(&node_id, EventPayload::NodeSkipped { reason: "no satisfied inbound edge".to_string() }).await;
        }
    }
}

/// Races a capability call against the run's cancellation signal so an in-flight
/// node execution is abandoned promptly rather than run to completion after a
/// sibling error or a dropped consumer (`spec.md §5`: cancellation is propagated
/// "into every capability call"). Returns `None` if cancellation wins.
async fn race_cancel<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Dispatches one node to its capability executor. Returns `None` if the run was
/// cancelled while the capability call was in flight — the caller treats this
/// exactly like a node that never got a chance to start: nothing is inserted into
/// `state_map` and no further event is emitted for it.
async fn dispatch_node(
    topology: &Topology,
    context: &ExecutionContext,
    emitter: &Emitter,
    cancel: &CancellationToken,
    node_id: &str,
    inputs: &Value,
) -> Option<Result<Output, (ExecutionErrorKind, String)>> {
    let node = topology.node(node_id).expect("node id came from topology's own layers");

    tracing::debug!(run_id = %emitter.run_id, node_id = %node_id, kind = node.kind.tag(), "dispatching node");
    emitter.emit(node_id, EventPayload::NodeStart { inputs_summary: inputs.clone() }).await;

    if let Some(council) = &node.council_config {
        let outcome = race_cancel(cancel, context.council_executor.execute(council, inputs)).await?;
        return Some(match outcome {
            Ok(council_result) => {
                // The spec frames a council as one node whose START/DONE pair
                // *encloses* its vote, so COUNCIL_VOTE is emitted before the
                // terminal NODE_DONE rather than after it.
                emitter
                    .emit(
                        node_id,
                        EventPayload::CouncilVote {
                            votes: council_result.votes,
                            synthesis: council_result.output.value.clone(),
                        },
                    )
                    .await;
                emitter
                    .emit(
                        node_id,
                        EventPayload::NodeDone {
                            output: council_result.output.value.clone(),
                            cost: council_result.output.cost,
                        },
                    )
                    .await;
                tracing::debug!(run_id = %emitter.run_id, node_id = %node_id, "council node completed");
                Ok(council_result.output)
            }
            Err(CapabilityError::Timeout(ms)) => Err((ExecutionErrorKind::HumanTimeout, format!("timed out after {ms}ms"))),
            Err(CapabilityError::Failed(message)) => Err((ExecutionErrorKind::NodeExecutionFailed, message)),
        });
    }

    let outcome = race_cancel(cancel, async {
        match &node.kind {
            NodeKind::Agent { agent_name, overrides } => {
                context.agent_executor.execute(agent_name, overrides.as_ref(), inputs).await
            }
            NodeKind::Logic { tool_name } => context.tool_executor.execute(tool_name, inputs).await,
            NodeKind::Human { timeout_ms } => context.human_gate.await_decision(node_id, inputs, *timeout_ms).await,
        }
    })
    .await?;

    Some(match outcome {
        Ok(executor_result) => {
            for chunk in &executor_result.chunks {
                emitter.emit(node_id, EventPayload::NodeStream { chunk: chunk.clone() }).await;
            }
            emitter
                .emit(
                    node_id,
                    EventPayload::NodeDone { output: executor_result.output.value.clone(), cost: executor_result.output.cost },
                )
                .await;
            tracing::debug!(run_id = %emitter.run_id, node_id = %node_id, "node completed");
            Ok(executor_result.output)
        }
        Err(CapabilityError::Timeout(ms)) => Err((ExecutionErrorKind::HumanTimeout, format!("timed out after {ms}ms"))),
        Err(CapabilityError::Failed(message)) => Err((ExecutionErrorKind::NodeExecutionFailed, message)),
    })
}
