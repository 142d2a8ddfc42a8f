//! End-to-end tests driving `Controller::execute_recipe` over small recipes with
//! stub capability implementations, covering the engine's core testable properties:
//! linear sequencing, parallel fan-out, conditional pruning (direct and transitive),
//! resume-from-snapshot, and cycle rejection.

use async_trait::async_trait;
use recipe_core::{
    AgentExecutor, AuditSink, Controller, CouncilConfig, CouncilExecutor, CouncilResult, Edge,
    ExecutionContext, Event, ExecutorResult, HumanGate, ManifestValidator, Node, NodeKind, Output,
    Recipe, RecipeGraph, RecipeError, ToolExecutor,
};
use recipe_core::{CapabilityError, EventKind, EventPayload};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

struct EchoTool;

#[async_trait]
impl ToolExecutor for EchoTool {
    async fn execute(&self, tool_name: &str, inputs: &Value) -> Result<ExecutorResult, CapabilityError> {
        Ok(ExecutorResult::new(Output::new(json!({ "tool": tool_name, "inputs": inputs }))))
    }
}

/// A tool executor whose branch_key is driven by a per-node lookup table, for
/// exercising conditional routing deterministically.
struct RoutingTool(HashMap<String, String>);

#[async_trait]
impl ToolExecutor for RoutingTool {
    async fn execute(&self, tool_name: &str, _inputs: &Value) -> Result<ExecutorResult, CapabilityError> {
        let mut output = Output::new(json!({ "tool": tool_name }));
        if let Some(branch) = self.0.get(tool_name) {
            output = output.with_branch_key(branch.clone());
        }
        Ok(ExecutorResult::new(output))
    }
}

struct NoopAgent;

#[async_trait]
impl AgentExecutor for NoopAgent {
    async fn execute(&self, agent_name: &str, _overrides: Option<&Value>, _inputs: &Value) -> Result<ExecutorResult, CapabilityError> {
        Ok(ExecutorResult::new(Output::new(json!({ "agent": agent_name }))))
    }
}

struct NoopHumanGate;

#[async_trait]
impl HumanGate for NoopHumanGate {
    async fn await_decision(&self, _node_id: &str, _inputs: &Value, _timeout_ms: Option<u64>) -> Result<ExecutorResult, CapabilityError> {
        Ok(ExecutorResult::new(Output::new(json!({ "approved": true }))))
    }
}

struct MajorityCouncil;

#[async_trait]
impl CouncilExecutor for MajorityCouncil {
    async fn execute(&self, config: &CouncilConfig, _inputs: &Value) -> Result<CouncilResult, CapabilityError> {
        let votes: HashMap<String, Value> =
            config.voters.iter().map(|v| (v.clone(), json!("yes"))).collect();
        Ok(CouncilResult { votes, output: Output::new(json!({ "decision": "yes" })) })
    }
}

#[derive(Default)]
struct RecordingAuditSink {
    events: Mutex<Vec<Event>>,
}

#[async_trait]
impl AuditSink for RecordingAuditSink {
    async fn record(&self, event: &Event) {
        self.events.lock().unwrap().push(event.clone());
    }
}

struct PermissiveValidator;

#[async_trait]
impl ManifestValidator for PermissiveValidator {
    async fn parse(&self, raw: &Value) -> Result<Recipe, CapabilityError> {
        serde_json::from_value(raw.clone()).map_err(|e| CapabilityError::Failed(e.to_string()))
    }
}

fn context_with_tool(tool: Arc<dyn ToolExecutor>) -> ExecutionContext {
    ExecutionContext::new(Arc::new(NoopAgent), tool, Arc::new(NoopHumanGate), Arc::new(MajorityCouncil), Arc::new(PermissiveValidator))
}

fn default_context() -> ExecutionContext {
    context_with_tool(Arc::new(EchoTool))
}

fn logic_node(id: &str) -> Node {
    Node {
        node_id: id.to_string(),
        kind: NodeKind::Logic { tool_name: format!("tool_{id}") },
        council_config: None,
        visual_metadata: None,
        metadata: None,
    }
}

fn edge(source: &str, target: &str) -> Edge {
    Edge { source_node_id: source.to_string(), target_node_id: target.to_string(), condition: None }
}

fn conditional_edge(source: &str, target: &str, label: &str) -> Edge {
    Edge { source_node_id: source.to_string(), target_node_id: target.to_string(), condition: Some(label.to_string()) }
}

fn recipe(nodes: Vec<Node>, edges: Vec<Edge>) -> Recipe {
    Recipe {
        id: "r1".to_string(),
        version: "1".to_string(),
        name: "test recipe".to_string(),
        description: None,
        inputs: HashMap::new(),
        graph: RecipeGraph { nodes, edges },
    }
}

#[tokio::test]
async fn linear_chain_emits_in_order_with_strictly_increasing_sequence_ids() {
    let r = recipe(vec![logic_node("a"), logic_node("b"), logic_node("c")], vec![edge("a", "b"), edge("b", "c")]);

    let controller = Controller::new();
    let mut stream = controller.execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), default_context(), None).await.unwrap();

    let mut sequence_ids = Vec::new();
    let mut done_order = Vec::new();
    while let Some(event) = stream.next().await {
        sequence_ids.push(event.sequence_id);
        if event.event_type == EventKind::NodeDone {
            done_order.push(event.node_id.clone());
        }
    }

    for window in sequence_ids.windows(2) {
        assert!(window[0] < window[1], "sequence ids must strictly increase");
    }
    assert_eq!(done_order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
}

#[tokio::test]
async fn fan_out_nodes_both_complete_in_shared_layer() {
    let r = recipe(
        vec![logic_node("a"), logic_node("b"), logic_node("c"), logic_node("d")],
        vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
    );

    let controller = Controller::new();
    let mut stream = controller.execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), default_context(), None).await.unwrap();

    let mut done: Vec<String> = Vec::new();
    while let Some(event) = stream.next().await {
        if event.event_type == EventKind::NodeDone {
            done.push(event.node_id);
        }
    }
    assert_eq!(done.len(), 4);
    assert!(done.iter().position(|n| n == "b").unwrap() < done.iter().position(|n| n == "d").unwrap());
    assert!(done.iter().position(|n| n == "c").unwrap() < done.iter().position(|n| n == "d").unwrap());
}

#[tokio::test]
async fn unsatisfied_condition_skips_the_direct_target_only() {
    let mut routes = HashMap::new();
    routes.insert("tool_a".to_string(), "left".to_string());

    let r = recipe(
        vec![logic_node("a"), logic_node("b"), logic_node("c")],
        vec![conditional_edge("a", "b", "left"), conditional_edge("a", "c", "right")],
    );

    let controller = Controller::new();
    let mut stream = controller
        .execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), context_with_tool(Arc::new(RoutingTool(routes))), None)
        .await
        .unwrap();

    let mut done = Vec::new();
    let mut skipped = Vec::new();
    while let Some(event) = stream.next().await {
        match event.event_type {
            EventKind::NodeDone => done.push(event.node_id),
            EventKind::NodeSkipped => skipped.push(event.node_id),
            _ => {}
        }
    }

    assert!(done.contains(&"b".to_string()));
    assert!(!done.contains(&"c".to_string()));
    assert_eq!(skipped, vec!["c".to_string()]);
}

#[tokio::test]
async fn transitive_pruning_skips_descendants_of_a_dead_branch() {
    let mut routes = HashMap::new();
    routes.insert("tool_a".to_string(), "left".to_string());

    let r = recipe(
        vec![logic_node("a"), logic_node("b"), logic_node("c"), logic_node("d")],
        vec![
            conditional_edge("a", "b", "left"),
            conditional_edge("a", "c", "right"),
            edge("c", "d"),
        ],
    );

    let controller = Controller::new();
    let mut stream = controller
        .execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), context_with_tool(Arc::new(RoutingTool(routes))), None)
        .await
        .unwrap();

    let mut skipped = Vec::new();
    while let Some(event) = stream.next().await {
        if event.event_type == EventKind::NodeSkipped {
            skipped.push(event.node_id);
        }
    }

    assert!(skipped.contains(&"c".to_string()));
    assert!(skipped.contains(&"d".to_string()), "d has no live inbound edge once c is skipped");
}

#[tokio::test]
async fn resume_from_snapshot_restores_and_still_propagates_edges() {
    let r = recipe(vec![logic_node("a"), logic_node("b")], vec![edge("a", "b")]);

    let mut snapshot = HashMap::new();
    snapshot.insert("a".to_string(), Output::new(json!({ "restored": true })));

    let controller = Controller::new();
    let mut stream = controller
        .execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), default_context(), Some(snapshot))
        .await
        .unwrap();

    let mut restored = Vec::new();
    let mut done = Vec::new();
    let mut edge_active = Vec::new();
    while let Some(event) = stream.next().await {
        match event.event_type {
            EventKind::NodeRestored => restored.push(event.node_id),
            EventKind::NodeDone => done.push(event.node_id),
            EventKind::EdgeActive => edge_active.push((event.payload.clone(), event.sequence_id)),
            _ => {}
        }
    }

    assert_eq!(restored, vec!["a".to_string()]);
    assert_eq!(done, vec!["b".to_string()]);
    assert_eq!(edge_active.len(), 1);
}

#[tokio::test]
async fn cyclic_recipe_is_rejected_before_any_event_is_emitted() {
    let r = recipe(vec![logic_node("a"), logic_node("b")], vec![edge("a", "b"), edge("b", "a")]);

    let controller = Controller::new();
    let err = controller.execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), default_context(), None).await.unwrap_err();
    assert!(matches!(err, RecipeError::CyclicDependency(_)));
}

#[tokio::test]
async fn audit_sink_receives_every_published_event() {
    let r = recipe(vec![logic_node("a"), logic_node("b")], vec![edge("a", "b")]);
    let sink = Arc::new(RecordingAuditSink::default());

    let controller = Controller::new();
    let context = default_context().with_audit_sink(sink.clone());
    let mut stream = controller.execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), context, None).await.unwrap();

    let mut stream_event_count = 0;
    while stream.next().await.is_some() {
        stream_event_count += 1;
    }

    let recorded = sink.events.lock().unwrap();
    assert_eq!(recorded.len(), stream_event_count, "audit sink must see every event published on the stream");
}

#[tokio::test]
async fn council_node_emits_a_vote_event_alongside_node_done() {
    let mut node = logic_node("a");
    node.council_config = Some(CouncilConfig {
        strategy: recipe_core::CouncilStrategy::Majority,
        voters: vec!["voter-1".to_string(), "voter-2".to_string()],
    });

    let r = recipe(vec![node], vec![]);
    let controller = Controller::new();
    let mut stream = controller.execute_recipe(serde_json::to_value(&r).unwrap(), json!({}), default_context(), None).await.unwrap();

    let mut saw_vote = false;
    while let Some(event) = stream.next().await {
        if event.event_type == EventKind::CouncilVote {
            saw_vote = true;
        }
    }
    assert!(saw_vote);
}

#[tokio::test]
async fn downstream_node_sees_predecessor_output_and_global_inputs() {
    let r = recipe(vec![logic_node("a"), logic_node("b")], vec![edge("a", "b")]);

    let controller = Controller::new();
    let mut stream = controller
        .execute_recipe(serde_json::to_value(&r).unwrap(), json!({ "topic": "bees" }), default_context(), None)
        .await
        .unwrap();

    let mut b_inputs_summary = None;
    while let Some(event) = stream.next().await {
        if event.event_type == EventKind::NodeStart && event.node_id == "b" {
            if let EventPayload::NodeStart { inputs_summary } = event.payload {
                b_inputs_summary = Some(inputs_summary);
            }
        }
    }

    let resolved = b_inputs_summary.expect("b must have started");
    assert_eq!(resolved["__inputs__"], json!({ "topic": "bees" }));
    assert_eq!(resolved["a"]["tool"], json!("tool_a"));
}
