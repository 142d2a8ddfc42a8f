//! Capability contracts (`spec.md §6`): the engine never owns transport, model
//! access, tool execution, human interaction, manifest validation, or audit
//! persistence. It only consumes these narrow async traits, injected per-run via
//! [`ExecutionContext`].

use async_trait::async_trait;
use recipe_checkpoint::Output;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CapabilityError;
use crate::model::{CouncilConfig, Recipe};

/// The result of dispatching a single node to a capability executor: its final
/// [`Output`] plus any incremental chunks produced along the way, collected ahead
/// of time rather than streamed live (see `event.rs`'s note on `NODE_STREAM`).
#[derive(Debug, Clone)]
pub struct ExecutorResult {
    pub output: Output,
    pub chunks: Vec<Value>,
}

impl ExecutorResult {
    pub fn new(output: Output) -> Self {
        Self { output, chunks: Vec::new() }
    }

    pub fn with_chunks(mut self, chunks: Vec<Value>) -> Self {
        self.chunks = chunks;
        self
    }
}

/// Runs an `agent` node. `agent_name` and `overrides` come straight from the
/// node's `NodeKind::Agent` declaration.
#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn execute(
        &self,
        agent_name: &str,
        overrides: Option<&Value>,
        inputs: &Value,
    ) -> Result<ExecutorResult, CapabilityError>;
}

/// Runs a `logic` node's named tool.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(
        &self,
        tool_name: &str,
        inputs: &Value,
    ) -> Result<ExecutorResult, CapabilityError>;
}

/// Suspends execution of a `human` node until an external decision arrives.
/// A node without `timeout_ms` waits indefinitely; the engine applies no implicit
/// timeout of its own.
#[async_trait]
pub trait HumanGate: Send + Sync {
    async fn await_decision(
        &self,
        node_id: &str,
        inputs: &Value,
        timeout_ms: Option<u64>,
    ) -> Result<ExecutorResult, CapabilityError>;
}

/// Parses an untyped manifest (e.g. JSON received over the wire) into a validated
/// [`Recipe`], before the controller builds a [`crate::topology::Topology`] from it
/// (`spec.md §6`: `ManifestValidator.parse(raw: untyped) → Recipe | ValidationError`).
/// Distinct from structural validation (cycles, dangling edges), which the engine
/// always performs itself once a `Recipe` exists.
#[async_trait]
pub trait ManifestValidator: Send + Sync {
    async fn parse(&self, raw: &Value) -> Result<Recipe, CapabilityError>;
}

/// Receives a copy of every emitted [`crate::event::Event`] for durable audit
/// logging. Best-effort from the engine's perspective: a sink failure is logged via
/// `tracing` and never aborts the run.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &crate::event::Event);
}

/// The outcome of a council's map-reduce: every voter's raw verdict keyed by voter
/// name (`spec.md §4.1`: `COUNCIL_VOTE`'s `{votes: {voter → verdict}, synthesis}`),
/// plus the reduced [`Output`] stored in `state_map` and reported via `NODE_DONE`.
#[derive(Debug, Clone)]
pub struct CouncilResult {
    pub votes: HashMap<String, Value>,
    pub output: Output,
}

/// Resolves a council's voters to [`AgentExecutor`] dispatches and reduces their
/// votes per [`CouncilConfig::strategy`]. Kept separate from [`AgentExecutor`]
/// because the reduction strategy (consensus vs. majority) is orthogonal to how any
/// one voter is invoked.
#[async_trait]
pub trait CouncilExecutor: Send + Sync {
    async fn execute(
        &self,
        config: &CouncilConfig,
        inputs: &Value,
    ) -> Result<CouncilResult, CapabilityError>;
}

/// Upper bound on concurrently in-flight node executions within a single layer
/// when the caller leaves [`ExecutionContext::max_parallel_nodes`] unset
/// (`spec.md §6`: "optional `max_parallel_nodes` (default 8)").
pub const DEFAULT_MAX_PARALLEL_NODES: usize = 8;

/// Everything a [`crate::runner::Runner`] needs to execute one recipe, collected in
/// one place the way the spec's §6 capability contracts are described. Cheap to
/// clone: every field is already an `Arc`.
#[derive(Clone)]
pub struct ExecutionContext {
    pub agent_executor: Arc<dyn AgentExecutor>,
    pub tool_executor: Arc<dyn ToolExecutor>,
    pub human_gate: Arc<dyn HumanGate>,
    pub council_executor: Arc<dyn CouncilExecutor>,
    pub manifest_validator: Arc<dyn ManifestValidator>,
    pub audit_sink: Option<Arc<dyn AuditSink>>,
    /// Upper bound on concurrently in-flight node executions within a single
    /// layer (`spec.md §5`). `None` means [`DEFAULT_MAX_PARALLEL_NODES`] (8).
    pub max_parallel_nodes: Option<usize>,
}

impl ExecutionContext {
    pub fn new(
        agent_executor: Arc<dyn AgentExecutor>,
        tool_executor: Arc<dyn ToolExecutor>,
        human_gate: Arc<dyn HumanGate>,
        council_executor: Arc<dyn CouncilExecutor>,
        manifest_validator: Arc<dyn ManifestValidator>,
    ) -> Self {
        Self {
            agent_executor,
            tool_executor,
            human_gate,
            council_executor,
            manifest_validator,
            audit_sink: None,
            max_parallel_nodes: None,
        }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit_sink = Some(sink);
        self
    }

    pub fn with_max_parallel_nodes(mut self, max: usize) -> Self {
        self.max_parallel_nodes = Some(max);
        self
    }
}
