//! Builds and validates the in-memory DAG, and computes parallel execution layers
//! (`spec.md §4.2`).

use crate::error::{RecipeError, Result};
use crate::model::{Edge, Node, NodeId, Recipe};
use std::collections::{HashMap, HashSet, VecDeque};

/// A validated, layered DAG derived from a [`Recipe`]. Read-only for the duration
/// of a run; owned exclusively by the [`crate::runner::Runner`] that built it.
#[derive(Debug, Clone)]
pub struct Topology {
    nodes: HashMap<NodeId, Node>,
    edges: HashMap<(NodeId, NodeId), Edge>,
    successors: HashMap<NodeId, Vec<NodeId>>,
    predecessors: HashMap<NodeId, Vec<NodeId>>,
    layers: Vec<Vec<NodeId>>,
}

impl Topology {
    /// Validates `recipe.graph` and computes execution layers.
    ///
    /// Checks, in order: every edge endpoint is a declared node
    /// ([`RecipeError::DanglingEdge`]); the graph is acyclic
    /// ([`RecipeError::CyclicDependency`]); the undirected projection is a single
    /// connected component when there are two or more nodes
    /// ([`RecipeError::DisconnectedGraph`]).
    pub fn build(recipe: &Recipe) -> Result<Self> {
        let mut nodes = HashMap::new();
        for node in &recipe.graph.nodes {
            if nodes.insert(node.node_id.clone(), node.clone()).is_some() {
                return Err(RecipeError::Validation(format!(
                    "duplicate node id '{}'",
                    node.node_id
                )));
            }
        }

        let mut edges: HashMap<(NodeId, NodeId), Edge> = HashMap::new();
        let mut successors: HashMap<NodeId, Vec<NodeId>> =
            nodes.keys().map(|n| (n.clone(), Vec::new())).collect();
        let mut predecessors: HashMap<NodeId, Vec<NodeId>> =
            nodes.keys().map(|n| (n.clone(), Vec::new())).collect();

        for edge in &recipe.graph.edges {
            if !nodes.contains_key(&edge.source_node_id) {
                return Err(RecipeError::DanglingEdge(edge.source_node_id.clone()));
            }
            if !nodes.contains_key(&edge.target_node_id) {
                return Err(RecipeError::DanglingEdge(edge.target_node_id.clone()));
            }
            let key = (edge.source_node_id.clone(), edge.target_node_id.clone());
            if edges.insert(key, edge.clone()).is_some() {
                return Err(RecipeError::Validation(format!(
                    "duplicate edge {} -> {}",
                    edge.source_node_id, edge.target_node_id
                )));
            }
            successors.get_mut(&edge.source_node_id).unwrap().push(edge.target_node_id.clone());
            predecessors.get_mut(&edge.target_node_id).unwrap().push(edge.source_node_id.clone());
        }

        let layers = compute_layers(&nodes, &successors, &predecessors)?;
        check_connected(&nodes, &successors, &predecessors)?;

        tracing::debug!(
            node_count = nodes.len(),
            edge_count = edges.len(),
            layer_count = layers.len(),
            "topology built"
        );

        Ok(Self { nodes, edges, successors, predecessors, layers })
    }

    pub fn layers(&self) -> &[Vec<NodeId>] {
        &self.layers
    }

    pub fn successors(&self, node_id: &str) -> &[NodeId] {
        self.successors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn predecessors(&self, node_id: &str) -> &[NodeId] {
        self.predecessors.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge(&self, source: &str, target: &str) -> Option<&Edge> {
        self.edges.get(&(source.to_string(), target.to_string()))
    }

    pub fn node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.get(node_id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Kahn's algorithm variant producing generations: repeatedly extract all nodes
/// whose unresolved in-degree is zero as one layer, decrement successors' in-degree,
/// repeat until empty. If nodes remain once no layer can be extracted, those nodes
/// are a cycle.
///
/// Nodes within a layer are sorted by id for a deterministic reference run; this
/// ordering is not part of the contract — `spec.md §4.2` leaves intra-layer order
/// unspecified and no invariant may depend on it.
fn compute_layers(
    nodes: &HashMap<NodeId, Node>,
    successors: &HashMap<NodeId, Vec<NodeId>>,
    predecessors: &HashMap<NodeId, Vec<NodeId>>,
) -> Result<Vec<Vec<NodeId>>> {
    let mut in_degree: HashMap<NodeId, usize> =
        nodes.keys().map(|n| (n.clone(), predecessors[n].len())).collect();

    let mut layers = Vec::new();
    let mut remaining = nodes.len();
    let mut frontier: VecDeque<NodeId> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(n, _)| n.clone())
        .collect();

    while !frontier.is_empty() {
        let mut layer: Vec<NodeId> = frontier.drain(..).collect();
        layer.sort();
        remaining -= layer.len();

        for node_id in &layer {
            for succ in &successors[node_id] {
                let deg = in_degree.get_mut(succ).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    frontier.push_back(succ.clone());
                }
            }
        }
        layers.push(layer);
    }

    if remaining > 0 {
        let cyclic: Vec<String> = in_degree
            .into_iter()
            .filter(|(_, deg)| *deg > 0)
            .map(|(n, _)| n)
            .collect();
        tracing::warn!(nodes = ?cyclic, "rejecting cyclic recipe");
        return Err(RecipeError::CyclicDependency(cyclic));
    }

    Ok(layers)
}

/// Verifies the undirected projection of the graph has exactly one connected
/// component. Single-node graphs are always permitted.
fn check_connected(
    nodes: &HashMap<NodeId, Node>,
    successors: &HashMap<NodeId, Vec<NodeId>>,
    predecessors: &HashMap<NodeId, Vec<NodeId>>,
) -> Result<()> {
    if nodes.len() < 2 {
        return Ok(());
    }

    let mut visited: HashSet<&NodeId> = HashSet::new();
    let start = nodes.keys().next().unwrap();
    let mut queue = VecDeque::from([start]);
    visited.insert(start);

    while let Some(node_id) = queue.pop_front() {
        for neighbor in successors[node_id].iter().chain(predecessors[node_id].iter()) {
            if visited.insert(neighbor) {
                queue.push_back(neighbor);
            }
        }
    }

    if visited.len() != nodes.len() {
        let components = count_components(nodes, successors, predecessors);
        return Err(RecipeError::DisconnectedGraph(components));
    }

    Ok(())
}

fn count_components(
    nodes: &HashMap<NodeId, Node>,
    successors: &HashMap<NodeId, Vec<NodeId>>,
    predecessors: &HashMap<NodeId, Vec<NodeId>>,
) -> usize {
    let mut visited: HashSet<&NodeId> = HashSet::new();
    let mut components = 0;

    for start in nodes.keys() {
        if visited.contains(start) {
            continue;
        }
        components += 1;
        let mut queue = VecDeque::from([start]);
        visited.insert(start);
        while let Some(node_id) = queue.pop_front() {
            for neighbor in successors[node_id].iter().chain(predecessors[node_id].iter()) {
                if visited.insert(neighbor) {
                    queue.push_back(neighbor);
                }
            }
        }
    }
    components
}
