//! Snapshot graph built on petgraph.
//!
//! The engine and the validator both need edge-indexed views of a frozen
//! snapshot: successors for fan-out, predecessors for readiness checks,
//! cycle detection for validation. This wraps a petgraph `DiGraph` with
//! node IDs as weights and snapshot edges as edge weights, plus an
//! ID-to-index map for O(1) lookup.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::HashMap;

use crate::definition::WorkflowSnapshot;
use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::NodeId;
use crate::plugin::NodeCategory;
use crate::registry::NodeRegistry;

/// An edge-indexed view of a workflow snapshot.
#[derive(Debug, Clone)]
pub struct SnapshotGraph {
    graph: DiGraph<NodeId, Edge>,
    node_index: HashMap<NodeId, NodeIndex>,
}

impl SnapshotGraph {
    /// Builds the graph from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if an edge references a node missing from the
    /// snapshot.
    pub fn from_snapshot(snapshot: &WorkflowSnapshot) -> Result<Self, GraphError> {
        let mut graph = DiGraph::new();
        let mut node_index = HashMap::new();

        for node in &snapshot.nodes {
            let index = graph.add_node(node.id);
            node_index.insert(node.id, index);
        }

        for edge in &snapshot.edges {
            let source = *node_index.get(&edge.source_node).ok_or(
                GraphError::EdgeEndpointMissing {
                    node_id: edge.source_node,
                },
            )?;
            let target = *node_index.get(&edge.target_node).ok_or(
                GraphError::EdgeEndpointMissing {
                    node_id: edge.target_node,
                },
            )?;
            graph.add_edge(source, target, edge.clone());
        }

        Ok(Self { graph, node_index })
    }

    /// Returns the outgoing edges of a node.
    #[must_use]
    pub fn successors(&self, node_id: NodeId) -> Vec<&Edge> {
        let Some(&index) = self.node_index.get(&node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Outgoing)
            .map(|e| e.weight())
            .collect()
    }

    /// Returns the incoming edges of a node.
    #[must_use]
    pub fn predecessors(&self, node_id: NodeId) -> Vec<&Edge> {
        let Some(&index) = self.node_index.get(&node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Incoming)
            .map(|e| e.weight())
            .collect()
    }

    /// Returns the distinct upstream node IDs of a node.
    #[must_use]
    pub fn predecessor_nodes(&self, node_id: NodeId) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self
            .predecessors(node_id)
            .into_iter()
            .map(|e| e.source_node)
            .collect();
        nodes.sort_unstable_by_key(NodeId::as_ulid);
        nodes.dedup();
        nodes
    }

    /// Returns true if the graph contains a cycle.
    #[must_use]
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Returns true if the node is part of the graph.
    #[must_use]
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.node_index.contains_key(&node_id)
    }

    /// Validates the snapshot against the registry:
    /// - no cycles
    /// - every node's type is registered
    /// - every non-trigger node has at least one incoming edge
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(
        &self,
        snapshot: &WorkflowSnapshot,
        registry: &NodeRegistry,
    ) -> Result<(), GraphError> {
        if self.is_cyclic() {
            return Err(GraphError::CycleDetected);
        }

        for node in &snapshot.nodes {
            let category =
                registry
                    .category_of(node)
                    .map_err(|_| GraphError::UnknownNodeType {
                        node_id: node.id,
                        sub_type: node.sub_type.clone(),
                    })?;

            if category != NodeCategory::Trigger && self.predecessors(node.id).is_empty() {
                return Err(GraphError::MissingIncomingEdge { node_id: node.id });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Workflow;
    use crate::node::NodeInstance;

    fn linear_snapshot() -> (WorkflowSnapshot, NodeId, NodeId, NodeId) {
        let mut workflow = Workflow::new("Test");
        let a = workflow.add_node(NodeInstance::new(
            "core.manual_trigger",
            "A",
            serde_json::json!({}),
        ));
        let b = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "B",
            serde_json::json!({"values": {}}),
        ));
        let c = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "C",
            serde_json::json!({"values": {}}),
        ));
        workflow.add_edge(Edge::with_default_ports(a, b));
        workflow.add_edge(Edge::with_default_ports(b, c));
        (workflow.snapshot(), a, b, c)
    }

    #[test]
    fn successors_and_predecessors() {
        let (snapshot, a, b, c) = linear_snapshot();
        let graph = SnapshotGraph::from_snapshot(&snapshot).expect("should build");

        let from_a = graph.successors(a);
        assert_eq!(from_a.len(), 1);
        assert_eq!(from_a[0].target_node, b);

        assert_eq!(graph.predecessor_nodes(c), vec![b]);
        assert!(graph.predecessors(a).is_empty());
    }

    #[test]
    fn rejects_dangling_edge() {
        let (mut snapshot, a, _b, _c) = linear_snapshot();
        snapshot
            .edges
            .push(Edge::with_default_ports(a, NodeId::new()));

        let result = SnapshotGraph::from_snapshot(&snapshot);
        assert!(matches!(
            result,
            Err(GraphError::EdgeEndpointMissing { .. })
        ));
    }

    #[test]
    fn detects_cycle() {
        let (mut snapshot, a, _b, c) = linear_snapshot();
        snapshot.edges.push(Edge::with_default_ports(c, a));

        let graph = SnapshotGraph::from_snapshot(&snapshot).expect("should build");
        assert!(graph.is_cyclic());

        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            graph.validate(&snapshot, &registry).err(),
            Some(GraphError::CycleDetected)
        );
    }

    #[test]
    fn validate_flags_unknown_type() {
        let mut workflow = Workflow::new("Test");
        let a = workflow.add_node(NodeInstance::new("vendor.mystery", "A", serde_json::json!({})));
        let snapshot = workflow.snapshot();

        let graph = SnapshotGraph::from_snapshot(&snapshot).expect("should build");
        let registry = NodeRegistry::with_builtins();
        assert_eq!(
            graph.validate(&snapshot, &registry).err(),
            Some(GraphError::UnknownNodeType {
                node_id: a,
                sub_type: "vendor.mystery".to_string()
            })
        );
    }
}
