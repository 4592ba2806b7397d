//! Workflow definitions and execution snapshots.
//!
//! A workflow is the live, editable definition: nodes, edges, and an
//! enabled flag. Executions never run against the live definition — at
//! execution start the dispatcher takes a [`WorkflowSnapshot`], and the
//! execution runs against that frozen copy for its entire lifetime, across
//! suspensions and process restarts. Edits made while executions are in
//! flight only affect executions created afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slatebase_core::WorkflowId;

use crate::edge::Edge;
use crate::error::GraphError;
use crate::graph::SnapshotGraph;
use crate::node::{NodeId, NodeInstance};
use crate::registry::NodeRegistry;

/// A workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique identifier.
    pub id: WorkflowId,
    /// Human-readable title.
    pub title: String,
    /// Node instances.
    pub nodes: Vec<NodeInstance>,
    /// Edges between node ports.
    pub edges: Vec<Edge>,
    /// Whether the workflow is published. Disabled workflows are skipped at
    /// execute time and cancel in-flight executions at resume time.
    pub enabled: bool,
    /// When this workflow was created.
    pub created_at: DateTime<Utc>,
    /// When this workflow was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new, enabled, empty workflow.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            title: title.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates a workflow with a specific ID.
    #[must_use]
    pub fn with_id(id: WorkflowId, title: impl Into<String>) -> Self {
        let mut workflow = Self::new(title);
        workflow.id = id;
        workflow
    }

    /// Adds a node, returning its ID.
    pub fn add_node(&mut self, node: NodeInstance) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        self.touch();
        id
    }

    /// Adds an edge.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
        self.touch();
    }

    /// Returns the node with the given ID, if any.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns whether the workflow is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enables the workflow.
    pub fn enable(&mut self) {
        self.enabled = true;
        self.touch();
    }

    /// Disables the workflow.
    pub fn disable(&mut self) {
        self.enabled = false;
        self.touch();
    }

    /// Bumps the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    /// Takes the immutable snapshot an execution runs against.
    #[must_use]
    pub fn snapshot(&self) -> WorkflowSnapshot {
        WorkflowSnapshot {
            workflow_id: self.id,
            title: self.title.clone(),
            nodes: self.nodes.clone(),
            edges: self.edges.clone(),
            taken_at: Utc::now(),
        }
    }

    /// Validates the workflow graph against the registry.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self, registry: &NodeRegistry) -> Result<(), GraphError> {
        self.snapshot().validate(registry)
    }
}

/// The frozen copy of a workflow's nodes and edges taken at execution
/// start. Stored verbatim as the execution row's `workflow_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSnapshot {
    /// The workflow this snapshot was taken from.
    pub workflow_id: WorkflowId,
    /// Title at snapshot time.
    pub title: String,
    /// Frozen node instances.
    pub nodes: Vec<NodeInstance>,
    /// Frozen edges.
    pub edges: Vec<Edge>,
    /// When the snapshot was taken.
    pub taken_at: DateTime<Utc>,
}

impl WorkflowSnapshot {
    /// Returns the node with the given ID, if any.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Returns true if any edge leaves the given node. A trigger with no
    /// downstream work produces nothing observable, so the dispatcher skips
    /// the execution entirely.
    #[must_use]
    pub fn has_downstream_work(&self, node_id: NodeId) -> bool {
        self.edges.iter().any(|e| e.source_node == node_id)
    }

    /// Validates the snapshot graph:
    /// - every edge endpoint names an existing node
    /// - the graph is acyclic
    /// - every node references a registered plugin type
    /// - every non-trigger node has at least one incoming edge
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found.
    pub fn validate(&self, registry: &NodeRegistry) -> Result<(), GraphError> {
        let graph = SnapshotGraph::from_snapshot(self)?;
        graph.validate(self, registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trigger(name: &str) -> NodeInstance {
        NodeInstance::new("core.manual_trigger", name, serde_json::json!({}))
    }

    fn action(name: &str) -> NodeInstance {
        NodeInstance::new(
            "core.set_values",
            name,
            serde_json::json!({"values": {}}),
        )
    }

    #[test]
    fn workflow_creation() {
        let workflow = Workflow::new("Notify on record change");
        assert_eq!(workflow.title, "Notify on record change");
        assert!(workflow.is_enabled());
        assert!(workflow.nodes.is_empty());
    }

    #[test]
    fn workflow_enable_disable() {
        let mut workflow = Workflow::new("Test");

        workflow.disable();
        assert!(!workflow.is_enabled());

        workflow.enable();
        assert!(workflow.is_enabled());
    }

    #[test]
    fn snapshot_freezes_nodes_and_edges() {
        let mut workflow = Workflow::new("Test");
        let trigger_id = workflow.add_node(trigger("Trigger"));
        let action_id = workflow.add_node(action("Action"));
        workflow.add_edge(Edge::with_default_ports(trigger_id, action_id));

        let snapshot = workflow.snapshot();

        // Edits after the snapshot do not affect it.
        workflow.add_node(action("Late addition"));
        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.edges.len(), 1);
        assert_eq!(snapshot.workflow_id, workflow.id);
    }

    #[test]
    fn downstream_work_detection() {
        let mut workflow = Workflow::new("Test");
        let trigger_id = workflow.add_node(trigger("Trigger"));
        let lonely_id = workflow.add_node(trigger("Lonely"));
        let action_id = workflow.add_node(action("Action"));
        workflow.add_edge(Edge::with_default_ports(trigger_id, action_id));

        let snapshot = workflow.snapshot();
        assert!(snapshot.has_downstream_work(trigger_id));
        assert!(!snapshot.has_downstream_work(lonely_id));
    }

    #[test]
    fn validate_accepts_well_formed_workflow() {
        let registry = NodeRegistry::with_builtins();
        let mut workflow = Workflow::new("Test");
        let trigger_id = workflow.add_node(trigger("Trigger"));
        let action_id = workflow.add_node(action("Action"));
        workflow.add_edge(Edge::with_default_ports(trigger_id, action_id));

        assert!(workflow.validate(&registry).is_ok());
    }

    #[test]
    fn validate_rejects_orphan_action() {
        let registry = NodeRegistry::with_builtins();
        let mut workflow = Workflow::new("Test");
        workflow.add_node(trigger("Trigger"));
        let orphan_id = workflow.add_node(action("Orphan"));

        let result = workflow.validate(&registry);
        assert_eq!(
            result.err(),
            Some(GraphError::MissingIncomingEdge { node_id: orphan_id })
        );
    }

    #[test]
    fn snapshot_serde_roundtrip() {
        let mut workflow = Workflow::new("Test");
        let trigger_id = workflow.add_node(trigger("Trigger"));
        let action_id = workflow.add_node(action("Action"));
        workflow.add_edge(Edge::with_default_ports(trigger_id, action_id));

        let snapshot = workflow.snapshot();
        let json = serde_json::to_string(&snapshot).expect("serialize");
        let parsed: WorkflowSnapshot = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(snapshot, parsed);
    }
}
