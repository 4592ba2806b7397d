//! Edges between node ports.
//!
//! Edges carry data from a source node's output port to a target node's
//! input port. Port names are declared by each plugin's
//! [`NodeDefinition`](crate::plugin::NodeDefinition); most structural nodes
//! use the default `"output"` / `"input"` pair.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// An edge connecting an output port to an input port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The source node ID.
    pub source_node: NodeId,
    /// The name of the output port on the source node.
    pub source_port: String,
    /// The target node ID.
    pub target_node: NodeId,
    /// The name of the input port on the target node.
    pub target_port: String,
}

impl Edge {
    /// Creates a new edge between ports.
    #[must_use]
    pub fn new(
        source_node: NodeId,
        source_port: impl Into<String>,
        target_node: NodeId,
        target_port: impl Into<String>,
    ) -> Self {
        Self {
            source_node,
            source_port: source_port.into(),
            target_node,
            target_port: target_port.into(),
        }
    }

    /// Creates an edge using the default port names (`"output"` -> `"input"`).
    #[must_use]
    pub fn with_default_ports(source_node: NodeId, target_node: NodeId) -> Self {
        Self::new(source_node, "output", target_node, "input")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_default_ports() {
        let source = NodeId::new();
        let target = NodeId::new();
        let edge = Edge::with_default_ports(source, target);

        assert_eq!(edge.source_port, "output");
        assert_eq!(edge.target_port, "input");
        assert_eq!(edge.source_node, source);
        assert_eq!(edge.target_node, target);
    }

    #[test]
    fn edge_custom_ports() {
        let edge = Edge::new(NodeId::new(), "matches", NodeId::new(), "records");
        assert_eq!(edge.source_port, "matches");
        assert_eq!(edge.target_port, "records");
    }

    #[test]
    fn edge_serde_roundtrip() {
        let edge = Edge::with_default_ports(NodeId::new(), NodeId::new());
        let json = serde_json::to_string(&edge).expect("serialize");
        let parsed: Edge = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(edge, parsed);
    }
}
