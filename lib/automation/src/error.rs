//! Error types for the automation crate.
//!
//! Each layer exposes only the information available to it; callers add
//! context with rootcause's `.context()` where they need it:
//! - `GraphError`: structural problems in a workflow snapshot
//! - `StateError`: undecodable or unsupported engine state
//! - `EngineError`: traversal-level failures

use crate::node::NodeId;
use crate::registry::RegistryError;
use std::fmt;

/// Structural problems in a workflow snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// An edge references a node that is not part of the snapshot.
    EdgeEndpointMissing { node_id: NodeId },
    /// A non-trigger node has no incoming edge.
    MissingIncomingEdge { node_id: NodeId },
    /// The graph contains a cycle.
    CycleDetected,
    /// A node references an unregistered plugin type.
    UnknownNodeType { node_id: NodeId, sub_type: String },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EdgeEndpointMissing { node_id } => {
                write!(f, "edge references missing node: {node_id}")
            }
            Self::MissingIncomingEdge { node_id } => {
                write!(f, "non-trigger node {node_id} has no incoming edge")
            }
            Self::CycleDetected => write!(f, "workflow graph contains a cycle"),
            Self::UnknownNodeType { node_id, sub_type } => {
                write!(f, "node {node_id} references unknown type '{sub_type}'")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// Problems decoding persisted engine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// The blob is missing, not JSON, or structurally wrong.
    Corrupt { message: String },
    /// The blob was written by an engine version this build does not read.
    UnsupportedVersion { found: u32 },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Corrupt { message } => write!(f, "corrupt engine state: {message}"),
            Self::UnsupportedVersion { found } => {
                write!(f, "unsupported engine state version: {found}")
            }
        }
    }
}

impl std::error::Error for StateError {}

/// Failures during graph traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The requested trigger node is not part of the snapshot.
    TriggerNotFound { node_id: NodeId },
    /// The requested trigger node is not a trigger type.
    NotATrigger { node_id: NodeId },
    /// The traversal state references a node missing from the snapshot.
    UnknownNode { node_id: NodeId },
    /// Plugin resolution failed.
    Registry(RegistryError),
    /// The snapshot is structurally invalid.
    Graph(GraphError),
    /// Persisted state could not be decoded.
    State(StateError),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TriggerNotFound { node_id } => {
                write!(f, "trigger node not found: {node_id}")
            }
            Self::NotATrigger { node_id } => {
                write!(f, "node {node_id} is not a trigger")
            }
            Self::UnknownNode { node_id } => {
                write!(f, "state references unknown node: {node_id}")
            }
            Self::Registry(e) => write!(f, "registry error: {e}"),
            Self::Graph(e) => write!(f, "graph error: {e}"),
            Self::State(e) => write!(f, "state error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<RegistryError> for EngineError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl From<GraphError> for EngineError {
    fn from(e: GraphError) -> Self {
        Self::Graph(e)
    }
}

impl From<StateError> for EngineError {
    fn from(e: StateError) -> Self {
        Self::State(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_error_display() {
        let node_id = NodeId::new();
        let err = GraphError::MissingIncomingEdge { node_id };
        assert!(err.to_string().contains("no incoming edge"));
    }

    #[test]
    fn state_error_display() {
        let err = StateError::UnsupportedVersion { found: 9 };
        assert!(err.to_string().contains("version: 9"));
    }

    #[test]
    fn engine_error_wraps_registry() {
        let err: EngineError = RegistryError::UnknownNodeType {
            sub_type: "x".to_string(),
        }
        .into();
        assert!(err.to_string().contains("unknown node type"));
    }
}
