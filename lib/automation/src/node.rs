//! Workflow node instances.
//!
//! A node instance is one box on the workflow canvas: a reference to a
//! registered plugin type (`sub_type`) plus the user-authored configuration
//! for that plugin. The behavior behind a `sub_type` lives in the
//! [`NodePlugin`](crate::plugin::NodePlugin) resolved through the registry;
//! the instance itself carries no logic.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use ulid::Ulid;

/// A unique identifier for a node within a workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Ulid);

impl NodeId {
    /// Creates a new random node ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    /// Creates a node ID from a ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node_{}", self.0)
    }
}

impl FromStr for NodeId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ulid_str = s.strip_prefix("node_").unwrap_or(s);
        Ulid::from_str(ulid_str).map(Self)
    }
}

/// Canvas position of a node. Carried through snapshots for the editor,
/// irrelevant to execution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NodePosition {
    pub x: f64,
    pub y: f64,
}

/// A node instance within a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Unique identifier for this node within the workflow.
    pub id: NodeId,
    /// Registry key of the plugin implementing this node
    /// (e.g. `"core.delay"`, `"github.trigger"`).
    pub sub_type: String,
    /// Human-readable name shown on the canvas.
    pub name: String,
    /// Plugin-specific configuration, validated by the plugin.
    pub config: JsonValue,
    /// Canvas position.
    pub position: NodePosition,
}

impl NodeInstance {
    /// Creates a new node instance with a random ID.
    #[must_use]
    pub fn new(sub_type: impl Into<String>, name: impl Into<String>, config: JsonValue) -> Self {
        Self {
            id: NodeId::new(),
            sub_type: sub_type.into(),
            name: name.into(),
            config,
            position: NodePosition::default(),
        }
    }

    /// Creates a node instance with a specific ID.
    #[must_use]
    pub fn with_id(
        id: NodeId,
        sub_type: impl Into<String>,
        name: impl Into<String>,
        config: JsonValue,
    ) -> Self {
        Self {
            id,
            sub_type: sub_type.into(),
            name: name.into(),
            config,
            position: NodePosition::default(),
        }
    }

    /// Sets the canvas position.
    #[must_use]
    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = NodePosition { x, y };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        let id = NodeId::new();
        let display = id.to_string();
        assert!(display.starts_with("node_"));
    }

    #[test]
    fn node_id_parse_roundtrip() {
        let id = NodeId::new();
        let parsed: NodeId = id.to_string().parse().expect("should parse");
        assert_eq!(id, parsed);
    }

    #[test]
    fn node_instance_creation() {
        let node = NodeInstance::new(
            "core.delay",
            "Wait 5s",
            serde_json::json!({"duration_ms": 5000}),
        )
        .at(120.0, 40.0);

        assert_eq!(node.sub_type, "core.delay");
        assert_eq!(node.name, "Wait 5s");
        assert_eq!(node.position.x, 120.0);
    }

    #[test]
    fn node_instance_serde_roundtrip() {
        let node = NodeInstance::new("core.set_values", "Set", serde_json::json!({"values": {}}));
        let json = serde_json::to_string(&node).expect("serialize");
        let parsed: NodeInstance = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(node, parsed);
    }
}
