//! Frozen engine traversal state.
//!
//! This is the concrete shape behind an execution row's `execution_data`:
//! the ready queue, the populated input ports, the recorded node outputs,
//! and the pause marker. Every other component treats the encoded form as
//! an opaque blob; only the engine reads or writes it.
//!
//! The blob is versioned so resumption can be validated across engine
//! versions: decoding rejects blobs written by a version this build does
//! not understand instead of misinterpreting them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::StateError;
use crate::graph::SnapshotGraph;
use crate::node::NodeId;

/// The engine state version this build writes and reads.
pub const STATE_VERSION: u32 = 1;

/// The complete traversal state of one execution.
///
/// Freezing this struct at a suspend point and re-seeding the traversal
/// from it is all resumption is: the algorithm has no notion of "fresh
/// start" versus "resumed" beyond which seed it was given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineState {
    /// Format version; see [`STATE_VERSION`].
    pub version: u32,
    /// Nodes whose inputs are fully populated, in traversal order.
    pub ready: VecDeque<NodeId>,
    /// Populated input port values per node.
    pub input_values: HashMap<NodeId, HashMap<String, JsonValue>>,
    /// Recorded output port values per node. A suspended node's outputs are
    /// recorded here before the freeze, so resume replays no work.
    pub outputs: HashMap<NodeId, HashMap<String, JsonValue>>,
    /// Nodes that have finished (or, for the trigger, been seeded).
    pub completed: HashSet<NodeId>,
    /// The node most recently handed to a plugin. On a frozen state this is
    /// the node that requested suspension.
    pub cursor: Option<NodeId>,
    /// Pause marker; present only on a state frozen by a suspend.
    pub resume_at: Option<DateTime<Utc>>,
}

impl EngineState {
    /// Creates an empty state.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: STATE_VERSION,
            ready: VecDeque::new(),
            input_values: HashMap::new(),
            outputs: HashMap::new(),
            completed: HashSet::new(),
            cursor: None,
            resume_at: None,
        }
    }

    /// Seeds a fresh traversal: the trigger's output ports are populated
    /// from the triggering payload and its downstream nodes are enqueued.
    /// The trigger itself is marked completed — its `run` is not invoked
    /// during execution.
    #[must_use]
    pub fn seed(
        trigger_node: NodeId,
        trigger_inputs: HashMap<String, JsonValue>,
        graph: &SnapshotGraph,
    ) -> Self {
        let mut state = Self::empty();
        state.record_outputs(trigger_node, trigger_inputs, graph);
        state
    }

    /// Records a node's outputs, fans them out along matching edges to
    /// populate downstream input ports, and enqueues any downstream node
    /// whose predecessors have now all completed.
    pub fn record_outputs(
        &mut self,
        node_id: NodeId,
        outputs: HashMap<String, JsonValue>,
        graph: &SnapshotGraph,
    ) {
        for edge in graph.successors(node_id) {
            if let Some(value) = outputs.get(&edge.source_port) {
                self.input_values
                    .entry(edge.target_node)
                    .or_default()
                    .insert(edge.target_port.clone(), value.clone());
            }
        }

        self.outputs.insert(node_id, outputs);
        self.completed.insert(node_id);

        // Port population is atomic per node: successors become ready only
        // once every upstream node has completed.
        let mut newly_ready: Vec<NodeId> = graph
            .successors(node_id)
            .into_iter()
            .map(|edge| edge.target_node)
            .filter(|candidate| {
                !self.completed.contains(candidate)
                    && !self.ready.contains(candidate)
                    && graph
                        .predecessor_nodes(*candidate)
                        .iter()
                        .all(|upstream| self.completed.contains(upstream))
            })
            .collect();
        newly_ready.sort_unstable_by_key(NodeId::as_ulid);
        newly_ready.dedup();
        self.ready.extend(newly_ready);
    }

    /// Pops the next ready node.
    pub fn next_ready(&mut self) -> Option<NodeId> {
        self.ready.pop_front()
    }

    /// Returns the recorded input values for a node.
    #[must_use]
    pub fn inputs_for(&self, node_id: NodeId) -> HashMap<String, JsonValue> {
        self.input_values.get(&node_id).cloned().unwrap_or_default()
    }

    /// Marks the state as frozen at a suspend point.
    pub fn freeze(&mut self, cursor: NodeId, resume_at: DateTime<Utc>) {
        self.cursor = Some(cursor);
        self.resume_at = Some(resume_at);
    }

    /// Clears the pause marker on resume.
    pub fn thaw(&mut self) {
        self.resume_at = None;
    }

    /// Encodes the state into the opaque JSON form stored on the execution
    /// row.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self) -> Result<JsonValue, StateError> {
        serde_json::to_value(self).map_err(|e| StateError::Corrupt {
            message: e.to_string(),
        })
    }

    /// Decodes a stored blob, validating its version first.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedVersion` for blobs written by another engine
    /// version, `Corrupt` for anything undecodable.
    pub fn decode(value: &JsonValue) -> Result<Self, StateError> {
        let version = value
            .get("version")
            .and_then(JsonValue::as_u64)
            .ok_or_else(|| StateError::Corrupt {
                message: "missing version field".to_string(),
            })?;

        if version != u64::from(STATE_VERSION) {
            return Err(StateError::UnsupportedVersion {
                found: u32::try_from(version).unwrap_or(u32::MAX),
            });
        }

        serde_json::from_value(value.clone()).map_err(|e| StateError::Corrupt {
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Workflow;
    use crate::edge::Edge;
    use crate::node::NodeInstance;

    fn diamond() -> (SnapshotGraph, NodeId, NodeId, NodeId, NodeId) {
        // A -> B -\
        //  \-> C -> D
        let mut workflow = Workflow::new("Test");
        let a = workflow.add_node(NodeInstance::new(
            "core.manual_trigger",
            "A",
            serde_json::json!({}),
        ));
        let b = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "B",
            serde_json::json!({}),
        ));
        let c = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "C",
            serde_json::json!({}),
        ));
        let d = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "D",
            serde_json::json!({}),
        ));
        workflow.add_edge(Edge::with_default_ports(a, b));
        workflow.add_edge(Edge::with_default_ports(a, c));
        workflow.add_edge(Edge::new(b, "output", d, "left"));
        workflow.add_edge(Edge::new(c, "output", d, "right"));

        let snapshot = workflow.snapshot();
        let graph = SnapshotGraph::from_snapshot(&snapshot).expect("should build");
        (graph, a, b, c, d)
    }

    fn payload() -> HashMap<String, JsonValue> {
        [("output".to_string(), serde_json::json!({"record": 1}))]
            .into_iter()
            .collect()
    }

    #[test]
    fn seed_populates_downstream_inputs() {
        let (graph, a, b, c, _d) = diamond();
        let state = EngineState::seed(a, payload(), &graph);

        assert!(state.completed.contains(&a));
        assert_eq!(
            state.inputs_for(b).get("input"),
            Some(&serde_json::json!({"record": 1}))
        );
        assert_eq!(
            state.inputs_for(c).get("input"),
            Some(&serde_json::json!({"record": 1}))
        );
        assert_eq!(state.ready.len(), 2);
    }

    #[test]
    fn join_waits_for_all_predecessors() {
        let (graph, a, b, c, d) = diamond();
        let mut state = EngineState::seed(a, payload(), &graph);

        state.record_outputs(b, payload(), &graph);
        // D has inputs from B but C has not completed.
        assert!(!state.ready.contains(&d));

        state.record_outputs(c, payload(), &graph);
        assert!(state.ready.contains(&d));
        assert_eq!(state.inputs_for(d).len(), 2);
    }

    #[test]
    fn fan_out_matches_source_port() {
        let (graph, a, b, _c, _d) = diamond();
        let mut state = EngineState::empty();

        // Outputs on a port with no matching edge are recorded but not
        // propagated.
        let unmatched: HashMap<String, JsonValue> =
            [("other".to_string(), serde_json::json!(true))]
                .into_iter()
                .collect();
        state.record_outputs(a, unmatched, &graph);

        assert!(state.inputs_for(b).is_empty());
        assert!(state.outputs.contains_key(&a));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let (graph, a, _b, _c, _d) = diamond();
        let mut state = EngineState::seed(a, payload(), &graph);
        state.freeze(a, Utc::now());

        let blob = state.encode().expect("encode");
        let decoded = EngineState::decode(&blob).expect("decode");
        assert_eq!(state, decoded);
    }

    #[test]
    fn decode_rejects_unknown_version() {
        let (graph, a, _b, _c, _d) = diamond();
        let state = EngineState::seed(a, payload(), &graph);

        let mut blob = state.encode().expect("encode");
        blob["version"] = serde_json::json!(99);

        assert_eq!(
            EngineState::decode(&blob),
            Err(StateError::UnsupportedVersion { found: 99 })
        );
    }

    #[test]
    fn decode_rejects_garbage() {
        let result = EngineState::decode(&serde_json::json!({"not": "state"}));
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
    }

    #[test]
    fn freeze_and_thaw() {
        let (graph, a, _b, _c, _d) = diamond();
        let mut state = EngineState::seed(a, payload(), &graph);

        let at = Utc::now();
        state.freeze(a, at);
        assert_eq!(state.resume_at, Some(at));
        assert_eq!(state.cursor, Some(a));

        state.thaw();
        assert!(state.resume_at.is_none());
    }
}
