//! Graph execution engine.
//!
//! Walks a frozen workflow snapshot in dependency order, invoking node
//! plugins and threading port values between them. The traversal is driven
//! entirely by [`EngineState`]: a fresh execution seeds the state from the
//! triggering payload, a resumed execution seeds it from the frozen blob,
//! and the loop below cannot tell the difference. That symmetry is what
//! makes crash recovery safe — a resume after a crash mid-suspend replays
//! no work, because the suspended node already returned and its outputs are
//! already recorded in the frozen state.
//!
//! Per execution, node invocations are sequential; concurrency lives at the
//! worker-pool level where independent executions run side by side.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

use crate::definition::WorkflowSnapshot;
use crate::error::EngineError;
use crate::graph::SnapshotGraph;
use crate::interpolate::interpolate;
use crate::node::NodeId;
use crate::plugin::{NodeCategory, NodeStatus, RunContext};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::registry::NodeRegistry;
use crate::state::EngineState;
use std::collections::HashMap;

use serde_json::Value as JsonValue;

/// A node-level failure, recorded on the execution row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    /// The node whose invocation failed.
    pub node_id: NodeId,
    /// The failure message from [`NodeResult::error`](crate::plugin::NodeResult).
    pub message: String,
}

impl std::fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {} failed: {}", self.node_id, self.message)
    }
}

/// The result of one engine entry — a full run to completion, a halt on a
/// node error, or a freeze at a suspend point.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    /// Every reachable node finished.
    Completed {
        /// Final traversal state with all recorded outputs.
        state: EngineState,
    },
    /// A node returned `error`; no further nodes ran.
    Failed {
        /// Traversal state at the halt, partial outputs preserved for
        /// diagnostics.
        state: EngineState,
        /// The failing node and message.
        failure: NodeFailure,
    },
    /// A node returned `waiting`; the traversal state is frozen.
    Suspended {
        /// The frozen state to persist as `execution_data`.
        state: EngineState,
        /// When the execution should be resumed.
        resume_at: DateTime<Utc>,
    },
}

/// The graph execution engine. Stateless between entries; everything an
/// execution accumulates lives in its [`EngineState`].
pub struct ExecutionEngine {
    registry: Arc<NodeRegistry>,
}

impl ExecutionEngine {
    /// Creates an engine resolving plugins through the given registry.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the plugin registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    /// Seeds a fresh traversal from a triggering payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the trigger node is missing from the snapshot,
    /// is not a trigger type, or the snapshot graph is malformed.
    pub fn seed(
        &self,
        snapshot: &WorkflowSnapshot,
        trigger_node: NodeId,
        trigger_inputs: HashMap<String, JsonValue>,
    ) -> Result<EngineState, EngineError> {
        let node = snapshot
            .node(trigger_node)
            .ok_or(EngineError::TriggerNotFound {
                node_id: trigger_node,
            })?;

        let plugin = self.registry.resolve_node(node)?;
        if plugin.definition().category != NodeCategory::Trigger {
            return Err(EngineError::NotATrigger {
                node_id: trigger_node,
            });
        }

        let graph = SnapshotGraph::from_snapshot(snapshot)?;
        Ok(EngineState::seed(trigger_node, trigger_inputs, &graph))
    }

    /// Runs the traversal until completion, a node error, or a suspend.
    ///
    /// The same entry point serves fresh and resumed executions; only the
    /// seed differs. Progress is reported through `progress` after every
    /// node; the caller owns throttling and the guaranteed terminal write.
    ///
    /// # Errors
    ///
    /// Returns an error for structural problems (unknown node, unregistered
    /// plugin type, malformed snapshot). Node-level failures do not error —
    /// they produce [`EngineOutcome::Failed`].
    pub async fn run<S: ProgressSink>(
        &self,
        snapshot: &WorkflowSnapshot,
        mut state: EngineState,
        progress: &ProgressReporter<S>,
    ) -> Result<EngineOutcome, EngineError> {
        let graph = SnapshotGraph::from_snapshot(snapshot)?;
        state.thaw();

        while let Some(node_id) = state.next_ready() {
            let node = snapshot
                .node(node_id)
                .ok_or(EngineError::UnknownNode { node_id })?;
            let plugin = self.registry.resolve_node(node)?;

            let config = interpolate(&node.config, &state.outputs);
            let inputs = state.inputs_for(node_id);
            let ctx = RunContext::new(inputs, config);
            let logger = ctx.logger.clone();

            state.cursor = Some(node_id);
            tracing::debug!(%node_id, sub_type = %node.sub_type, "running node");

            let started = Instant::now();
            let mut result = plugin.run(ctx).await;
            result.metrics.execution_time_ms =
                u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
            result.logs.extend(logger.drain());

            match result.status {
                NodeStatus::Success => {
                    state.record_outputs(node_id, result.outputs, &graph);
                    progress.update(&state).await;
                }
                NodeStatus::Error => {
                    let message = result
                        .error
                        .unwrap_or_else(|| "node failed without message".to_string());
                    tracing::warn!(%node_id, %message, "node failed, halting execution");
                    return Ok(EngineOutcome::Failed {
                        state,
                        failure: NodeFailure { node_id, message },
                    });
                }
                NodeStatus::Waiting => {
                    let Some(resume_at) = result.resume_at else {
                        // Waiting without a resume time can never be woken.
                        return Ok(EngineOutcome::Failed {
                            state,
                            failure: NodeFailure {
                                node_id,
                                message: "waiting result without resume_at".to_string(),
                            },
                        });
                    };

                    // The node has returned; record and fan out its outputs
                    // before the freeze so resume continues downstream.
                    state.record_outputs(node_id, result.outputs, &graph);
                    state.freeze(node_id, resume_at);
                    tracing::debug!(%node_id, %resume_at, "execution suspended");
                    return Ok(EngineOutcome::Suspended { state, resume_at });
                }
            }
        }

        Ok(EngineOutcome::Completed { state })
    }
}
