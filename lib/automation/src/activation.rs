//! Trigger activation lifecycle.
//!
//! Publishing a workflow registers external listeners (webhooks) for every
//! trigger node that declares an activation type; unpublishing tears them
//! down. The manager calls each plugin's hook pair and owns the persisted
//! [`ActivationState`] keyed by `(workflow, node)`.
//!
//! Activation is deliberately not transactional across nodes: when node 2
//! of 3 fails to register, nodes 1 and 3 stay in whatever state their own
//! hooks reached, the failure lands in the report, and the caller
//! reconciles at the workflow level.

use async_trait::async_trait;
use slatebase_core::WorkflowId;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::definition::Workflow;
use crate::node::{NodeId, NodeInstance};
use crate::plugin::{ActivationContext, ActivationState, NodeCategory, PluginError};
use crate::registry::NodeRegistry;
use crate::store::StoreError;

/// Errors from activation operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActivationError {
    /// The node references an unregistered plugin type.
    UnknownNodeType { sub_type: String },
    /// The node's configuration failed plugin validation.
    InvalidConfig { message: String },
    /// The plugin hook failed.
    Hook(PluginError),
    /// The activation state store failed.
    Store(StoreError),
}

impl fmt::Display for ActivationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNodeType { sub_type } => {
                write!(f, "unknown node type: {sub_type}")
            }
            Self::InvalidConfig { message } => write!(f, "invalid config: {message}"),
            Self::Hook(e) => write!(f, "hook failed: {e}"),
            Self::Store(e) => write!(f, "activation store failed: {e}"),
        }
    }
}

impl std::error::Error for ActivationError {}

impl From<StoreError> for ActivationError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Persistence for per-node activation state.
#[async_trait]
pub trait ActivationStore: Send + Sync {
    /// Stores (or replaces) the state for a node.
    async fn put(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        state: ActivationState,
    ) -> Result<(), StoreError>;

    /// Returns the stored state for a node, if any.
    async fn get(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError>;

    /// Removes and returns the stored state for a node.
    async fn remove(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError>;

    /// Lists stored states for a workflow.
    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<(NodeId, ActivationState)>, StoreError>;
}

/// In-memory activation store.
#[derive(Default)]
pub struct MemoryActivationStore {
    states: Mutex<HashMap<(WorkflowId, NodeId), ActivationState>>,
}

impl MemoryActivationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(
        &self,
    ) -> std::sync::MutexGuard<'_, HashMap<(WorkflowId, NodeId), ActivationState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ActivationStore for MemoryActivationStore {
    async fn put(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        state: ActivationState,
    ) -> Result<(), StoreError> {
        self.lock().insert((workflow_id, node_id), state);
        Ok(())
    }

    async fn get(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError> {
        Ok(self.lock().get(&(workflow_id, node_id)).cloned())
    }

    async fn remove(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError> {
        Ok(self.lock().remove(&(workflow_id, node_id)))
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<(NodeId, ActivationState)>, StoreError> {
        Ok(self
            .lock()
            .iter()
            .filter(|((wf, _), _)| *wf == workflow_id)
            .map(|((_, node), state)| (*node, state.clone()))
            .collect())
    }
}

/// Per-node result carried in an [`ActivationReport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationFault {
    /// The trigger node whose hook failed.
    pub node_id: NodeId,
    /// What went wrong.
    pub error: ActivationError,
}

/// Outcome of one publish or unpublish pass over a workflow's triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Nodes whose hooks ran and whose state was persisted/removed.
    pub succeeded: Vec<NodeId>,
    /// Nodes skipped because there was nothing to do (no activation type,
    /// or no stored state on deactivation).
    pub skipped: Vec<NodeId>,
    /// Nodes whose hooks or persistence failed.
    pub failures: Vec<ActivationFault>,
}

impl ActivationReport {
    /// Returns true if any node failed.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Manages trigger activation on workflow publish/unpublish.
pub struct ActivationManager {
    registry: Arc<NodeRegistry>,
    store: Arc<dyn ActivationStore>,
}

impl ActivationManager {
    /// Creates a manager.
    #[must_use]
    pub fn new(registry: Arc<NodeRegistry>, store: Arc<dyn ActivationStore>) -> Self {
        Self { registry, store }
    }

    /// Returns the workflow's trigger nodes that declare an activation
    /// type, with nodes of unknown type reported as faults.
    fn activatable_nodes<'a>(
        &self,
        workflow: &'a Workflow,
        report: &mut ActivationReport,
    ) -> Vec<&'a NodeInstance> {
        let mut nodes = Vec::new();
        for node in &workflow.nodes {
            match self.registry.resolve_node(node) {
                Ok(plugin) => {
                    let definition = plugin.definition();
                    if definition.category == NodeCategory::Trigger {
                        if definition.activation.is_some() {
                            nodes.push(node);
                        } else {
                            report.skipped.push(node.id);
                        }
                    }
                }
                Err(_) => report.failures.push(ActivationFault {
                    node_id: node.id,
                    error: ActivationError::UnknownNodeType {
                        sub_type: node.sub_type.clone(),
                    },
                }),
            }
        }
        nodes
    }

    /// Activates every trigger node of a published workflow.
    ///
    /// Each node's hook runs exactly once per publish transition; the
    /// returned state is persisted keyed by node ID. The hook runs before
    /// the persist, so hooks must tolerate a retry after a crash between
    /// the two.
    pub async fn activate(&self, workflow: &Workflow) -> ActivationReport {
        let mut report = ActivationReport::default();

        for node in self.activatable_nodes(workflow, &mut report) {
            // Plugin resolution succeeded in activatable_nodes.
            let Ok(plugin) = self.registry.resolve_node(node) else {
                continue;
            };

            let outcome = plugin.validate(&node.config);
            if !outcome.valid {
                let message = outcome
                    .issues
                    .first()
                    .map(|issue| format!("{}: {}", issue.path, issue.message))
                    .unwrap_or_else(|| "invalid configuration".to_string());
                report.failures.push(ActivationFault {
                    node_id: node.id,
                    error: ActivationError::InvalidConfig { message },
                });
                continue;
            }

            let ctx = ActivationContext {
                workflow_id: workflow.id,
                node_id: node.id,
                config: node.config.clone(),
            };

            match plugin.on_activate(&ctx).await {
                Ok(state) => match self.store.put(workflow.id, node.id, state).await {
                    Ok(()) => {
                        tracing::info!(
                            workflow_id = %workflow.id,
                            node_id = %node.id,
                            "trigger activated"
                        );
                        report.succeeded.push(node.id);
                    }
                    Err(e) => report.failures.push(ActivationFault {
                        node_id: node.id,
                        error: e.into(),
                    }),
                },
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        node_id = %node.id,
                        error = %e,
                        "trigger activation failed"
                    );
                    report.failures.push(ActivationFault {
                        node_id: node.id,
                        error: ActivationError::Hook(e),
                    });
                }
            }
        }

        report
    }

    /// Deactivates every trigger node of an unpublished workflow.
    ///
    /// A node with no stored state is a no-op — state is never re-created
    /// speculatively just to tear it down. Stored state is removed only
    /// after its hook succeeds, so a failed teardown can be retried.
    pub async fn deactivate(&self, workflow: &Workflow) -> ActivationReport {
        let mut report = ActivationReport::default();

        for node in self.activatable_nodes(workflow, &mut report) {
            let Ok(plugin) = self.registry.resolve_node(node) else {
                continue;
            };

            let stored = match self.store.get(workflow.id, node.id).await {
                Ok(stored) => stored,
                Err(e) => {
                    report.failures.push(ActivationFault {
                        node_id: node.id,
                        error: e.into(),
                    });
                    continue;
                }
            };

            let Some(state) = stored else {
                report.skipped.push(node.id);
                continue;
            };

            let ctx = ActivationContext {
                workflow_id: workflow.id,
                node_id: node.id,
                config: node.config.clone(),
            };

            match plugin.on_deactivate(&ctx, state).await {
                Ok(()) => match self.store.remove(workflow.id, node.id).await {
                    Ok(_) => {
                        tracing::info!(
                            workflow_id = %workflow.id,
                            node_id = %node.id,
                            "trigger deactivated"
                        );
                        report.succeeded.push(node.id);
                    }
                    Err(e) => report.failures.push(ActivationFault {
                        node_id: node.id,
                        error: e.into(),
                    }),
                },
                Err(e) => {
                    tracing::warn!(
                        workflow_id = %workflow.id,
                        node_id = %node.id,
                        error = %e,
                        "trigger deactivation failed"
                    );
                    report.failures.push(ActivationFault {
                        node_id: node.id,
                        error: ActivationError::Hook(e),
                    });
                }
            }
        }

        report
    }
}
