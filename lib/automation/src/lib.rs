//! Workflow automation engine for the slatebase platform.
//!
//! This crate provides the node-graph runtime behind slatebase automations:
//!
//! - **Plugin Contract**: the [`plugin::NodePlugin`] trait every trigger and
//!   action node implements
//! - **Node Registry**: `sub_type` key to plugin resolution
//! - **Graph Model**: workflow definitions, frozen execution snapshots, and
//!   petgraph-backed validation
//! - **Execution Engine**: dependency-ordered traversal with first-class
//!   suspend/resume via versioned frozen state
//! - **State Store**: durable execution rows with status-guarded writes
//!   (in-memory and Postgres backends)
//! - **Activation Manager**: webhook registration lifecycle for trigger
//!   nodes on publish/unpublish
//! - **Broadcast**: injected, fire-and-forget execution lifecycle events

pub mod activation;
pub mod broadcast;
pub mod definition;
pub mod edge;
pub mod engine;
pub mod error;
pub mod execution;
pub mod graph;
pub mod interpolate;
pub mod node;
pub mod nodes;
pub mod plugin;
pub mod postgres;
pub mod progress;
pub mod registry;
pub mod state;
pub mod store;

pub use activation::{ActivationManager, ActivationReport, ActivationStore, MemoryActivationStore};
pub use broadcast::{
    ExecutionAction, ExecutionEvent, ExecutionPublisher, MemoryPublisher, NatsPublisher,
    NoopPublisher,
};
pub use definition::{Workflow, WorkflowSnapshot};
pub use edge::Edge;
pub use engine::{EngineOutcome, ExecutionEngine, NodeFailure};
pub use error::{EngineError, GraphError, StateError};
pub use execution::{ExecutionStatus, WorkflowExecution};
pub use node::{NodeId, NodeInstance, NodePosition};
pub use plugin::{
    ActivationContext, ActivationState, NodeCategory, NodeDefinition, NodePlugin, NodeResult,
    NodeStatus, RunContext, ValidationOutcome,
};
pub use progress::{NoopSink, ProgressReporter, ProgressSink};
pub use registry::NodeRegistry;
pub use state::EngineState;
pub use store::{ExecutionStore, MemoryExecutionStore, StoreError};
