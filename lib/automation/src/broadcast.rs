//! Execution lifecycle broadcasting.
//!
//! Subscribers (UI sessions, observability consumers) follow executions by
//! workflow scope. The publisher is injected wherever events originate —
//! there is no global broadcaster — and delivery is strictly best-effort:
//! emitters never block on, retry, or propagate a failed broadcast.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use slatebase_core::{ExecutionId, WorkflowId};
use std::sync::Mutex;

use crate::execution::WorkflowExecution;

/// Event name carried on every execution broadcast.
pub const EXECUTION_EVENT: &str = "workflow.execution";

/// What happened to the execution row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAction {
    /// The row was created.
    Create,
    /// The row was updated (progress, suspend, resume, terminal).
    Update,
    /// The row was deleted.
    Delete,
}

/// The inner payload of an execution broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEventPayload {
    /// The execution row ID.
    pub id: ExecutionId,
    /// The workflow the execution belongs to.
    pub workflow_id: WorkflowId,
    /// What happened.
    pub action: ExecutionAction,
    /// The execution row as JSON.
    pub payload: JsonValue,
}

/// A broadcast event scoped by workflow ID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEvent {
    /// Always [`EXECUTION_EVENT`].
    pub event: String,
    /// The event payload.
    pub payload: ExecutionEventPayload,
    /// Subscription scopes; currently the owning workflow ID.
    pub scopes: Vec<String>,
}

impl ExecutionEvent {
    /// Builds an event from an execution row.
    #[must_use]
    pub fn for_execution(action: ExecutionAction, execution: &WorkflowExecution) -> Self {
        let row = serde_json::to_value(execution).unwrap_or(JsonValue::Null);
        Self {
            event: EXECUTION_EVENT.to_string(),
            payload: ExecutionEventPayload {
                id: execution.id,
                workflow_id: execution.workflow_id,
                action,
                payload: row,
            },
            scopes: vec![execution.workflow_id.to_string()],
        }
    }
}

/// Fire-and-forget publisher for execution events.
///
/// Implementations swallow their own failures (logging them at `warn`);
/// the signature is infallible so emitters cannot accidentally couple
/// execution progress to broadcast delivery.
#[async_trait]
pub trait ExecutionPublisher: Send + Sync {
    /// Publishes an event. Best-effort.
    async fn publish(&self, event: ExecutionEvent);
}

/// A publisher that discards everything. The default in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl ExecutionPublisher for NoopPublisher {
    async fn publish(&self, _event: ExecutionEvent) {}
}

/// A publisher that records events in memory, for tests and local
/// inspection.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl MemoryPublisher {
    /// Creates an empty publisher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<ExecutionEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns recorded events for one execution.
    #[must_use]
    pub fn events_for(&self, id: ExecutionId) -> Vec<ExecutionEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.payload.id == id)
            .collect()
    }
}

#[async_trait]
impl ExecutionPublisher for MemoryPublisher {
    async fn publish(&self, event: ExecutionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// NATS-backed publisher. Events go to
/// `automation.execution.<workflow_id>`, one subject per scope so
/// subscribers can filter server-side.
pub struct NatsPublisher {
    client: async_nats::Client,
    subject_prefix: String,
}

impl NatsPublisher {
    /// Default subject prefix.
    pub const DEFAULT_SUBJECT_PREFIX: &'static str = "automation.execution";

    /// Wraps an existing NATS client.
    #[must_use]
    pub fn new(client: async_nats::Client) -> Self {
        Self {
            client,
            subject_prefix: Self::DEFAULT_SUBJECT_PREFIX.to_string(),
        }
    }

    /// Overrides the subject prefix.
    #[must_use]
    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    fn subject_for(&self, workflow_id: WorkflowId) -> String {
        format!("{}.{workflow_id}", self.subject_prefix)
    }
}

#[async_trait]
impl ExecutionPublisher for NatsPublisher {
    async fn publish(&self, event: ExecutionEvent) {
        let subject = self.subject_for(event.payload.workflow_id);
        let bytes = match serde_json::to_vec(&event) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize execution event");
                return;
            }
        };

        if let Err(e) = self.client.publish(subject, bytes.into()).await {
            tracing::warn!(
                error = %e,
                execution_id = %event.payload.id,
                "failed to publish execution event"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Workflow;

    fn execution() -> WorkflowExecution {
        let workflow = Workflow::new("Test");
        WorkflowExecution::new(workflow.id, workflow.snapshot())
    }

    #[test]
    fn event_carries_row_and_scope() {
        let execution = execution();
        let event = ExecutionEvent::for_execution(ExecutionAction::Create, &execution);

        assert_eq!(event.event, EXECUTION_EVENT);
        assert_eq!(event.payload.id, execution.id);
        assert_eq!(event.payload.action, ExecutionAction::Create);
        assert_eq!(event.scopes, vec![execution.workflow_id.to_string()]);
        assert_eq!(
            event.payload.payload.get("status"),
            Some(&serde_json::json!("running"))
        );
    }

    #[tokio::test]
    async fn memory_publisher_records_per_execution() {
        let publisher = MemoryPublisher::new();
        let first = execution();
        let second = execution();

        publisher
            .publish(ExecutionEvent::for_execution(
                ExecutionAction::Create,
                &first,
            ))
            .await;
        publisher
            .publish(ExecutionEvent::for_execution(
                ExecutionAction::Update,
                &first,
            ))
            .await;
        publisher
            .publish(ExecutionEvent::for_execution(
                ExecutionAction::Create,
                &second,
            ))
            .await;

        assert_eq!(publisher.events().len(), 3);
        assert_eq!(publisher.events_for(first.id).len(), 2);
        assert_eq!(publisher.events_for(second.id).len(), 1);
    }

    #[test]
    fn event_serde_roundtrip() {
        let event = ExecutionEvent::for_execution(ExecutionAction::Delete, &execution());
        let json = serde_json::to_string(&event).expect("serialize");
        let parsed: ExecutionEvent = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, parsed);
    }
}
