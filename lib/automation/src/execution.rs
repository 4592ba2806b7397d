//! Durable execution records.
//!
//! One row per workflow run. The row is the single resource that the
//! engine, scheduler, and broadcaster all touch; `status` is the
//! authoritative guard for every transition (see
//! [`ExecutionStore::update_if_status`](crate::store::ExecutionStore)).
//! `execution_data` is owned exclusively by the engine; everything else
//! treats it as an opaque blob.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use slatebase_core::{ExecutionId, WorkflowId};

use crate::definition::WorkflowSnapshot;

/// Status of a workflow execution.
///
/// There is no `skipped` value: a would-be execution aborted before it is
/// observable (disabled workflow, nothing downstream) never creates a row
/// at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Actively executing.
    Running,
    /// Suspended until `resume_at`.
    Waiting,
    /// Finished successfully.
    Success,
    /// Finished with a node or engine failure.
    Error,
    /// Terminated because its workflow was disabled or removed.
    Cancelled,
}

impl ExecutionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Error | Self::Cancelled)
    }

    /// Stable text form used in the database and broadcast payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Waiting => "waiting",
            Self::Success => "success",
            Self::Error => "error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses the stable text form.
    #[must_use]
    pub fn from_str_value(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "waiting" => Some(Self::Waiting),
            "success" => Some(Self::Success),
            "error" => Some(Self::Error),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A single durable workflow execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    /// Unique identifier, immutable once created.
    pub id: ExecutionId,
    /// The workflow this execution belongs to.
    pub workflow_id: WorkflowId,
    /// Frozen snapshot of nodes/edges taken at start.
    pub workflow_data: WorkflowSnapshot,
    /// Opaque engine state; present while `Waiting` and kept on terminal
    /// rows for diagnostics.
    pub execution_data: Option<JsonValue>,
    /// Current status.
    pub status: ExecutionStatus,
    /// Failure message for `Error` rows.
    pub error: Option<String>,
    /// When the execution started.
    pub started_at: DateTime<Utc>,
    /// When the execution reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
    /// When a `Waiting` execution should be resumed.
    pub resume_at: Option<DateTime<Utc>>,
    /// Set exactly when the status is terminal.
    pub finished: bool,
}

impl WorkflowExecution {
    /// Creates a new running execution against the given snapshot.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, workflow_data: WorkflowSnapshot) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            workflow_data,
            execution_data: None,
            status: ExecutionStatus::Running,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
            resume_at: None,
            finished: false,
        }
    }

    /// Records an intermediate traversal snapshot without changing status.
    pub fn record_progress(&mut self, execution_data: JsonValue) {
        self.execution_data = Some(execution_data);
    }

    /// Suspends the execution until `resume_at`.
    pub fn suspend(&mut self, execution_data: JsonValue, resume_at: DateTime<Utc>) {
        self.status = ExecutionStatus::Waiting;
        self.execution_data = Some(execution_data);
        self.resume_at = Some(resume_at);
        self.finished = false;
    }

    /// Returns a `Waiting` execution to `Running` for a resume attempt.
    pub fn resume(&mut self) {
        self.status = ExecutionStatus::Running;
        self.resume_at = None;
    }

    /// Marks the execution successful.
    pub fn succeed(&mut self, execution_data: JsonValue) {
        self.execution_data = Some(execution_data);
        self.finish(ExecutionStatus::Success);
    }

    /// Marks the execution failed.
    pub fn fail(&mut self, execution_data: Option<JsonValue>, error: impl Into<String>) {
        if let Some(data) = execution_data {
            self.execution_data = Some(data);
        }
        self.error = Some(error.into());
        self.finish(ExecutionStatus::Error);
    }

    /// Marks the execution cancelled.
    pub fn cancel(&mut self) {
        self.finish(ExecutionStatus::Cancelled);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.finished = true;
        self.finished_at = Some(Utc::now());
        self.resume_at = None;
    }

    /// Returns the duration of the execution so far, or total if finished.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        end - self.started_at
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
    fn status_terminality() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Waiting.is_terminal());
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Error.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
    }

    #[test]
    fn status_str_roundtrip() {
        for status in [
            ExecutionStatus::Running,
            ExecutionStatus::Waiting,
            ExecutionStatus::Success,
            ExecutionStatus::Error,
            ExecutionStatus::Cancelled,
        ] {
            assert_eq!(
                ExecutionStatus::from_str_value(status.as_str()),
                Some(status)
            );
        }
        assert_eq!(ExecutionStatus::from_str_value("skipped"), None);
    }

    #[test]
    fn new_execution_is_running() {
        let execution = execution();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(!execution.finished);
        assert!(execution.finished_at.is_none());
        assert!(execution.resume_at.is_none());
    }

    #[test]
    fn suspend_sets_waiting_and_resume_at() {
        let mut execution = execution();
        let resume_at = Utc::now() + chrono::Duration::seconds(5);

        execution.suspend(serde_json::json!({"version": 1}), resume_at);

        assert_eq!(execution.status, ExecutionStatus::Waiting);
        assert_eq!(execution.resume_at, Some(resume_at));
        assert!(!execution.finished);
        assert!(execution.execution_data.is_some());
    }

    #[test]
    fn terminal_write_clears_resume_at() {
        let mut execution = execution();
        execution.suspend(
            serde_json::json!({"version": 1}),
            Utc::now() + chrono::Duration::seconds(5),
        );

        execution.resume();
        assert_eq!(execution.status, ExecutionStatus::Running);
        assert!(execution.resume_at.is_none());

        execution.succeed(serde_json::json!({"version": 1}));
        assert_eq!(execution.status, ExecutionStatus::Success);
        assert!(execution.finished);
        assert!(execution.finished_at.is_some());
        assert!(execution.resume_at.is_none());
    }

    #[test]
    fn fail_records_error() {
        let mut execution = execution();
        execution.fail(None, "node exploded");

        assert_eq!(execution.status, ExecutionStatus::Error);
        assert_eq!(execution.error.as_deref(), Some("node exploded"));
        assert!(execution.finished);
    }

    #[test]
    fn execution_serde_roundtrip() {
        let mut execution = execution();
        execution.suspend(
            serde_json::json!({"version": 1}),
            Utc::now() + chrono::Duration::seconds(5),
        );

        let json = serde_json::to_string(&execution).expect("serialize");
        let parsed: WorkflowExecution = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(execution, parsed);
    }
}
