//! Job payloads.
//!
//! The queue carries exactly two job kinds: `Execute` starts a fresh
//! execution from a trigger, `Resume` re-enters a suspended one. Execute
//! jobs are enqueued synchronously by webhook receipt or manual invocation;
//! Resume jobs are enqueued with a delay when a suspend is recorded.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use slatebase_core::{ExecutionId, JobId, WorkflowId};
use slatebase_automation::NodeId;
use std::collections::HashMap;

/// Where a job originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    /// A webhook receipt.
    Webhook,
    /// A user-initiated manual run.
    #[default]
    Manual,
    /// The scheduler itself (resume jobs).
    Scheduler,
}

/// Caller context carried with every job.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobContext {
    /// Where the job came from.
    #[serde(default)]
    pub source: JobSource,
    /// Who asked for it, when known.
    #[serde(default)]
    pub requested_by: Option<String>,
}

impl JobContext {
    /// Context for a webhook-originated job.
    #[must_use]
    pub fn webhook() -> Self {
        Self {
            source: JobSource::Webhook,
            requested_by: None,
        }
    }

    /// Context for a scheduler-originated job.
    #[must_use]
    pub fn scheduler() -> Self {
        Self {
            source: JobSource::Scheduler,
            requested_by: None,
        }
    }
}

/// Starts a fresh execution of a workflow from one of its triggers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecuteWorkflowJob {
    /// Caller context.
    pub context: JobContext,
    /// The workflow to execute.
    pub workflow_id: WorkflowId,
    /// The trigger node that fired.
    pub trigger_node_id: NodeId,
    /// The triggering payload, keyed by the trigger's output ports.
    pub trigger_inputs: HashMap<String, JsonValue>,
}

/// Re-enters a suspended execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeWorkflowJob {
    /// Caller context.
    pub context: JobContext,
    /// The execution to resume.
    pub execution_id: ExecutionId,
}

/// The two job kinds the queue carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// Start a fresh execution.
    Execute(ExecuteWorkflowJob),
    /// Resume a suspended execution.
    Resume(ResumeWorkflowJob),
}

/// A job as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Queue-assigned job ID.
    pub id: JobId,
    /// The payload.
    pub job: Job,
    /// Delivery attempt, starting at 1.
    pub attempt: u32,
}

impl QueuedJob {
    /// Wraps a job for first delivery.
    #[must_use]
    pub fn first_delivery(job: Job) -> Self {
        Self {
            id: JobId::new(),
            job,
            attempt: 1,
        }
    }

    /// The same job on its next delivery attempt.
    #[must_use]
    pub fn redelivered(mut self) -> Self {
        self.attempt += 1;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_serde_roundtrip() {
        let job = Job::Execute(ExecuteWorkflowJob {
            context: JobContext::webhook(),
            workflow_id: WorkflowId::new(),
            trigger_node_id: NodeId::new(),
            trigger_inputs: [("output".to_string(), serde_json::json!({"id": 1}))]
                .into_iter()
                .collect(),
        });

        let json = serde_json::to_string(&job).expect("serialize");
        assert!(json.contains("\"kind\":\"execute\""));
        let parsed: Job = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(job, parsed);
    }

    #[test]
    fn resume_job_tags_kind() {
        let job = Job::Resume(ResumeWorkflowJob {
            context: JobContext::scheduler(),
            execution_id: ExecutionId::new(),
        });

        let json = serde_json::to_value(&job).expect("serialize");
        assert_eq!(json["kind"], "resume");
    }

    #[test]
    fn redelivery_bumps_attempt() {
        let queued = QueuedJob::first_delivery(Job::Resume(ResumeWorkflowJob {
            context: JobContext::default(),
            execution_id: ExecutionId::new(),
        }));
        assert_eq!(queued.attempt, 1);

        let redelivered = queued.redelivered();
        assert_eq!(redelivered.attempt, 2);
    }
}
