//! Job dispatch.
//!
//! The dispatcher is the glue between the queue and the engine. For an
//! `Execute` job it snapshots the workflow, creates the execution row, and
//! runs the engine; for a `Resume` job it re-reads the row, guards the
//! status, and re-enters the engine with the frozen state. Either way the
//! run settles the same way: a terminal write, or a suspend write plus a
//! delayed `Resume` job.
//!
//! Failure classification (see the crate error module): anything the queue
//! can fix by retrying is returned as `Err`; everything else — workflow
//! missing, workflow disabled, corrupt state — is recorded on the row (or
//! skipped before a row exists) and returned as `Ok`, so observers are
//! never left watching a stale `running` row while the queue retries in
//! the background.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use slatebase_core::{ExecutionId, JobId, WorkflowId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use slatebase_automation::broadcast::{ExecutionAction, ExecutionEvent, ExecutionPublisher};
use slatebase_automation::definition::Workflow;
use slatebase_automation::engine::{EngineOutcome, ExecutionEngine};
use slatebase_automation::execution::{ExecutionStatus, WorkflowExecution};
use slatebase_automation::node::NodeId;
use slatebase_automation::progress::{ProgressReporter, ProgressSink};
use slatebase_automation::state::EngineState;
use slatebase_automation::store::{ExecutionStore, StoreError};

use crate::error::{DispatchError, QueueError};
use crate::job::{ExecuteWorkflowJob, Job, JobContext, ResumeWorkflowJob};
use crate::queue::JobQueue;

/// Read access to workflow definitions. The platform's meta store
/// implements this in production; tests use the in-memory version.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Finds a workflow by ID.
    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError>;
}

/// In-memory workflow repository.
#[derive(Default)]
pub struct MemoryWorkflowRepository {
    workflows: std::sync::Mutex<HashMap<WorkflowId, Workflow>>,
}

impl MemoryWorkflowRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a workflow.
    pub fn put(&self, workflow: Workflow) {
        if let Ok(mut workflows) = self.workflows.lock() {
            workflows.insert(workflow.id, workflow);
        }
    }
}

#[async_trait]
impl WorkflowRepository for MemoryWorkflowRepository {
    async fn find_by_id(&self, id: WorkflowId) -> Result<Option<Workflow>, StoreError> {
        Ok(self
            .workflows
            .lock()
            .map_err(|_| StoreError::Backend {
                message: "workflow repository poisoned".to_string(),
            })?
            .get(&id)
            .cloned())
    }
}

/// How a job settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The execution ran to a successful terminal status.
    Completed(ExecutionId),
    /// The execution terminated with status `error`.
    Failed(ExecutionId),
    /// The execution suspended; a delayed resume job is queued.
    Suspended {
        /// The suspended execution.
        execution_id: ExecutionId,
        /// When the resume job fires.
        resume_at: DateTime<Utc>,
    },
    /// The execution was cancelled (workflow disabled or removed while it
    /// was in flight).
    Cancelled(ExecutionId),
    /// Nothing observable was created: disabled workflow, unknown trigger,
    /// or a trigger with no downstream work.
    Skipped,
    /// A stale or duplicate job against an execution that has already
    /// moved on. Safe to ack.
    NoOp,
}

/// Persists throttled traversal snapshots and broadcasts them.
struct ProgressWriter {
    store: Arc<dyn ExecutionStore>,
    publisher: Arc<dyn ExecutionPublisher>,
    row: tokio::sync::Mutex<WorkflowExecution>,
}

#[async_trait]
impl ProgressSink for ProgressWriter {
    async fn progress(&self, state: &EngineState) {
        let Ok(blob) = state.encode() else {
            return;
        };

        let mut row = self.row.lock().await;
        row.record_progress(blob);

        // Progress is best-effort; only the settlement write is load-bearing.
        match self
            .store
            .update_if_status(&row, &[ExecutionStatus::Running])
            .await
        {
            Ok(true) => {
                self.publisher
                    .publish(ExecutionEvent::for_execution(ExecutionAction::Update, &row))
                    .await;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(execution_id = %row.id, error = %e, "progress write failed");
            }
        }
    }
}

/// Dispatches `Execute` and `Resume` jobs.
pub struct Dispatcher {
    workflows: Arc<dyn WorkflowRepository>,
    store: Arc<dyn ExecutionStore>,
    queue: Arc<dyn JobQueue>,
    publisher: Arc<dyn ExecutionPublisher>,
    engine: ExecutionEngine,
    progress_interval: Duration,
}

impl Dispatcher {
    /// Creates a dispatcher with the default one-second progress throttle.
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        store: Arc<dyn ExecutionStore>,
        queue: Arc<dyn JobQueue>,
        publisher: Arc<dyn ExecutionPublisher>,
        engine: ExecutionEngine,
    ) -> Self {
        Self {
            workflows,
            store,
            queue,
            publisher,
            engine,
            progress_interval: Duration::from_secs(1),
        }
    }

    /// Overrides the progress throttle interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Enqueues an `Execute` job. This is the job submission API used by
    /// webhook receipt and manual invocation.
    pub async fn enqueue_execute(
        &self,
        context: JobContext,
        workflow_id: WorkflowId,
        trigger_node_id: NodeId,
        trigger_inputs: HashMap<String, JsonValue>,
    ) -> Result<JobId, QueueError> {
        self.queue
            .enqueue(Job::Execute(ExecuteWorkflowJob {
                context,
                workflow_id,
                trigger_node_id,
                trigger_inputs,
            }))
            .await
    }

    /// Processes one job to settlement.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure failures (store/queue);
    /// the caller should `nack` so the queue's retry policy applies.
    pub async fn process(&self, job: &Job) -> Result<DispatchOutcome, DispatchError> {
        match job {
            Job::Execute(execute) => self.handle_execute(execute).await,
            Job::Resume(resume) => self.handle_resume(resume).await,
        }
    }

    /// Deletes an execution row and broadcasts the deletion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn delete_execution(&self, id: ExecutionId) -> Result<(), DispatchError> {
        let Some(row) = self.store.find_by_id(id).await? else {
            return Ok(());
        };
        self.store.delete(id).await?;
        self.publisher
            .publish(ExecutionEvent::for_execution(ExecutionAction::Delete, &row))
            .await;
        Ok(())
    }

    async fn handle_execute(
        &self,
        job: &ExecuteWorkflowJob,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(workflow) = self.workflows.find_by_id(job.workflow_id).await? else {
            tracing::warn!(workflow_id = %job.workflow_id, "execute for unknown workflow, skipping");
            return Ok(DispatchOutcome::Skipped);
        };

        // Disabled at execute time: aborted before anything is observable.
        // No row is ever created.
        if !workflow.is_enabled() {
            tracing::debug!(workflow_id = %workflow.id, "workflow disabled, skipping execution");
            return Ok(DispatchOutcome::Skipped);
        }

        let snapshot = workflow.snapshot();

        if !snapshot.has_downstream_work(job.trigger_node_id) {
            tracing::debug!(
                workflow_id = %workflow.id,
                trigger_node_id = %job.trigger_node_id,
                "trigger has no downstream work, skipping execution"
            );
            return Ok(DispatchOutcome::Skipped);
        }

        let state = match self
            .engine
            .seed(&snapshot, job.trigger_node_id, job.trigger_inputs.clone())
        {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    workflow_id = %workflow.id,
                    trigger_node_id = %job.trigger_node_id,
                    error = %e,
                    "cannot seed execution, skipping"
                );
                return Ok(DispatchOutcome::Skipped);
            }
        };

        let execution = WorkflowExecution::new(workflow.id, snapshot);
        self.store.create(&execution).await?;
        self.publisher
            .publish(ExecutionEvent::for_execution(
                ExecutionAction::Create,
                &execution,
            ))
            .await;
        tracing::info!(
            execution_id = %execution.id,
            workflow_id = %workflow.id,
            "execution started"
        );

        self.run_to_settlement(execution, state).await
    }

    async fn handle_resume(
        &self,
        job: &ResumeWorkflowJob,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(mut row) = self.store.find_by_id(job.execution_id).await? else {
            tracing::warn!(execution_id = %job.execution_id, "resume for unknown execution");
            return Ok(DispatchOutcome::NoOp);
        };

        // Stale or duplicate resume jobs are safe no-ops: the status guard
        // means at most one Execute/Resume is ever live per execution.
        if row.status.is_terminal() {
            tracing::debug!(execution_id = %row.id, status = row.status.as_str(), "duplicate resume ignored");
            return Ok(DispatchOutcome::NoOp);
        }
        if row.status == ExecutionStatus::Running {
            tracing::debug!(execution_id = %row.id, "resume raced a live execution, ignoring");
            return Ok(DispatchOutcome::NoOp);
        }

        // Disabled (or deleted) at resume time: the execution is already
        // observable, so it terminates visibly instead of vanishing.
        let workflow = self.workflows.find_by_id(row.workflow_id).await?;
        if !workflow.as_ref().is_some_and(Workflow::is_enabled) {
            row.cancel();
            let written = self
                .store
                .update_if_status(&row, &[ExecutionStatus::Waiting])
                .await?;
            if written {
                self.publisher
                    .publish(ExecutionEvent::for_execution(ExecutionAction::Update, &row))
                    .await;
                tracing::info!(execution_id = %row.id, "execution cancelled at resume");
            }
            return Ok(DispatchOutcome::Cancelled(row.id));
        }

        let state = match row
            .execution_data
            .as_ref()
            .ok_or_else(|| "missing execution state".to_string())
            .and_then(|blob| EngineState::decode(blob).map_err(|e| e.to_string()))
        {
            Ok(state) => state,
            Err(message) => {
                row.fail(None, format!("cannot resume: {message}"));
                let written = self
                    .store
                    .update_if_status(&row, &[ExecutionStatus::Waiting])
                    .await?;
                if written {
                    self.publisher
                        .publish(ExecutionEvent::for_execution(ExecutionAction::Update, &row))
                        .await;
                }
                tracing::error!(execution_id = %row.id, %message, "resume failed");
                return Ok(DispatchOutcome::Failed(row.id));
            }
        };

        row.resume();
        let written = self
            .store
            .update_if_status(&row, &[ExecutionStatus::Waiting])
            .await?;
        if !written {
            // Someone else transitioned the row between our read and write.
            return Ok(DispatchOutcome::NoOp);
        }
        self.publisher
            .publish(ExecutionEvent::for_execution(ExecutionAction::Update, &row))
            .await;
        tracing::info!(execution_id = %row.id, "execution resumed");

        self.run_to_settlement(row, state).await
    }

    /// Runs the engine and records the settlement: terminal write, or
    /// suspend write plus delayed resume job. The settlement write is
    /// status-guarded and never throttled.
    async fn run_to_settlement(
        &self,
        mut row: WorkflowExecution,
        state: EngineState,
    ) -> Result<DispatchOutcome, DispatchError> {
        let snapshot = row.workflow_data.clone();
        let writer = ProgressWriter {
            store: self.store.clone(),
            publisher: self.publisher.clone(),
            row: tokio::sync::Mutex::new(row.clone()),
        };
        let reporter = ProgressReporter::new(writer, self.progress_interval);

        let outcome = self.engine.run(&snapshot, state, &reporter).await;

        let settled = match outcome {
            Ok(EngineOutcome::Completed { state }) => {
                match state.encode() {
                    Ok(blob) => row.succeed(blob),
                    Err(e) => row.fail(None, format!("failed to encode final state: {e}")),
                }
                DispatchOutcome::Completed(row.id)
            }
            Ok(EngineOutcome::Failed { state, failure }) => {
                row.fail(state.encode().ok(), failure.to_string());
                DispatchOutcome::Failed(row.id)
            }
            Ok(EngineOutcome::Suspended { state, resume_at }) => match state.encode() {
                Ok(blob) => {
                    row.suspend(blob, resume_at);
                    DispatchOutcome::Suspended {
                        execution_id: row.id,
                        resume_at,
                    }
                }
                Err(e) => {
                    row.fail(None, format!("failed to encode suspended state: {e}"));
                    DispatchOutcome::Failed(row.id)
                }
            },
            Err(e) => {
                // Structural failure: classified, recorded, not retried.
                tracing::error!(execution_id = %row.id, error = %e, "engine error");
                row.fail(None, format!("engine error: {e}"));
                DispatchOutcome::Failed(row.id)
            }
        };

        let written = self
            .store
            .update_if_status(&row, &[ExecutionStatus::Running])
            .await?;
        if !written {
            tracing::warn!(
                execution_id = %row.id,
                "settlement write lost the status race, leaving row as-is"
            );
            return Ok(DispatchOutcome::NoOp);
        }

        self.publisher
            .publish(ExecutionEvent::for_execution(ExecutionAction::Update, &row))
            .await;

        if let DispatchOutcome::Suspended { resume_at, .. } = &settled {
            let delay = (*resume_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
            self.queue
                .enqueue_delayed(
                    Job::Resume(ResumeWorkflowJob {
                        context: JobContext::scheduler(),
                        execution_id: row.id,
                    }),
                    delay,
                )
                .await
                .map_err(DispatchError::Queue)?;
            tracing::info!(
                execution_id = %row.id,
                resume_at = %resume_at,
                "execution suspended, resume scheduled"
            );
        } else {
            tracing::info!(
                execution_id = %row.id,
                status = row.status.as_str(),
                "execution settled"
            );
        }

        Ok(settled)
    }
}
