//! Worker pool.
//!
//! N tokio tasks consume the job queue and drive the dispatcher. Workers
//! hold no state of their own: a job either settles (`ack`) or failed on
//! infrastructure (`nack`, so the queue's retry policy applies). Executions
//! running on different workers share nothing but the state store, which
//! guards itself by status.

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dispatcher::Dispatcher;
use crate::queue::JobQueue;

/// A pool of job-consuming workers.
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    dispatcher: Arc<Dispatcher>,
    worker_count: usize,
}

impl WorkerPool {
    /// Creates a pool.
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>, dispatcher: Arc<Dispatcher>, worker_count: usize) -> Self {
        Self {
            queue,
            dispatcher,
            worker_count: worker_count.max(1),
        }
    }

    /// Spawns the workers and returns a handle for shutdown.
    #[must_use]
    pub fn spawn(self) -> WorkerPoolHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut handles = Vec::with_capacity(self.worker_count);

        for worker in 0..self.worker_count {
            let queue = self.queue.clone();
            let dispatcher = self.dispatcher.clone();
            let mut shutdown = shutdown_rx.clone();

            handles.push(tokio::spawn(async move {
                tracing::debug!(worker, "worker started");
                loop {
                    let job = tokio::select! {
                        job = queue.dequeue() => job,
                        _ = shutdown.changed() => break,
                    };

                    let queued = match job {
                        Ok(Some(queued)) => queued,
                        Ok(None) => break,
                        Err(e) => {
                            tracing::error!(worker, error = %e, "dequeue failed");
                            continue;
                        }
                    };

                    tracing::debug!(worker, job_id = %queued.id, attempt = queued.attempt, "processing job");
                    match dispatcher.process(&queued.job).await {
                        Ok(outcome) => {
                            tracing::debug!(worker, job_id = %queued.id, ?outcome, "job settled");
                            if let Err(e) = queue.ack(&queued).await {
                                tracing::warn!(job_id = %queued.id, error = %e, "ack failed");
                            }
                        }
                        Err(e) => {
                            // Infrastructure failure: back to the queue for
                            // its retry policy.
                            tracing::warn!(job_id = %queued.id, error = %e, "job failed, returning to queue");
                            if let Err(e) = queue.nack(queued).await {
                                tracing::error!(error = %e, "nack failed, job lost");
                            }
                        }
                    }
                }
                tracing::debug!(worker, "worker stopped");
            }));
        }

        WorkerPoolHandle {
            shutdown: shutdown_tx,
            handles,
        }
    }
}

/// Handle for a running worker pool.
pub struct WorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Signals shutdown and waits for all workers to stop. In-flight jobs
    /// finish; queued jobs stay in the queue.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::{DispatchOutcome, MemoryWorkflowRepository};
    use crate::job::JobContext;
    use crate::queue::MemoryJobQueue;
    use slatebase_automation::broadcast::MemoryPublisher;
    use slatebase_automation::definition::Workflow;
    use slatebase_automation::edge::Edge;
    use slatebase_automation::engine::ExecutionEngine;
    use slatebase_automation::execution::ExecutionStatus;
    use slatebase_automation::node::NodeInstance;
    use slatebase_automation::registry::NodeRegistry;
    use slatebase_automation::store::{ExecutionStore, MemoryExecutionStore};
    use std::time::Duration;

    fn setup() -> (
        Arc<MemoryJobQueue>,
        Arc<Dispatcher>,
        Arc<MemoryExecutionStore>,
        Workflow,
        slatebase_automation::node::NodeId,
    ) {
        let registry = Arc::new(NodeRegistry::with_builtins());
        let workflows = Arc::new(MemoryWorkflowRepository::new());
        let store = Arc::new(MemoryExecutionStore::new());
        let queue = Arc::new(MemoryJobQueue::default());
        let publisher = Arc::new(MemoryPublisher::new());

        let mut workflow = Workflow::new("Test");
        let trigger = workflow.add_node(NodeInstance::new(
            "core.manual_trigger",
            "Trigger",
            serde_json::json!({}),
        ));
        let action = workflow.add_node(NodeInstance::new(
            "core.set_values",
            "Action",
            serde_json::json!({"values": {"ok": true}}),
        ));
        workflow.add_edge(Edge::with_default_ports(trigger, action));
        workflows.put(workflow.clone());

        let dispatcher = Arc::new(Dispatcher::new(
            workflows,
            store.clone(),
            queue.clone(),
            publisher,
            ExecutionEngine::new(registry),
        ));

        (queue, dispatcher, store, workflow, trigger)
    }

    #[tokio::test]
    async fn pool_processes_enqueued_jobs() {
        let (queue, dispatcher, store, workflow, trigger) = setup();

        let pool = WorkerPool::new(queue.clone(), dispatcher.clone(), 2);
        let handle = pool.spawn();

        dispatcher
            .enqueue_execute(
                JobContext::default(),
                workflow.id,
                trigger,
                [("output".to_string(), serde_json::json!({}))]
                    .into_iter()
                    .collect(),
            )
            .await
            .expect("enqueue");

        // Wait for the execution row to settle.
        let mut settled = false;
        for _ in 0..50 {
            let rows = store.list_by_workflow(workflow.id, 10).await.unwrap();
            if rows
                .first()
                .is_some_and(|row| row.status == ExecutionStatus::Success)
            {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(settled, "worker should have settled the execution");

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_stops_idle_workers() {
        let (queue, dispatcher, _store, _workflow, _trigger) = setup();

        let pool = WorkerPool::new(queue, dispatcher, 3);
        let handle = pool.spawn();

        // Workers are idle; shutdown should return promptly.
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("shutdown should not hang");
    }

    #[tokio::test]
    async fn closed_queue_stops_workers() {
        let (queue, dispatcher, _store, _workflow, _trigger) = setup();

        let pool = WorkerPool::new(queue.clone(), dispatcher, 1);
        let handle = pool.spawn();

        queue.close();

        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .expect("workers should stop when the queue closes");
    }

    #[tokio::test]
    async fn worker_outcome_debug_is_usable() {
        // DispatchOutcome is logged with Debug by the worker loop.
        let outcome = DispatchOutcome::Skipped;
        assert_eq!(format!("{outcome:?}"), "Skipped");
    }
}
