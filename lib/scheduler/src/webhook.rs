//! Webhook receipt routing.
//!
//! External systems POST event payloads to paths registered during trigger
//! activation. The HTTP layer (out of scope here) resolves the body and
//! hands `(path, payload)` to the router, which looks up every trigger
//! bound to that path and enqueues one `Execute` job per binding. Endpoint
//! routing and authentication live with the HTTP layer; only the
//! receipt-to-job contract lives here.

use serde_json::Value as JsonValue;
use slatebase_core::{JobId, WorkflowId};
use slatebase_automation::node::NodeId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::error::QueueError;
use crate::job::{ExecuteWorkflowJob, Job, JobContext};
use crate::queue::JobQueue;

/// One trigger registered on a webhook path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WebhookBinding {
    /// The workflow owning the trigger.
    pub workflow_id: WorkflowId,
    /// The trigger node.
    pub node_id: NodeId,
}

/// Maps webhook paths to trigger nodes and turns receipts into jobs.
pub struct WebhookRouter {
    queue: Arc<dyn JobQueue>,
    bindings: Mutex<HashMap<String, Vec<WebhookBinding>>>,
}

impl WebhookRouter {
    /// Creates a router enqueuing onto the given queue.
    #[must_use]
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            bindings: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<WebhookBinding>>> {
        match self.bindings.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Binds a trigger node to a path. Multiple triggers may share a path.
    pub fn bind(&self, path: impl Into<String>, workflow_id: WorkflowId, node_id: NodeId) {
        self.lock().entry(path.into()).or_default().push(WebhookBinding {
            workflow_id,
            node_id,
        });
    }

    /// Removes a trigger node's binding from a path.
    pub fn unbind(&self, path: &str, node_id: NodeId) {
        let mut bindings = self.lock();
        if let Some(bound) = bindings.get_mut(path) {
            bound.retain(|b| b.node_id != node_id);
            if bound.is_empty() {
                bindings.remove(path);
            }
        }
    }

    /// Removes every binding for a workflow (unpublish).
    pub fn unbind_workflow(&self, workflow_id: WorkflowId) {
        let mut bindings = self.lock();
        for bound in bindings.values_mut() {
            bound.retain(|b| b.workflow_id != workflow_id);
        }
        bindings.retain(|_, bound| !bound.is_empty());
    }

    /// Handles a webhook receipt: one `Execute` job per trigger bound to
    /// the path, each seeded with the received payload on the trigger's
    /// `output` port. Unknown paths enqueue nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue rejects a job.
    pub async fn receive(
        &self,
        path: &str,
        payload: JsonValue,
    ) -> Result<Vec<JobId>, QueueError> {
        let bound = self.lock().get(path).cloned().unwrap_or_default();
        if bound.is_empty() {
            tracing::debug!(path, "webhook receipt with no bound triggers");
            return Ok(Vec::new());
        }

        let mut job_ids = Vec::with_capacity(bound.len());
        for binding in bound {
            let trigger_inputs: HashMap<String, JsonValue> =
                [("output".to_string(), payload.clone())].into_iter().collect();

            let job_id = self
                .queue
                .enqueue(Job::Execute(ExecuteWorkflowJob {
                    context: JobContext::webhook(),
                    workflow_id: binding.workflow_id,
                    trigger_node_id: binding.node_id,
                    trigger_inputs,
                }))
                .await?;

            tracing::info!(
                path,
                workflow_id = %binding.workflow_id,
                node_id = %binding.node_id,
                job_id = %job_id,
                "webhook receipt enqueued"
            );
            job_ids.push(job_id);
        }

        Ok(job_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::MemoryJobQueue;

    fn router() -> (WebhookRouter, Arc<MemoryJobQueue>) {
        let queue = Arc::new(MemoryJobQueue::default());
        (WebhookRouter::new(queue.clone()), queue)
    }

    #[tokio::test]
    async fn receipt_enqueues_execute_per_binding() {
        let (router, queue) = router();
        let workflow_a = WorkflowId::new();
        let workflow_b = WorkflowId::new();
        let node_a = NodeId::new();
        let node_b = NodeId::new();

        router.bind("/hooks/orders", workflow_a, node_a);
        router.bind("/hooks/orders", workflow_b, node_b);

        let job_ids = router
            .receive("/hooks/orders", serde_json::json!({"order": 42}))
            .await
            .expect("receive");
        assert_eq!(job_ids.len(), 2);

        let first = queue.dequeue().await.unwrap().unwrap();
        let Job::Execute(job) = first.job else {
            panic!("expected execute job");
        };
        assert_eq!(job.workflow_id, workflow_a);
        assert_eq!(job.trigger_node_id, node_a);
        assert_eq!(
            job.trigger_inputs.get("output"),
            Some(&serde_json::json!({"order": 42}))
        );
        assert_eq!(job.context.source, crate::job::JobSource::Webhook);
    }

    #[tokio::test]
    async fn unknown_path_enqueues_nothing() {
        let (router, queue) = router();

        let job_ids = router
            .receive("/hooks/nothing", serde_json::json!({}))
            .await
            .expect("receive");
        assert!(job_ids.is_empty());

        queue.close();
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unbind_removes_single_binding() {
        let (router, _queue) = router();
        let workflow_id = WorkflowId::new();
        let keep = NodeId::new();
        let removed = NodeId::new();

        router.bind("/hooks/x", workflow_id, keep);
        router.bind("/hooks/x", workflow_id, removed);
        router.unbind("/hooks/x", removed);

        let job_ids = router
            .receive("/hooks/x", serde_json::json!({}))
            .await
            .expect("receive");
        assert_eq!(job_ids.len(), 1);
    }

    #[tokio::test]
    async fn unbind_workflow_clears_all_paths() {
        let (router, _queue) = router();
        let workflow_id = WorkflowId::new();

        router.bind("/hooks/a", workflow_id, NodeId::new());
        router.bind("/hooks/b", workflow_id, NodeId::new());
        router.unbind_workflow(workflow_id);

        assert!(router
            .receive("/hooks/a", serde_json::json!({}))
            .await
            .unwrap()
            .is_empty());
        assert!(router
            .receive("/hooks/b", serde_json::json!({}))
            .await
            .unwrap()
            .is_empty());
    }
}
