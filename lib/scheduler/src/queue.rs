//! Job queue abstraction and in-memory backend.
//!
//! The queue owns two behaviors the dispatcher deliberately does not:
//! honoring the delay on resume jobs, and retrying jobs whose processing
//! failed (`nack`). Workers consume with `dequeue`, then `ack` or `nack`
//! exactly once per delivery.

use async_trait::async_trait;
use slatebase_core::JobId;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error::QueueError;
use crate::job::{Job, QueuedJob};

/// A queue carrying [`Job`] payloads.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueues a job for immediate delivery.
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError>;

    /// Enqueues a job that must not be delivered before `delay` elapses.
    /// The queue backend owns the timer; callers record the job and move
    /// on.
    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> Result<JobId, QueueError>;

    /// Waits for the next job. Returns `None` once the queue is closed and
    /// drained.
    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError>;

    /// Acknowledges a processed job.
    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError>;

    /// Returns a failed job to the queue for redelivery, subject to the
    /// backend's retry policy.
    async fn nack(&self, job: QueuedJob) -> Result<(), QueueError>;
}

/// In-memory queue used in tests and single-process deployments.
///
/// Delays are honored with a spawned timer; redelivery is capped at
/// `max_attempts`, after which the job is dropped with an error log (a
/// stand-in for a dead-letter stream).
pub struct MemoryJobQueue {
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueuedJob>>,
    max_attempts: u32,
}

impl MemoryJobQueue {
    /// Creates a queue with the given redelivery cap.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender: Mutex::new(Some(sender)),
            receiver: tokio::sync::Mutex::new(receiver),
            max_attempts,
        }
    }

    /// Closes the queue. Pending jobs remain consumable; `dequeue` returns
    /// `None` once they are drained.
    pub fn close(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
    }

    fn sender(&self) -> Result<mpsc::UnboundedSender<QueuedJob>, QueueError> {
        self.sender
            .lock()
            .ok()
            .and_then(|guard| guard.clone())
            .ok_or(QueueError::Closed)
    }

    fn send(&self, job: QueuedJob) -> Result<(), QueueError> {
        self.sender()?.send(job).map_err(|_| QueueError::Closed)
    }
}

impl Default for MemoryJobQueue {
    fn default() -> Self {
        Self::new(3)
    }
}

#[async_trait]
impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let queued = QueuedJob::first_delivery(job);
        let id = queued.id;
        self.send(queued)?;
        Ok(id)
    }

    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> Result<JobId, QueueError> {
        let queued = QueuedJob::first_delivery(job);
        let id = queued.id;
        let sender = self.sender()?;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(queued).is_err() {
                tracing::debug!(job_id = %id, "queue closed before delayed job fired");
            }
        });

        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn ack(&self, _job: &QueuedJob) -> Result<(), QueueError> {
        Ok(())
    }

    async fn nack(&self, job: QueuedJob) -> Result<(), QueueError> {
        if job.attempt >= self.max_attempts {
            tracing::error!(
                job_id = %job.id,
                attempts = job.attempt,
                "job exhausted its delivery attempts, dropping"
            );
            return Ok(());
        }
        self.send(job.redelivered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobContext, ResumeWorkflowJob};
    use slatebase_core::ExecutionId;

    fn resume_job() -> Job {
        Job::Resume(ResumeWorkflowJob {
            context: JobContext::scheduler(),
            execution_id: ExecutionId::new(),
        })
    }

    #[tokio::test]
    async fn enqueue_dequeue_roundtrip() {
        let queue = MemoryJobQueue::default();
        let job = resume_job();

        let id = queue.enqueue(job.clone()).await.expect("enqueue");
        let delivered = queue.dequeue().await.expect("dequeue").expect("job");

        assert_eq!(delivered.id, id);
        assert_eq!(delivered.job, job);
        assert_eq!(delivered.attempt, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_jobs_wait_out_their_delay() {
        let queue = MemoryJobQueue::default();
        queue
            .enqueue_delayed(resume_job(), Duration::from_secs(5))
            .await
            .expect("enqueue");

        // Nothing is deliverable before the delay elapses.
        tokio::time::advance(Duration::from_secs(4)).await;
        let early = tokio::time::timeout(Duration::from_millis(10), queue.dequeue()).await;
        assert!(early.is_err());

        tokio::time::advance(Duration::from_secs(2)).await;
        let delivered = queue.dequeue().await.expect("dequeue");
        assert!(delivered.is_some());
    }

    #[tokio::test]
    async fn nack_redelivers_with_bumped_attempt() {
        let queue = MemoryJobQueue::new(3);
        queue.enqueue(resume_job()).await.expect("enqueue");

        let first = queue.dequeue().await.unwrap().unwrap();
        queue.nack(first.clone()).await.expect("nack");

        let second = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn nack_drops_exhausted_jobs() {
        let queue = MemoryJobQueue::new(1);
        queue.enqueue(resume_job()).await.expect("enqueue");

        let delivered = queue.dequeue().await.unwrap().unwrap();
        queue.nack(delivered).await.expect("nack");
        queue.close();

        // Nothing was redelivered.
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }

    #[tokio::test]
    async fn closed_queue_rejects_enqueue_and_drains() {
        let queue = MemoryJobQueue::default();
        queue.enqueue(resume_job()).await.expect("enqueue");
        queue.close();

        assert_eq!(queue.enqueue(resume_job()).await, Err(QueueError::Closed));

        // The job enqueued before the close is still deliverable.
        assert!(queue.dequeue().await.unwrap().is_some());
        assert_eq!(queue.dequeue().await.unwrap(), None);
    }
}
