//! NATS JetStream job queue.
//!
//! Jobs are published to a work-queue stream; each delivery is consumed by
//! exactly one worker through a durable pull consumer. `nack` hands the
//! message back to JetStream, whose redelivery policy is the retry policy —
//! the scheduler keeps no bookkeeping of its own. Delays on resume jobs are
//! honored queue-side with a timer ahead of the publish.

use async_nats::jetstream;
use async_nats::jetstream::consumer::pull;
use async_trait::async_trait;
use futures::StreamExt;
use slatebase_core::JobId;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::QueueError;
use crate::job::{Job, QueuedJob};
use crate::queue::JobQueue;

/// Subject jobs are published to.
const JOBS_SUBJECT: &str = "automation.jobs";

/// Stream name for jobs.
const JOBS_STREAM_NAME: &str = "AUTOMATION_JOBS";

/// Durable consumer shared by the worker pool.
const WORKERS_CONSUMER_NAME: &str = "automation-workers";

/// Configuration for the NATS job queue.
#[derive(Debug, Clone)]
pub struct NatsQueueConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name (defaults to AUTOMATION_JOBS).
    pub stream_name: Option<String>,
    /// Maximum JetStream deliveries before a job is dropped.
    pub max_deliver: i64,
}

impl NatsQueueConfig {
    /// Creates a config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_name: None,
            max_deliver: 3,
        }
    }

    fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(JOBS_STREAM_NAME)
    }
}

type MessageStream = jetstream::consumer::pull::Stream;

/// JetStream-backed job queue.
pub struct NatsJobQueue {
    jetstream: Arc<jetstream::Context>,
    messages: tokio::sync::Mutex<MessageStream>,
    in_flight: std::sync::Mutex<HashMap<JobId, jetstream::Message>>,
}

impl NatsJobQueue {
    /// Connects and ensures the stream and consumer exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn new(config: NatsQueueConfig) -> Result<Self, QueueError> {
        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| QueueError::Publish {
                message: format!("failed to connect: {e}"),
            })?;

        let jetstream = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream().to_string(),
            subjects: vec![JOBS_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };

        let stream = jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::Publish {
                message: format!("failed to create jobs stream: {e}"),
            })?;

        let consumer_config = pull::Config {
            durable_name: Some(WORKERS_CONSUMER_NAME.to_string()),
            max_deliver: config.max_deliver,
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(WORKERS_CONSUMER_NAME, consumer_config)
            .await
            .map_err(|e| QueueError::Consume {
                message: format!("failed to create consumer: {e}"),
            })?;

        let messages = consumer.messages().await.map_err(|e| QueueError::Consume {
            message: format!("failed to open message stream: {e}"),
        })?;

        Ok(Self {
            jetstream: Arc::new(jetstream),
            messages: tokio::sync::Mutex::new(messages),
            in_flight: std::sync::Mutex::new(HashMap::new()),
        })
    }

    async fn publish(jetstream: &jetstream::Context, queued: &QueuedJob) -> Result<(), QueueError> {
        let bytes = serde_json::to_vec(queued).map_err(|e| QueueError::Serialization {
            message: e.to_string(),
        })?;

        jetstream
            .publish(JOBS_SUBJECT, bytes.into())
            .await
            .map_err(|e| QueueError::Publish {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| QueueError::Publish {
                message: e.to_string(),
            })?;

        Ok(())
    }

    fn take_in_flight(&self, id: JobId) -> Option<jetstream::Message> {
        match self.in_flight.lock() {
            Ok(mut in_flight) => in_flight.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        }
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let queued = QueuedJob::first_delivery(job);
        let id = queued.id;
        Self::publish(&self.jetstream, &queued).await?;
        Ok(id)
    }

    async fn enqueue_delayed(&self, job: Job, delay: Duration) -> Result<JobId, QueueError> {
        let queued = QueuedJob::first_delivery(job);
        let id = queued.id;
        let jetstream = self.jetstream.clone();

        // The queue owns the delay: the job becomes visible only after the
        // timer fires.
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = Self::publish(&jetstream, &queued).await {
                tracing::error!(job_id = %id, error = %e, "delayed job publish failed");
            }
        });

        Ok(id)
    }

    async fn dequeue(&self) -> Result<Option<QueuedJob>, QueueError> {
        let message = {
            let mut messages = self.messages.lock().await;
            messages.next().await
        };

        let Some(message) = message else {
            return Ok(None);
        };
        let message = message.map_err(|e| QueueError::Consume {
            message: e.to_string(),
        })?;

        let mut queued: QueuedJob =
            serde_json::from_slice(&message.payload).map_err(|e| QueueError::Serialization {
                message: e.to_string(),
            })?;

        // JetStream knows the real delivery count.
        if let Ok(info) = message.info() {
            queued.attempt = u32::try_from(info.delivered).unwrap_or(queued.attempt);
        }

        match self.in_flight.lock() {
            Ok(mut in_flight) => {
                in_flight.insert(queued.id, message);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(queued.id, message);
            }
        }

        Ok(Some(queued))
    }

    async fn ack(&self, job: &QueuedJob) -> Result<(), QueueError> {
        let Some(message) = self.take_in_flight(job.id) else {
            return Ok(());
        };

        message.ack().await.map_err(|e| QueueError::Consume {
            message: format!("ack failed: {e}"),
        })
    }

    async fn nack(&self, job: QueuedJob) -> Result<(), QueueError> {
        let Some(message) = self.take_in_flight(job.id) else {
            return Ok(());
        };

        message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| QueueError::Consume {
                message: format!("nack failed: {e}"),
            })
    }
}
