//! Job scheduling for slatebase automations.
//!
//! This crate provides:
//!
//! - **Jobs**: the two queue payloads, `Execute` and `Resume`
//! - **Job Queue**: trait plus in-memory and NATS JetStream backends; the
//!   queue owns delayed delivery and retry
//! - **Dispatcher**: job processing — snapshot, run, settle, classify
//! - **Worker Pool**: concurrent queue consumers with graceful shutdown
//! - **Webhook Router**: the receipt-to-Execute-job contract
//! - **Config**: environment-driven scheduler settings

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod job;
pub mod nats;
pub mod queue;
pub mod webhook;
pub mod worker;

pub use config::SchedulerConfig;
pub use dispatcher::{
    DispatchOutcome, Dispatcher, MemoryWorkflowRepository, WorkflowRepository,
};
pub use error::{DispatchError, QueueError};
pub use job::{ExecuteWorkflowJob, Job, JobContext, JobSource, QueuedJob, ResumeWorkflowJob};
pub use nats::{NatsJobQueue, NatsQueueConfig};
pub use queue::{JobQueue, MemoryJobQueue};
pub use webhook::{WebhookBinding, WebhookRouter};
pub use worker::{WorkerPool, WorkerPoolHandle};
