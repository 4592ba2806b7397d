//! Error types for the scheduler crate.
//!
//! `QueueError` covers the queue backend; `DispatchError` is what job
//! processing can surface to a worker. Both are infrastructure-flavored by
//! design: engine-level failures (missing workflow, disabled workflow,
//! corrupt state) are classified inside the dispatcher and recorded on the
//! execution row instead of erroring, so a worker that sees `Err` knows
//! the job should go back to the queue for retry.

use slatebase_automation::StoreError;
use std::fmt;

/// Errors from job queue operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The queue has been closed.
    Closed,
    /// Publishing a job failed.
    Publish { message: String },
    /// Consuming a job failed.
    Consume { message: String },
    /// A job payload could not be encoded or decoded.
    Serialization { message: String },
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "job queue is closed"),
            Self::Publish { message } => write!(f, "job publish failed: {message}"),
            Self::Consume { message } => write!(f, "job consume failed: {message}"),
            Self::Serialization { message } => {
                write!(f, "job serialization failed: {message}")
            }
        }
    }
}

impl std::error::Error for QueueError {}

/// Errors from job dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The execution state store failed.
    Store(StoreError),
    /// The job queue failed.
    Queue(QueueError),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Queue(e) => write!(f, "queue error: {e}"),
        }
    }
}

impl std::error::Error for DispatchError {}

impl From<StoreError> for DispatchError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<QueueError> for DispatchError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}
