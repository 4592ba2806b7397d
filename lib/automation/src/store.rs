//! Execution state store.
//!
//! The store persists one [`WorkflowExecution`] row per run. Because the
//! engine, scheduler, and broadcaster all touch the same row concurrently,
//! every transition that depends on the previous status goes through
//! [`ExecutionStore::update_if_status`] — a compare-and-set on the status
//! column that prevents resurrecting a cancelled or completed execution.

use async_trait::async_trait;
use slatebase_core::{ExecutionId, WorkflowId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use crate::execution::{ExecutionStatus, WorkflowExecution};

/// Errors from store operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced row does not exist.
    NotFound { id: ExecutionId },
    /// A row with this ID already exists.
    AlreadyExists { id: ExecutionId },
    /// Row data could not be encoded or decoded.
    Serialization { message: String },
    /// The backend failed.
    Backend { message: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { id } => write!(f, "execution not found: {id}"),
            Self::AlreadyExists { id } => write!(f, "execution already exists: {id}"),
            Self::Serialization { message } => write!(f, "serialization failed: {message}"),
            Self::Backend { message } => write!(f, "store backend failed: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Persistence for execution rows.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new row.
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Finds a row by ID.
    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError>;

    /// Overwrites a row unconditionally. Prefer [`Self::update_if_status`]
    /// for transitions that depend on the previous status.
    async fn update(&self, execution: &WorkflowExecution) -> Result<(), StoreError>;

    /// Overwrites a row only if its stored status is one of `expected`.
    /// Returns whether the write happened.
    async fn update_if_status(
        &self,
        execution: &WorkflowExecution,
        expected: &[ExecutionStatus],
    ) -> Result<bool, StoreError>;

    /// Deletes a row.
    async fn delete(&self, id: ExecutionId) -> Result<(), StoreError>;

    /// Lists recent rows for a workflow, newest first.
    async fn list_by_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError>;
}

/// In-memory store used in tests and single-process deployments.
#[derive(Default)]
pub struct MemoryExecutionStore {
    rows: Mutex<HashMap<ExecutionId, WorkflowExecution>>,
}

impl MemoryExecutionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ExecutionId, WorkflowExecution>> {
        match self.rows.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ExecutionStore for MemoryExecutionStore {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut rows = self.lock();
        if rows.contains_key(&execution.id) {
            return Err(StoreError::AlreadyExists { id: execution.id });
        }
        rows.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        Ok(self.lock().get(&id).cloned())
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let mut rows = self.lock();
        if !rows.contains_key(&execution.id) {
            return Err(StoreError::NotFound { id: execution.id });
        }
        rows.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update_if_status(
        &self,
        execution: &WorkflowExecution,
        expected: &[ExecutionStatus],
    ) -> Result<bool, StoreError> {
        let mut rows = self.lock();
        let Some(current) = rows.get(&execution.id) else {
            return Err(StoreError::NotFound { id: execution.id });
        };
        if !expected.contains(&current.status) {
            return Ok(false);
        }
        rows.insert(execution.id, execution.clone());
        Ok(true)
    }

    async fn delete(&self, id: ExecutionId) -> Result<(), StoreError> {
        self.lock().remove(&id);
        Ok(())
    }

    async fn list_by_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let mut rows: Vec<WorkflowExecution> = self
            .lock()
            .values()
            .filter(|row| row.workflow_id == workflow_id)
            .cloned()
            .collect();
        // ULIDs sort by creation time.
        rows.sort_by_key(|row| std::cmp::Reverse(row.id.as_ulid()));
        rows.truncate(limit);
        Ok(rows)
    }
}
