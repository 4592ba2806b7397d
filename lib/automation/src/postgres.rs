//! Postgres-backed stores.
//!
//! Repository-style implementations of [`ExecutionStore`] and
//! [`ActivationStore`] over sqlx. IDs are stored as their prefixed text
//! form; `workflow_data` and `execution_data` are JSONB columns whose
//! internal shape is private to the workflow version and the engine
//! respectively.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE workflow_executions (
//!     id             TEXT PRIMARY KEY,
//!     workflow_id    TEXT NOT NULL,
//!     workflow_data  JSONB NOT NULL,
//!     execution_data JSONB,
//!     status         TEXT NOT NULL,
//!     error          TEXT,
//!     started_at     TIMESTAMPTZ NOT NULL,
//!     finished_at    TIMESTAMPTZ,
//!     resume_at      TIMESTAMPTZ,
//!     finished       BOOLEAN NOT NULL DEFAULT FALSE
//! );
//!
//! CREATE TABLE activation_states (
//!     workflow_id TEXT NOT NULL,
//!     node_id     TEXT NOT NULL,
//!     state       JSONB NOT NULL,
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     PRIMARY KEY (workflow_id, node_id)
//! );
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use slatebase_core::{ExecutionId, WorkflowId};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

use crate::activation::ActivationStore;
use crate::execution::{ExecutionStatus, WorkflowExecution};
use crate::node::NodeId;
use crate::plugin::ActivationState;
use crate::store::{ExecutionStore, StoreError};

fn decode_error(message: impl Into<String>) -> StoreError {
    StoreError::Serialization {
        message: message.into(),
    }
}

fn backend_error(e: sqlx::Error) -> StoreError {
    StoreError::Backend {
        message: e.to_string(),
    }
}

/// Row type for execution queries.
#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    workflow_data: serde_json::Value,
    execution_data: Option<serde_json::Value>,
    status: String,
    error: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    resume_at: Option<DateTime<Utc>>,
    finished: bool,
}

impl ExecutionRow {
    fn try_into_execution(self) -> Result<WorkflowExecution, StoreError> {
        let id = ExecutionId::from_str(&self.id)
            .map_err(|e| decode_error(format!("invalid execution id '{}': {e}", self.id)))?;
        let workflow_id = WorkflowId::from_str(&self.workflow_id).map_err(|e| {
            decode_error(format!("invalid workflow id '{}': {e}", self.workflow_id))
        })?;
        let status = ExecutionStatus::from_str_value(&self.status)
            .ok_or_else(|| decode_error(format!("invalid status '{}'", self.status)))?;
        let workflow_data = serde_json::from_value(self.workflow_data)
            .map_err(|e| decode_error(format!("invalid workflow_data: {e}")))?;

        Ok(WorkflowExecution {
            id,
            workflow_id,
            workflow_data,
            execution_data: self.execution_data,
            status,
            error: self.error,
            started_at: self.started_at,
            finished_at: self.finished_at,
            resume_at: self.resume_at,
            finished: self.finished,
        })
    }
}

const EXECUTION_COLUMNS: &str = "id, workflow_id, workflow_data, execution_data, status, error, \
                                 started_at, finished_at, resume_at, finished";

/// Postgres-backed execution store.
pub struct PgExecutionStore {
    pool: PgPool,
}

impl PgExecutionStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn workflow_data_json(execution: &WorkflowExecution) -> Result<serde_json::Value, StoreError> {
        serde_json::to_value(&execution.workflow_data)
            .map_err(|e| decode_error(format!("failed to encode workflow_data: {e}")))
    }
}

#[async_trait]
impl ExecutionStore for PgExecutionStore {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, workflow_data, execution_data, status, error,
                 started_at, finished_at, resume_at, finished)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(Self::workflow_data_json(execution)?)
        .bind(&execution.execution_data)
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .bind(execution.resume_at)
        .bind(execution.finished)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> Result<Option<WorkflowExecution>, StoreError> {
        let sql = format!("SELECT {EXECUTION_COLUMNS} FROM workflow_executions WHERE id = $1");
        let row: Option<ExecutionRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend_error)?;

        match row {
            Some(row) => Ok(Some(row.try_into_execution()?)),
            None => Ok(None),
        }
    }

    async fn update(&self, execution: &WorkflowExecution) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_data = $2, status = $3, error = $4,
                finished_at = $5, resume_at = $6, finished = $7
            WHERE id = $1
            "#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.execution_data)
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.finished_at)
        .bind(execution.resume_at)
        .bind(execution.finished)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: execution.id });
        }
        Ok(())
    }

    async fn update_if_status(
        &self,
        execution: &WorkflowExecution,
        expected: &[ExecutionStatus],
    ) -> Result<bool, StoreError> {
        let expected: Vec<String> = expected.iter().map(|s| s.as_str().to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_data = $2, status = $3, error = $4,
                finished_at = $5, resume_at = $6, finished = $7
            WHERE id = $1 AND status = ANY($8)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.execution_data)
        .bind(execution.status.as_str())
        .bind(&execution.error)
        .bind(execution.finished_at)
        .bind(execution.resume_at)
        .bind(execution.finished)
        .bind(&expected)
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: ExecutionId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM workflow_executions WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn list_by_workflow(
        &self,
        workflow_id: WorkflowId,
        limit: usize,
    ) -> Result<Vec<WorkflowExecution>, StoreError> {
        let sql = format!(
            r#"
            SELECT {EXECUTION_COLUMNS}
            FROM workflow_executions
            WHERE workflow_id = $1
            ORDER BY id DESC
            LIMIT $2
            "#
        );
        let rows: Vec<ExecutionRow> = sqlx::query_as(&sql)
            .bind(workflow_id.to_string())
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await
            .map_err(backend_error)?;

        rows.into_iter().map(ExecutionRow::try_into_execution).collect()
    }
}

/// Row type for activation state queries.
#[derive(FromRow)]
struct ActivationRow {
    node_id: String,
    state: serde_json::Value,
}

impl ActivationRow {
    fn try_into_entry(self) -> Result<(NodeId, ActivationState), StoreError> {
        let node_id = NodeId::from_str(&self.node_id)
            .map_err(|e| decode_error(format!("invalid node id '{}': {e}", self.node_id)))?;
        Ok((node_id, ActivationState::new(self.state)))
    }
}

/// Postgres-backed activation state store.
pub struct PgActivationStore {
    pool: PgPool,
}

impl PgActivationStore {
    /// Creates a store over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ActivationStore for PgActivationStore {
    async fn put(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        state: ActivationState,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO activation_states (workflow_id, node_id, state, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (workflow_id, node_id) DO UPDATE SET state = EXCLUDED.state
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(node_id.to_string())
        .bind(state.into_value())
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(())
    }

    async fn get(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            "SELECT state FROM activation_states WHERE workflow_id = $1 AND node_id = $2",
        )
        .bind(workflow_id.to_string())
        .bind(node_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(row.map(|(state,)| ActivationState::new(state)))
    }

    async fn remove(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
    ) -> Result<Option<ActivationState>, StoreError> {
        let row: Option<(serde_json::Value,)> = sqlx::query_as(
            r#"
            DELETE FROM activation_states
            WHERE workflow_id = $1 AND node_id = $2
            RETURNING state
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(node_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend_error)?;

        Ok(row.map(|(state,)| ActivationState::new(state)))
    }

    async fn list_for_workflow(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<Vec<(NodeId, ActivationState)>, StoreError> {
        let rows: Vec<ActivationRow> = sqlx::query_as(
            "SELECT node_id, state FROM activation_states WHERE workflow_id = $1",
        )
        .bind(workflow_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(backend_error)?;

        rows.into_iter().map(ActivationRow::try_into_entry).collect()
    }
}
