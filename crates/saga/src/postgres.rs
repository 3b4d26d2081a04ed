use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ExecutionId;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::context::SagaContext;
use crate::error::StoreError;
use crate::execution::SagaExecution;
use crate::state::SagaStatus;
use crate::store::{SagaStateStore, StoreResult};

const SELECT_COLUMNS: &str = "id, saga_name, status, current_step, completed_steps, \
     initial_context, context, error_message, started_at, ended_at";

/// PostgreSQL-backed saga state store.
///
/// One row per execution, upserted on every save.
#[derive(Clone)]
pub struct PostgresSagaStateStore {
    pool: PgPool,
}

impl PostgresSagaStateStore {
    /// Creates a new PostgreSQL state store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Creates the `saga_executions` table if it does not exist.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::raw_sql(include_str!(
            "../../../migrations/001_create_saga_executions.sql"
        ))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn row_to_execution(row: PgRow) -> StoreResult<SagaExecution> {
        let status: String = row.try_get("status")?;
        let status: SagaStatus = status.parse().map_err(StoreError::Corrupt)?;

        let current_step: i32 = row.try_get("current_step")?;
        let completed: Vec<i32> = row.try_get("completed_steps")?;
        let completed_steps = completed
            .into_iter()
            .map(|i| {
                usize::try_from(i).map_err(|_| StoreError::Corrupt(format!("negative step index {i}")))
            })
            .collect::<StoreResult<BTreeSet<usize>>>()?;

        let initial_context: SagaContext =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("initial_context")?)?;
        let context: SagaContext =
            serde_json::from_value(row.try_get::<serde_json::Value, _>("context")?)?;

        Ok(SagaExecution::from_parts(
            ExecutionId::from_uuid(row.try_get::<Uuid, _>("id")?),
            row.try_get("saga_name")?,
            initial_context,
            context,
            usize::try_from(current_step)
                .map_err(|_| StoreError::Corrupt(format!("negative current step {current_step}")))?,
            completed_steps,
            status,
            row.try_get("error_message")?,
            row.try_get::<DateTime<Utc>, _>("started_at")?,
            row.try_get::<Option<DateTime<Utc>>, _>("ended_at")?,
        ))
    }
}

fn to_i32(value: usize) -> StoreResult<i32> {
    i32::try_from(value).map_err(|_| StoreError::Corrupt(format!("step index {value} out of range")))
}

#[async_trait]
impl SagaStateStore for PostgresSagaStateStore {
    async fn save(&self, execution: &SagaExecution) -> StoreResult<()> {
        let completed = execution
            .completed_steps()
            .iter()
            .map(|&i| to_i32(i))
            .collect::<StoreResult<Vec<i32>>>()?;

        sqlx::query(
            r#"
            INSERT INTO saga_executions
                (id, saga_name, status, current_step, completed_steps,
                 initial_context, context, error_message, started_at, ended_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            ON CONFLICT (id) DO UPDATE SET
                status = EXCLUDED.status,
                current_step = EXCLUDED.current_step,
                completed_steps = EXCLUDED.completed_steps,
                context = EXCLUDED.context,
                error_message = EXCLUDED.error_message,
                ended_at = EXCLUDED.ended_at,
                updated_at = NOW()
            "#,
        )
        .bind(execution.id().as_uuid())
        .bind(execution.saga_name())
        .bind(execution.status().as_str())
        .bind(to_i32(execution.current_step())?)
        .bind(completed)
        .bind(execution.initial_context().to_value())
        .bind(execution.context().to_value())
        .bind(execution.error_message())
        .bind(execution.started_at())
        .bind(execution.ended_at())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> StoreResult<Option<SagaExecution>> {
        let row = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_executions WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_execution).transpose()
    }

    async fn delete(&self, id: ExecutionId) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM saga_executions WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_all(&self) -> StoreResult<HashMap<ExecutionId, SagaExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_executions ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| Self::row_to_execution(row).map(|e| (e.id(), e)))
            .collect()
    }

    async fn find_by_status(&self, status: SagaStatus) -> StoreResult<Vec<SagaExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {SELECT_COLUMNS} FROM saga_executions WHERE status = $1 ORDER BY started_at"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_execution).collect()
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let result = sqlx::query(
            "DELETE FROM saga_executions WHERE status = ANY($1) AND ended_at < $2",
        )
        .bind(
            [SagaStatus::Completed, SagaStatus::Compensated, SagaStatus::Failed]
                .map(|s| s.as_str())
                .to_vec(),
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(usize::try_from(result.rows_affected()).unwrap_or(usize::MAX))
    }
}
