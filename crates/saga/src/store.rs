//! Saga state store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ExecutionId;

use crate::error::StoreError;
use crate::execution::SagaExecution;
use crate::state::SagaStatus;

/// Result type for state store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Keyed store of saga execution records.
///
/// Holds the *current* status of each run (the audit log holds history).
/// Implementations must support concurrent save/read/delete from many
/// executions at once; no execution ever touches another one's record.
#[async_trait]
pub trait SagaStateStore: Send + Sync {
    /// Inserts or replaces the record for `execution.id()`.
    async fn save(&self, execution: &SagaExecution) -> StoreResult<()>;

    /// Retrieves a record by execution ID.
    async fn find_by_id(&self, id: ExecutionId) -> StoreResult<Option<SagaExecution>>;

    /// Removes a record. Returns true if it existed.
    async fn delete(&self, id: ExecutionId) -> StoreResult<bool>;

    /// Returns every stored record.
    async fn find_all(&self) -> StoreResult<HashMap<ExecutionId, SagaExecution>>;

    /// Returns the records currently in `status`.
    async fn find_by_status(&self, status: SagaStatus) -> StoreResult<Vec<SagaExecution>> {
        Ok(self
            .find_all()
            .await?
            .into_values()
            .filter(|e| e.status() == status)
            .collect())
    }

    /// Deletes finished records that ended before `cutoff`. Returns how many
    /// were removed. Records still in flight are never touched.
    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut removed = 0;
        for execution in self.find_all().await?.into_values() {
            if ended_before(&execution, cutoff) && self.delete(execution.id()).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

/// True if `execution` is finished and ended before `cutoff`.
pub(crate) fn ended_before(execution: &SagaExecution, cutoff: DateTime<Utc>) -> bool {
    execution.is_finished() && execution.ended_at().is_some_and(|ended| ended < cutoff)
}

/// Extension trait providing convenience queries for state stores.
#[async_trait]
pub trait SagaStateStoreExt: SagaStateStore {
    /// Returns the records that have not reached a terminal status.
    async fn find_unfinished(&self) -> StoreResult<Vec<SagaExecution>> {
        Ok(self
            .find_all()
            .await?
            .into_values()
            .filter(|e| !e.is_finished())
            .collect())
    }
}

// Blanket implementation for all SagaStateStore implementations
impl<T: SagaStateStore + ?Sized> SagaStateStoreExt for T {}
