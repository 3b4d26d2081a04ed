use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::ExecutionId;
use dashmap::DashMap;

use crate::execution::SagaExecution;
use crate::state::SagaStatus;
use crate::store::{SagaStateStore, StoreResult, ended_before};

/// In-memory saga state store.
///
/// Records live in a sharded concurrent map, so concurrent executions only
/// contend when their IDs hash to the same shard. Clones share the same map.
#[derive(Clone, Default)]
pub struct InMemorySagaStateStore {
    executions: Arc<DashMap<ExecutionId, SagaExecution>>,
}

impl InMemorySagaStateStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored records.
    pub fn len(&self) -> usize {
        self.executions.len()
    }

    /// Returns true if no records are stored.
    pub fn is_empty(&self) -> bool {
        self.executions.is_empty()
    }

    /// Removes every record.
    pub fn clear(&self) {
        self.executions.clear();
    }
}

#[async_trait]
impl SagaStateStore for InMemorySagaStateStore {
    async fn save(&self, execution: &SagaExecution) -> StoreResult<()> {
        self.executions.insert(execution.id(), execution.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: ExecutionId) -> StoreResult<Option<SagaExecution>> {
        Ok(self.executions.get(&id).map(|e| e.value().clone()))
    }

    async fn delete(&self, id: ExecutionId) -> StoreResult<bool> {
        Ok(self.executions.remove(&id).is_some())
    }

    async fn find_all(&self) -> StoreResult<HashMap<ExecutionId, SagaExecution>> {
        Ok(self
            .executions
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect())
    }

    async fn find_by_status(&self, status: SagaStatus) -> StoreResult<Vec<SagaExecution>> {
        Ok(self
            .executions
            .iter()
            .filter(|e| e.status() == status)
            .map(|e| e.value().clone())
            .collect())
    }

    async fn purge_finished_before(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let mut removed = 0;
        self.executions.retain(|_, execution| {
            let expired = ended_before(execution, cutoff);
            if expired {
                removed += 1;
            }
            !expired
        });
        Ok(removed)
    }
}
