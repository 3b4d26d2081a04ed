//! Remote statistics service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use common::{ArticleId, UserId};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "statistics";

/// Counters kept by the remote statistics service.
#[async_trait]
pub trait StatisticsService: Send + Sync {
    /// Increments the number of published articles of an author.
    async fn increment_article_count(&self, author_id: UserId) -> Result<i64, ServiceError>;

    /// Reverts a previous article count increment.
    async fn decrement_article_count(&self, author_id: UserId) -> Result<i64, ServiceError>;

    /// Increments the number of comments on an article.
    async fn increment_comment_count(&self, article_id: ArticleId) -> Result<i64, ServiceError>;

    /// Reverts a previous comment count increment.
    async fn decrement_comment_count(&self, article_id: ArticleId) -> Result<i64, ServiceError>;

    /// Checks that the service is reachable.
    async fn ping(&self) -> Result<(), ServiceError>;
}

#[derive(Debug, Default)]
struct InMemoryStatisticsState {
    article_counts: HashMap<UserId, i64>,
    comment_counts: HashMap<ArticleId, i64>,
}

/// In-memory statistics service for testing.
///
/// Counters are clamped at zero; a decrement on an empty counter is a no-op.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStatisticsService {
    state: Arc<RwLock<InMemoryStatisticsState>>,
    fail_on_increment: Arc<AtomicBool>,
    fail_on_decrement: Arc<AtomicBool>,
    failing_pings: Arc<AtomicU32>,
    decrement_calls: Arc<AtomicU32>,
}

impl InMemoryStatisticsService {
    /// Creates a new in-memory statistics service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures increments to fail.
    pub fn set_fail_on_increment(&self, fail: bool) {
        self.fail_on_increment.store(fail, Ordering::SeqCst);
    }

    /// Configures decrements to fail.
    pub fn set_fail_on_decrement(&self, fail: bool) {
        self.fail_on_decrement.store(fail, Ordering::SeqCst);
    }

    /// Makes the next `count` pings fail.
    pub fn set_failing_pings(&self, count: u32) {
        self.failing_pings.store(count, Ordering::SeqCst);
    }

    /// Returns the article count of an author.
    pub async fn article_count(&self, author_id: UserId) -> i64 {
        self.state
            .read()
            .await
            .article_counts
            .get(&author_id)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the comment count of an article.
    pub async fn comment_count(&self, article_id: ArticleId) -> i64 {
        self.state
            .read()
            .await
            .comment_counts
            .get(&article_id)
            .copied()
            .unwrap_or(0)
    }

    /// Returns how many decrement calls were made (successful or not).
    pub fn decrement_calls(&self) -> u32 {
        self.decrement_calls.load(Ordering::SeqCst)
    }

    fn check_increment(&self) -> Result<(), ServiceError> {
        if self.fail_on_increment.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "increment endpoint returned 503".to_string(),
            });
        }
        Ok(())
    }

    fn check_decrement(&self) -> Result<(), ServiceError> {
        self.decrement_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_decrement.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "decrement endpoint returned 503".to_string(),
            });
        }
        Ok(())
    }
}

fn bump<K: std::hash::Hash + Eq>(counts: &mut HashMap<K, i64>, key: K, delta: i64) -> i64 {
    let count = counts.entry(key).or_insert(0);
    *count = (*count + delta).max(0);
    *count
}

#[async_trait]
impl StatisticsService for InMemoryStatisticsService {
    async fn increment_article_count(&self, author_id: UserId) -> Result<i64, ServiceError> {
        self.check_increment()?;
        let mut state = self.state.write().await;
        Ok(bump(&mut state.article_counts, author_id, 1))
    }

    async fn decrement_article_count(&self, author_id: UserId) -> Result<i64, ServiceError> {
        self.check_decrement()?;
        let mut state = self.state.write().await;
        Ok(bump(&mut state.article_counts, author_id, -1))
    }

    async fn increment_comment_count(&self, article_id: ArticleId) -> Result<i64, ServiceError> {
        self.check_increment()?;
        let mut state = self.state.write().await;
        Ok(bump(&mut state.comment_counts, article_id, 1))
    }

    async fn decrement_comment_count(&self, article_id: ArticleId) -> Result<i64, ServiceError> {
        self.check_decrement()?;
        let mut state = self.state.write().await;
        Ok(bump(&mut state.comment_counts, article_id, -1))
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        let remaining = self.failing_pings.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_pings.store(remaining - 1, Ordering::SeqCst);
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}
