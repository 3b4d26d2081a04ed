//! Article aggregate, its repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{ArticleId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "article";

/// Publication status of an article.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArticleStatus {
    #[default]
    Draft,
    Published,
}

impl std::fmt::Display for ArticleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArticleStatus::Draft => write!(f, "DRAFT"),
            ArticleStatus::Published => write!(f, "PUBLISHED"),
        }
    }
}

/// An article owned by an author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub author_id: UserId,
    pub title: String,
    pub status: ArticleStatus,
}

impl Article {
    /// Creates a new draft article.
    pub fn draft(author_id: UserId, title: impl Into<String>) -> Self {
        Self {
            id: ArticleId::new(),
            author_id,
            title: title.into(),
            status: ArticleStatus::Draft,
        }
    }
}

/// Persistence for articles.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Loads an article by ID.
    async fn find(&self, id: ArticleId) -> Result<Option<Article>, ServiceError>;

    /// Inserts or replaces an article.
    async fn save(&self, article: Article) -> Result<(), ServiceError>;

    /// Checks that the repository is reachable.
    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryArticleState {
    articles: HashMap<ArticleId, Article>,
}

/// In-memory article repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArticleRepository {
    state: Arc<RwLock<InMemoryArticleState>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryArticleRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on save calls.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored articles.
    pub async fn article_count(&self) -> usize {
        self.state.read().await.articles.len()
    }
}

#[async_trait]
impl ArticleRepository for InMemoryArticleRepository {
    async fn find(&self, id: ArticleId) -> Result<Option<Article>, ServiceError> {
        Ok(self.state.read().await.articles.get(&id).cloned())
    }

    async fn save(&self, article: Article) -> Result<(), ServiceError> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "write rejected".to_string(),
            });
        }
        self.state
            .write()
            .await
            .articles
            .insert(article.id, article);
        Ok(())
    }
}
