//! Comment aggregate, its repository trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ArticleId, CommentId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "comment";

/// A comment left on an article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub article_id: ArticleId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Comment {
    /// Creates a new comment.
    pub fn new(article_id: ArticleId, author_id: UserId, body: impl Into<String>) -> Self {
        Self {
            id: CommentId::new(),
            article_id,
            author_id,
            body: body.into(),
            created_at: Utc::now(),
        }
    }
}

/// Persistence for comments.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Loads a comment by ID.
    async fn find(&self, id: CommentId) -> Result<Option<Comment>, ServiceError>;

    /// Inserts or replaces a comment.
    async fn save(&self, comment: Comment) -> Result<(), ServiceError>;

    /// Deletes a comment. Deleting a missing comment is not an error.
    async fn delete(&self, id: CommentId) -> Result<bool, ServiceError>;

    /// Checks that the repository is reachable.
    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryCommentState {
    comments: HashMap<CommentId, Comment>,
}

/// In-memory comment repository.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommentRepository {
    state: Arc<RwLock<InMemoryCommentState>>,
    fail_on_save: Arc<AtomicBool>,
}

impl InMemoryCommentRepository {
    /// Creates a new empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the repository to fail on save calls.
    pub fn set_fail_on_save(&self, fail: bool) {
        self.fail_on_save.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of stored comments.
    pub async fn comment_count(&self) -> usize {
        self.state.read().await.comments.len()
    }
}

#[async_trait]
impl CommentRepository for InMemoryCommentRepository {
    async fn find(&self, id: CommentId) -> Result<Option<Comment>, ServiceError> {
        Ok(self.state.read().await.comments.get(&id).cloned())
    }

    async fn save(&self, comment: Comment) -> Result<(), ServiceError> {
        if self.fail_on_save.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "write rejected".to_string(),
            });
        }
        self.state
            .write()
            .await
            .comments
            .insert(comment.id, comment);
        Ok(())
    }

    async fn delete(&self, id: CommentId) -> Result<bool, ServiceError> {
        Ok(self.state.write().await.comments.remove(&id).is_some())
    }
}
