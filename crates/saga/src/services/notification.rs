//! Remote notification service trait and in-memory implementation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use common::{ArticleId, CommentId, UserId};
use tokio::sync::RwLock;

use crate::error::ServiceError;

const SERVICE: &str = "notification";

/// A notification delivered by the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// An author published a new article.
    ArticlePublished {
        author_id: UserId,
        article_id: ArticleId,
    },
    /// Someone commented on an article.
    CommentAdded {
        recipient_id: UserId,
        commenter_id: UserId,
        article_id: ArticleId,
        comment_id: CommentId,
    },
}

/// Remote notification delivery. Notifications cannot be retracted.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Notifies an author's followers about a newly published article.
    async fn notify_article_published(
        &self,
        author_id: UserId,
        article_id: ArticleId,
    ) -> Result<(), ServiceError>;

    /// Notifies an article author about a new comment.
    async fn notify_comment_added(
        &self,
        recipient_id: UserId,
        commenter_id: UserId,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<(), ServiceError>;

    /// Checks that the service is reachable.
    async fn ping(&self) -> Result<(), ServiceError>;
}

/// In-memory notification service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotificationService {
    sent: Arc<RwLock<Vec<Notification>>>,
    fail_on_send: Arc<AtomicBool>,
}

impl InMemoryNotificationService {
    /// Creates a new in-memory notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures sends to fail.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.fail_on_send.store(fail, Ordering::SeqCst);
    }

    /// Returns the number of delivered notifications.
    pub async fn sent_count(&self) -> usize {
        self.sent.read().await.len()
    }

    /// Returns the delivered notifications, oldest first.
    pub async fn sent(&self) -> Vec<Notification> {
        self.sent.read().await.clone()
    }

    async fn deliver(&self, notification: Notification) -> Result<(), ServiceError> {
        if self.fail_on_send.load(Ordering::SeqCst) {
            return Err(ServiceError::Unavailable {
                service: SERVICE,
                reason: "mail gateway timeout".to_string(),
            });
        }
        self.sent.write().await.push(notification);
        Ok(())
    }
}

#[async_trait]
impl NotificationService for InMemoryNotificationService {
    async fn notify_article_published(
        &self,
        author_id: UserId,
        article_id: ArticleId,
    ) -> Result<(), ServiceError> {
        self.deliver(Notification::ArticlePublished {
            author_id,
            article_id,
        })
        .await
    }

    async fn notify_comment_added(
        &self,
        recipient_id: UserId,
        commenter_id: UserId,
        article_id: ArticleId,
        comment_id: CommentId,
    ) -> Result<(), ServiceError> {
        self.deliver(Notification::CommentAdded {
            recipient_id,
            commenter_id,
            article_id,
            comment_id,
        })
        .await
    }

    async fn ping(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
