//! Publish-comment saga: create the comment, bump the article's comment
//! count, notify the article author.
//!
//! | order | step                      | criticality | compensation   |
//! |-------|---------------------------|-------------|----------------|
//! | 1     | `create_comment`          | critical    | delete comment |
//! | 2     | `increment_comment_count` | critical    | decrement      |
//! | 3     | `notify_article_author`   | best-effort | none           |

use std::sync::Arc;

use async_trait::async_trait;
use common::{ArticleId, CommentId, UserId};

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::{Result, ServiceError, StepResult};
use crate::services::{
    ArticleRepository, Comment, CommentRepository, NotificationService, StatisticsService,
};
use crate::step::{Criticality, SagaStep};
use crate::workflows::{record_notification, skip_notification};

/// Registered saga name.
pub const PUBLISH_COMMENT: &str = "publish-comment";

/// Input: the article being commented on.
pub const ARTICLE_ID: &str = "article_id";
/// Input: the comment author.
pub const COMMENTER_ID: &str = "commenter_id";
/// Input: the comment text.
pub const BODY: &str = "body";
/// Written by `create_comment`: the new comment.
pub const COMMENT_ID: &str = "comment_id";
/// Written by `create_comment`: the author of the commented article.
pub const ARTICLE_AUTHOR_ID: &str = "article_author_id";
/// Written by `increment_comment_count`: the article's new comment count.
pub const ARTICLE_COMMENT_COUNT: &str = "article_comment_count";

/// Builds the initial context for a publish-comment run.
pub fn initial_context(
    article_id: ArticleId,
    commenter_id: UserId,
    body: impl Into<String>,
) -> SagaContext {
    SagaContext::new()
        .with(ARTICLE_ID, article_id)
        .with(COMMENTER_ID, commenter_id)
        .with(BODY, body.into())
}

/// Builds the publish-comment definition over the given collaborators.
pub fn definition(
    articles: Arc<dyn ArticleRepository>,
    comments: Arc<dyn CommentRepository>,
    statistics: Arc<dyn StatisticsService>,
    notifications: Arc<dyn NotificationService>,
) -> Result<SagaDefinition> {
    SagaDefinition::builder(PUBLISH_COMMENT)
        .step(CreateCommentStep { articles, comments })
        .step(IncrementCommentCountStep { statistics })
        .step(NotifyArticleAuthorStep { notifications })
        .build()
}

/// Stores the comment after checking the article exists.
pub struct CreateCommentStep {
    articles: Arc<dyn ArticleRepository>,
    comments: Arc<dyn CommentRepository>,
}

#[async_trait]
impl SagaStep for CreateCommentStep {
    fn name(&self) -> &str {
        "create_comment"
    }

    fn order(&self) -> i32 {
        1
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let commenter_id: UserId = ctx.require(COMMENTER_ID)?;
        let body: String = ctx.require(BODY)?;

        let article = self
            .articles
            .find(article_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                service: "article",
                entity: format!("article {article_id}"),
            })?;
        ctx.insert(ARTICLE_AUTHOR_ID, article.author_id);

        let comment = Comment::new(article_id, commenter_id, body);
        let comment_id = comment.id;
        self.comments.save(comment).await?;
        ctx.insert(COMMENT_ID, comment_id);

        tracing::info!(%article_id, %comment_id, "comment created");
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult {
        let Some(comment_id) = ctx.get::<CommentId>(COMMENT_ID) else {
            return Ok(());
        };
        if self.comments.delete(comment_id).await? {
            tracing::info!(%comment_id, "comment deleted during compensation");
        }
        Ok(())
    }
}

/// Increments the article's comment count.
pub struct IncrementCommentCountStep {
    statistics: Arc<dyn StatisticsService>,
}

#[async_trait]
impl SagaStep for IncrementCommentCountStep {
    fn name(&self) -> &str {
        "increment_comment_count"
    }

    fn order(&self) -> i32 {
        2
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let count = self.statistics.increment_comment_count(article_id).await?;
        ctx.insert(ARTICLE_COMMENT_COUNT, count);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult {
        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let count = self.statistics.decrement_comment_count(article_id).await?;
        ctx.insert(ARTICLE_COMMENT_COUNT, count);
        Ok(())
    }
}

/// Tells the article author about the new comment, unless they wrote it.
pub struct NotifyArticleAuthorStep {
    notifications: Arc<dyn NotificationService>,
}

#[async_trait]
impl SagaStep for NotifyArticleAuthorStep {
    fn name(&self) -> &str {
        "notify_article_author"
    }

    fn order(&self) -> i32 {
        3
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let recipient_id: UserId = ctx.require(ARTICLE_AUTHOR_ID)?;
        let commenter_id: UserId = ctx.require(COMMENTER_ID)?;

        if recipient_id == commenter_id {
            tracing::debug!(%recipient_id, "author commented on own article, skipping notification");
            skip_notification(ctx);
            return Ok(());
        }

        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let comment_id: CommentId = ctx.require(COMMENT_ID)?;
        let outcome = self
            .notifications
            .notify_comment_added(recipient_id, commenter_id, article_id, comment_id)
            .await;
        record_notification(ctx, self.name(), outcome)
    }

    // Notifications cannot be retracted.
    async fn compensate(&self, _ctx: &mut SagaContext) -> StepResult {
        Ok(())
    }
}
