//! Publish-article saga: draft to published, author statistics, follower
//! notification.
//!
//! | order | step                      | criticality | compensation              |
//! |-------|---------------------------|-------------|---------------------------|
//! | 1     | `publish_article`         | critical    | warn, flag incomplete     |
//! | 2     | `increment_article_count` | critical    | decrement                 |
//! | 3     | `notify_followers`        | best-effort | none                      |
//!
//! Publishing is a one-way transition: there is no path back to draft, so
//! compensating step 1 only logs a warning and sets
//! [`ARTICLE_ROLLBACK_INCOMPLETE`].

use std::sync::Arc;

use async_trait::async_trait;
use common::{ArticleId, UserId};

use crate::context::SagaContext;
use crate::definition::SagaDefinition;
use crate::error::{Result, ServiceError, StepError, StepResult};
use crate::services::{ArticleRepository, ArticleStatus, NotificationService, StatisticsService};
use crate::step::{Criticality, SagaStep};
use crate::workflows::record_notification;

/// Registered saga name.
pub const PUBLISH_ARTICLE: &str = "publish-article";

/// Input: the article to publish.
pub const ARTICLE_ID: &str = "article_id";
/// Written by `publish_article`: the article's author.
pub const AUTHOR_ID: &str = "author_id";
/// Written by `publish_article`: status before publishing.
pub const PREVIOUS_STATUS: &str = "previous_status";
/// Written by `increment_article_count`: the author's new article count.
pub const AUTHOR_ARTICLE_COUNT: &str = "author_article_count";
/// Written by the `publish_article` compensation.
pub const ARTICLE_ROLLBACK_INCOMPLETE: &str = "article_rollback_incomplete";

/// Builds the initial context for a publish-article run.
pub fn initial_context(article_id: ArticleId) -> SagaContext {
    SagaContext::new().with(ARTICLE_ID, article_id)
}

/// Builds the publish-article definition over the given collaborators.
pub fn definition(
    articles: Arc<dyn ArticleRepository>,
    statistics: Arc<dyn StatisticsService>,
    notifications: Arc<dyn NotificationService>,
) -> Result<SagaDefinition> {
    SagaDefinition::builder(PUBLISH_ARTICLE)
        .step(PublishArticleStep { articles })
        .step(IncrementArticleCountStep { statistics })
        .step(NotifyFollowersStep { notifications })
        .build()
}

/// Moves the article from draft to published.
pub struct PublishArticleStep {
    articles: Arc<dyn ArticleRepository>,
}

#[async_trait]
impl SagaStep for PublishArticleStep {
    fn name(&self) -> &str {
        "publish_article"
    }

    fn order(&self) -> i32 {
        1
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let mut article = self
            .articles
            .find(article_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound {
                service: "article",
                entity: format!("article {article_id}"),
            })?;

        if article.status == ArticleStatus::Published {
            return Err(StepError::fatal(
                self.name(),
                format!("Article {article_id} is already published"),
            ));
        }

        ctx.insert(PREVIOUS_STATUS, article.status);
        ctx.insert(AUTHOR_ID, article.author_id);

        article.status = ArticleStatus::Published;
        self.articles.save(article).await?;

        tracing::info!(%article_id, "article published");
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult {
        let article_id: Option<ArticleId> = ctx.get(ARTICLE_ID);
        tracing::warn!(
            article_id = ?article_id,
            "cannot automatically roll back a published article to draft"
        );
        ctx.insert(ARTICLE_ROLLBACK_INCOMPLETE, true);
        Ok(())
    }
}

/// Increments the author's published article count.
pub struct IncrementArticleCountStep {
    statistics: Arc<dyn StatisticsService>,
}

#[async_trait]
impl SagaStep for IncrementArticleCountStep {
    fn name(&self) -> &str {
        "increment_article_count"
    }

    fn order(&self) -> i32 {
        2
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let author_id: UserId = ctx.require(AUTHOR_ID)?;
        let count = self.statistics.increment_article_count(author_id).await?;
        ctx.insert(AUTHOR_ARTICLE_COUNT, count);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult {
        let author_id: UserId = ctx.require(AUTHOR_ID)?;
        let count = self.statistics.decrement_article_count(author_id).await?;
        ctx.insert(AUTHOR_ARTICLE_COUNT, count);
        Ok(())
    }
}

/// Notifies the author's followers. Failure does not fail the saga.
pub struct NotifyFollowersStep {
    notifications: Arc<dyn NotificationService>,
}

#[async_trait]
impl SagaStep for NotifyFollowersStep {
    fn name(&self) -> &str {
        "notify_followers"
    }

    fn order(&self) -> i32 {
        3
    }

    fn criticality(&self) -> Criticality {
        Criticality::BestEffort
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        let author_id: UserId = ctx.require(AUTHOR_ID)?;
        let article_id: ArticleId = ctx.require(ARTICLE_ID)?;
        let outcome = self
            .notifications
            .notify_article_published(author_id, article_id)
            .await;
        record_notification(ctx, self.name(), outcome)
    }

    // Notifications cannot be retracted.
    async fn compensate(&self, _ctx: &mut SagaContext) -> StepResult {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        Article, InMemoryArticleRepository, InMemoryNotificationService,
        InMemoryStatisticsService,
    };

    #[test]
    fn test_definition_step_order() {
        let def = definition(
            Arc::new(InMemoryArticleRepository::new()),
            Arc::new(InMemoryStatisticsService::new()),
            Arc::new(InMemoryNotificationService::new()),
        )
        .unwrap();

        assert_eq!(def.name(), PUBLISH_ARTICLE);
        assert_eq!(
            def.step_names(),
            vec!["publish_article", "increment_article_count", "notify_followers"]
        );
        assert_eq!(def.steps()[2].criticality(), Criticality::BestEffort);
    }

    #[tokio::test]
    async fn test_publish_records_previous_status_and_author() {
        let articles = InMemoryArticleRepository::new();
        let author = UserId::new();
        let article = Article::draft(author, "Sagas in practice");
        let article_id = article.id;
        articles.save(article).await.unwrap();

        let step = PublishArticleStep {
            articles: Arc::new(articles.clone()),
        };
        let mut ctx = initial_context(article_id);
        step.execute(&mut ctx).await.unwrap();

        assert_eq!(ctx.get::<ArticleStatus>(PREVIOUS_STATUS), Some(ArticleStatus::Draft));
        assert_eq!(ctx.get::<UserId>(AUTHOR_ID), Some(author));
        let stored = articles.find(article_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ArticleStatus::Published);
    }

    #[tokio::test]
    async fn test_publishing_twice_is_fatal() {
        let articles = InMemoryArticleRepository::new();
        let mut article = Article::draft(UserId::new(), "Already out");
        article.status = ArticleStatus::Published;
        let article_id = article.id;
        articles.save(article).await.unwrap();

        let step = PublishArticleStep {
            articles: Arc::new(articles),
        };
        let err = step.execute(&mut initial_context(article_id)).await.unwrap_err();
        assert!(matches!(err, StepError::Fatal { .. }));
    }

    #[tokio::test]
    async fn test_missing_article_fails() {
        let step = PublishArticleStep {
            articles: Arc::new(InMemoryArticleRepository::new()),
        };
        let err = step
            .execute(&mut initial_context(ArticleId::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Service(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_compensation_flags_incomplete_rollback() {
        let step = PublishArticleStep {
            articles: Arc::new(InMemoryArticleRepository::new()),
        };
        let mut ctx = initial_context(ArticleId::new());
        step.compensate(&mut ctx).await.unwrap();
        assert_eq!(ctx.get::<bool>(ARTICLE_ROLLBACK_INCOMPLETE), Some(true));
    }

    #[tokio::test]
    async fn test_notification_failure_is_recorded_in_context() {
        let notifications = InMemoryNotificationService::new();
        notifications.set_fail_on_send(true);
        let step = NotifyFollowersStep {
            notifications: Arc::new(notifications),
        };
        let mut ctx = initial_context(ArticleId::new()).with(AUTHOR_ID, UserId::new());

        assert!(step.execute(&mut ctx).await.is_err());
        assert_eq!(ctx.get::<bool>(crate::workflows::NOTIFICATION_SENT), Some(false));
        assert!(ctx.get::<String>(crate::workflows::NOTIFICATION_ERROR).is_some());
    }
}
