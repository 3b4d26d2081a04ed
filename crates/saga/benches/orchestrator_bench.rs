use std::sync::Arc;

use async_trait::async_trait;
use common::UserId;
use criterion::{Criterion, criterion_group, criterion_main};
use saga::services::{
    Article, ArticleRepository, InMemoryArticleRepository, InMemoryNotificationService,
    InMemoryStatisticsService,
};
use saga::workflows::{PUBLISH_ARTICLE, publish_article};
use saga::{SagaContext, SagaDefinition, SagaOrchestrator, SagaStep, StepError, StepResult};

struct CounterStep {
    name: String,
    fail: bool,
}

#[async_trait]
impl SagaStep for CounterStep {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &mut SagaContext) -> StepResult {
        if self.fail {
            return Err(StepError::failed(&self.name, "rejected"));
        }
        let count: u64 = ctx.get("count").unwrap_or(0);
        ctx.insert("count", count + 1);
        Ok(())
    }

    async fn compensate(&self, ctx: &mut SagaContext) -> StepResult {
        let count: u64 = ctx.get("count").unwrap_or(0);
        ctx.insert("count", count.saturating_sub(1));
        Ok(())
    }
}

fn orchestrator_with(name: &str, steps: usize, fail_last: bool) -> SagaOrchestrator {
    let orchestrator = SagaOrchestrator::in_memory();
    let mut builder = SagaDefinition::builder(name);
    for i in 0..steps {
        builder = builder.step(CounterStep {
            name: format!("step_{i}"),
            fail: fail_last && i == steps - 1,
        });
    }
    orchestrator.register_saga(builder.build().unwrap()).unwrap();
    orchestrator
}

fn bench_successful_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = orchestrator_with("ten-steps", 10, false);

    c.bench_function("orchestrator/execute_10_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = orchestrator
                    .execute("ten-steps", SagaContext::new())
                    .await
                    .unwrap();
                assert!(result.success);
            });
        });
    });
}

fn bench_compensated_saga(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let orchestrator = orchestrator_with("ten-steps-failing", 10, true);

    c.bench_function("orchestrator/execute_and_compensate_10_steps", |b| {
        b.iter(|| {
            rt.block_on(async {
                let result = orchestrator
                    .execute("ten-steps-failing", SagaContext::new())
                    .await
                    .unwrap();
                assert!(!result.success);
            });
        });
    });
}

fn bench_publish_article(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let articles = InMemoryArticleRepository::new();
    let orchestrator = SagaOrchestrator::in_memory();
    orchestrator
        .register_saga(
            publish_article::definition(
                Arc::new(articles.clone()),
                Arc::new(InMemoryStatisticsService::new()),
                Arc::new(InMemoryNotificationService::new()),
            )
            .unwrap(),
        )
        .unwrap();
    let author = UserId::new();

    c.bench_function("workflows/publish_article", |b| {
        b.iter(|| {
            rt.block_on(async {
                let article = Article::draft(author, "Benchmarked");
                let article_id = article.id;
                articles.save(article).await.unwrap();
                let result = orchestrator
                    .execute(PUBLISH_ARTICLE, publish_article::initial_context(article_id))
                    .await
                    .unwrap();
                assert!(result.success);
            });
        });
    });
}

criterion_group!(
    benches,
    bench_successful_saga,
    bench_compensated_saga,
    bench_publish_article
);
criterion_main!(benches);
