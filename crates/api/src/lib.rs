//! HTTP service hosting the saga orchestrator.
//!
//! Wires the orchestrator to its collaborators, registers the reference
//! sagas, and exposes a small HTTP surface for triggering runs and
//! inspecting executions, audit logs and in-flight transactions. Structured
//! logging goes through `tracing` and metrics are exported for Prometheus.

pub mod config;
pub mod error;
pub mod maintenance;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::services::{
    ArticleRepository, CommentRepository, InMemoryArticleRepository, InMemoryCommentRepository,
    InMemoryNotificationService, InMemoryStatisticsService, NotificationService,
    StatisticsService,
};
use saga::workflows::{publish_article, publish_comment};
use saga::{
    AuditLogger, RetryError, RetryExecutor, SagaError, SagaOrchestrator, SagaRegistry,
    SagaStateStore, StepError, TransactionMonitor,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Collaborators the reference sagas talk to.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub articles: InMemoryArticleRepository,
    pub comments: InMemoryCommentRepository,
    pub statistics: InMemoryStatisticsService,
    pub notifications: InMemoryNotificationService,
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Arc<SagaOrchestrator>,
    pub collaborators: Collaborators,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/articles", post(routes::articles::create))
        .route("/articles/{id}", get(routes::articles::get))
        .route("/sagas", get(routes::sagas::list))
        .route("/sagas/{name}/execute", post(routes::sagas::execute))
        .route("/executions", get(routes::executions::list))
        .route("/executions/active", get(routes::executions::active))
        .route("/executions/{id}", get(routes::executions::get))
        .route("/executions/{id}/audit", get(routes::executions::audit))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the orchestrator over `store` and registers the reference sagas.
pub fn create_default_state(
    store: Arc<dyn SagaStateStore>,
    retry: RetryExecutor,
) -> Result<Arc<AppState>, SagaError> {
    let collaborators = Collaborators::default();

    let orchestrator = SagaOrchestrator::new(
        SagaRegistry::new(),
        store,
        TransactionMonitor::default(),
        AuditLogger::default(),
        retry,
    );

    orchestrator.register_saga(publish_article::definition(
        Arc::new(collaborators.articles.clone()),
        Arc::new(collaborators.statistics.clone()),
        Arc::new(collaborators.notifications.clone()),
    )?)?;
    orchestrator.register_saga(publish_comment::definition(
        Arc::new(collaborators.articles.clone()),
        Arc::new(collaborators.comments.clone()),
        Arc::new(collaborators.statistics.clone()),
        Arc::new(collaborators.notifications.clone()),
    )?)?;

    Ok(Arc::new(AppState {
        orchestrator: Arc::new(orchestrator),
        collaborators,
    }))
}

/// Pings every collaborator through the retry executor.
///
/// Fails with the first collaborator that stays unreachable after the
/// configured number of attempts.
pub async fn check_collaborators(
    collaborators: &Collaborators,
    retry: &RetryExecutor,
) -> Result<(), RetryError> {
    retry
        .execute_with_default_retry("ping_articles", || async {
            collaborators.articles.ping().await.map_err(StepError::from)
        })
        .await?;
    retry
        .execute_with_default_retry("ping_comments", || async {
            collaborators.comments.ping().await.map_err(StepError::from)
        })
        .await?;
    retry
        .execute_with_default_retry("ping_statistics", || async {
            collaborators.statistics.ping().await.map_err(StepError::from)
        })
        .await?;
    retry
        .execute_with_default_retry("ping_notifications", || async {
            collaborators.notifications.ping().await.map_err(StepError::from)
        })
        .await?;

    tracing::info!("all collaborators reachable");
    Ok(())
}
