//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use saga::{InMemorySagaStateStore, PostgresSagaStateStore, RetryExecutor, SagaStateStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let (json, pretty) = match config.log_format {
        LogFormat::Json => (Some(tracing_subscriber::fmt::layer().json()), None),
        LogFormat::Pretty => (None, Some(tracing_subscriber::fmt::layer())),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(pretty)
        .init();
}

async fn create_store(config: &Config) -> Arc<dyn SagaStateStore> {
    match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .expect("failed to connect to PostgreSQL");
            let store = PostgresSagaStateStore::new(pool);
            store
                .run_migrations()
                .await
                .expect("failed to run saga state migrations");
            tracing::info!("using PostgreSQL saga state store");
            Arc::new(store)
        }
        None => {
            tracing::info!("DATABASE_URL not set, using in-memory saga state store");
            Arc::new(InMemorySagaStateStore::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env();
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Build the orchestrator and register the sagas
    let store = create_store(&config).await;
    let retry = RetryExecutor::new(config.retry.clone());
    let state = api::create_default_state(store, retry.clone())
        .expect("failed to register saga definitions");

    // 4. Make sure collaborators are reachable before accepting traffic
    api::check_collaborators(&state.collaborators, &retry)
        .await
        .expect("collaborator connectivity check failed");

    // 5. Start the maintenance loop
    let maintenance = tokio::spawn(api::maintenance::run_loop(
        state.orchestrator.clone(),
        config.sweep_interval,
        api::maintenance::MaintenanceSettings::from(&config),
    ));

    // 6. Build the application and start the server
    let app = api::create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    maintenance.abort();
    tracing::info!("server shut down gracefully");
}
