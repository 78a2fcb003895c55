use axum::{
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tokio::sync::{Notify, RwLock};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod database;
mod error;
mod handlers;
mod jobs;
mod models;
mod pagination;
mod services;
mod validation;
mod workflows;

pub use error::{ApiError, ApiResult, AppError};
pub use pagination::{PaginatedResponse, PaginationParams};


use config::AutomationConfig;
use jobs::{JobLogs, JobScheduler};
use workflows::{AutomationDispatcher, AutomationWorker, PgStore, WorkflowEngine, WorkflowExecutor};

pub struct AppState {
    pub db_pool: sqlx::PgPool,
    pub store: PgStore,
    pub automation: AutomationDispatcher,
    pub engine: WorkflowEngine,
    pub job_logs: JobLogs,
}

impl AppState {
    /// Wire the automation stack around one pool. The worker is returned for
    /// the caller to spawn.
    pub fn new(db_pool: sqlx::PgPool, config: &AutomationConfig) -> (Self, AutomationWorker) {
        let store = PgStore::new(db_pool.clone());
        let shared = Arc::new(store.clone());
        let wake = Arc::new(Notify::new());

        let executor = WorkflowExecutor::new(shared.clone(), config.webhook_timeout);
        let engine = WorkflowEngine::new(shared.clone(), executor);
        let automation = AutomationDispatcher::new(shared.clone(), wake.clone());
        let worker = AutomationWorker::new(shared, engine.clone(), wake, config.clone());

        let state = Self {
            db_pool,
            store,
            automation,
            engine,
            job_logs: Arc::new(RwLock::new(Vec::new())),
        };
        (state, worker)
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/", get(|| async { "Recruit API v0.1.0" }))
        .route("/health", get(handlers::health_check))
        .route("/health/detailed", get(handlers::detailed_health_check))
        .nest("/api/v1/candidates", handlers::candidate_routes())
        .nest("/api/v1/workflows", handlers::workflow_routes())
        .nest("/api/v1/tasks", handlers::task_routes())
        .nest("/api/v1/notifications", handlers::notification_routes())
        .nest("/api/v1/comments", handlers::comment_routes())
        .nest("/api/v1/email-templates", handlers::email_template_routes())
        .nest("/api/v1/users", handlers::user_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("recruit_backend=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    let db_pool = database::connect(&config.database).await?;

    database::migrate(&db_pool).await?;

    let (state, worker) = AppState::new(db_pool, &config.automation);
    let app_state = Arc::new(state);

    tokio::spawn(worker.start());

    let mut scheduler = JobScheduler::new(
        app_state.store.clone(),
        app_state.automation.clone(),
        config.jobs.clone(),
        app_state.job_logs.clone(),
    )
    .await?;
    scheduler.start().await?;

    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.server_addr).await?;
    tracing::info!("Server running on {}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown().await?;

    Ok(())
}
