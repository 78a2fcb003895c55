pub mod candidates;
pub mod comments;
pub mod email_templates;
pub mod notifications;
pub mod tasks;
pub mod users;
pub mod workflows;

pub use candidates::candidate_routes;
pub use comments::comment_routes;
pub use email_templates::email_template_routes;
pub use notifications::notification_routes;
pub use tasks::task_routes;
pub use users::user_routes;
pub use workflows::workflow_routes;

use axum::{extract::State, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use crate::database::{self, PoolStats};
use crate::jobs::JobExecutionLog;
use crate::AppState;

pub async fn health_check() -> (StatusCode, Json<serde_json::Value>) {
    (StatusCode::OK, Json(json!({"status": "healthy", "service": "recruit-api"})))
}

#[derive(Debug, Serialize)]
pub struct DetailedHealth {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub database: bool,
    pub pool: PoolStats,
    /// Automation events per outbox status
    pub automation_events: HashMap<String, i64>,
    pub recent_jobs: Vec<JobExecutionLog>,
}

/// Database, outbox backlog and the last scheduled job runs
pub async fn detailed_health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<DetailedHealth>) {
    let database = database::health_check(&state.db_pool).await;

    let automation_events = if database {
        sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM automation_events GROUP BY status",
        )
        .fetch_all(&state.db_pool)
        .await
        .map(|rows| rows.into_iter().collect())
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to count automation events: {}", e);
            HashMap::new()
        })
    } else {
        HashMap::new()
    };

    let recent_jobs = {
        let logs = state.job_logs.read().await;
        logs.iter().rev().take(10).cloned().collect()
    };

    let status_code = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = DetailedHealth {
        status: if database { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
        pool: PoolStats::of(&state.db_pool),
        automation_events,
        recent_jobs,
    };

    (status_code, Json(response))
}
