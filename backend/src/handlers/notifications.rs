use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{delete, get, post},
    Router,
};
use recruit_shared::Notification;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

const NOTIFICATION_COLUMNS: &str =
    "id, user_id, title, message, notification_type, entity_type, entity_id, read, created_at";

pub fn notification_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/unread-count", get(unread_count))
        .route("/read-all", post(mark_all_read))
        .route("/:id/read", post(mark_read))
        .route("/:id", delete(delete_notification))
}

#[derive(Debug, Deserialize)]
pub struct NotificationQuery {
    pub user_id: Uuid,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub unread: i64,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
    Query(query): Query<NotificationQuery>,
) -> ApiResult<Json<PaginatedResponse<Notification>>> {
    let total = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND (NOT $2 OR NOT read)",
    )
    .bind(query.user_id)
    .bind(query.unread_only)
    .fetch_one(&state.db_pool)
    .await?;

    let notifications = sqlx::query_as::<_, Notification>(&format!(
        r#"
        SELECT {} FROM notifications
        WHERE user_id = $1 AND (NOT $2 OR NOT read)
        ORDER BY created_at DESC
        LIMIT $3 OFFSET $4
        "#,
        NOTIFICATION_COLUMNS
    ))
    .bind(query.user_id)
    .bind(query.unread_only)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(notifications, &params, total)))
}

async fn unread_count(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<UnreadCount>> {
    let unread = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT read",
    )
    .bind(query.user_id)
    .fetch_one(&state.db_pool)
    .await?;

    Ok(Json(UnreadCount { unread }))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UserQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let result = sqlx::query("UPDATE notifications SET read = TRUE WHERE user_id = $1 AND NOT read")
        .bind(query.user_id)
        .execute(&state.db_pool)
        .await?;

    Ok(Json(serde_json::json!({ "updated": result.rows_affected() })))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Notification>> {
    let notification = sqlx::query_as::<_, Notification>(&format!(
        "UPDATE notifications SET read = TRUE WHERE id = $1 RETURNING {}",
        NOTIFICATION_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Notification"))?;

    Ok(Json(notification))
}

async fn delete_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Notification"));
    }
    Ok(StatusCode::NO_CONTENT)
}
