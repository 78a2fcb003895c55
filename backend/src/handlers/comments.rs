use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::put,
    Router,
};
use recruit_shared::Comment;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::models::candidates::ActorQuery;
use crate::services::mentions;
use crate::validation::Validated;
use crate::workflows::store::NewNotification;
use crate::workflows::{AutomationStore, EventSource, TriggerEvent};
use crate::{ApiError, ApiResult, AppState};

use super::candidates::load_candidate;

const COMMENT_COLUMNS: &str = "id, candidate_id, author_id, body, mentions, created_at, updated_at, deleted_at";

pub fn comment_routes() -> Router<Arc<AppState>> {
    Router::new().route("/:id", put(update_comment).delete(delete_comment))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CommentRequest {
    #[validate(length(min = 1, max = 10000, message = "body must be 1-10000 characters"))]
    pub body: String,
    pub author_id: Option<Uuid>,
}

/// Resolve `@handles` to user ids; unknown handles are ignored
async fn resolve_mentions(state: &AppState, body: &str) -> ApiResult<Vec<(Uuid, String)>> {
    let handles = mentions::extract_mentions(body);
    if handles.is_empty() {
        return Ok(Vec::new());
    }

    let users = sqlx::query_as::<_, (Uuid, String)>(
        "SELECT id, username FROM users WHERE lower(username) = ANY($1)",
    )
    .bind(&handles)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(users)
}

async fn notify_mentioned(
    state: &AppState,
    comment: &Comment,
    users: &[(Uuid, String)],
    candidate_name: &str,
) {
    for (user_id, username) in users {
        if Some(*user_id) == comment.author_id {
            continue;
        }
        let notification = NewNotification {
            user_id: *user_id,
            title: format!("You were mentioned on {}", candidate_name),
            message: comment.body.chars().take(200).collect(),
            notification_type: "mention".to_string(),
            entity_type: Some("candidate".to_string()),
            entity_id: Some(comment.candidate_id),
        };
        if let Err(e) = state.store.create_notification(notification).await {
            tracing::warn!(comment_id = %comment.id, "Failed to notify @{}: {}", username, e);
        }
    }
}

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Comment>>> {
    load_candidate(&state, candidate_id).await?;

    let comments = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {} FROM comments WHERE candidate_id = $1 AND deleted_at IS NULL ORDER BY created_at",
        COMMENT_COLUMNS
    ))
    .bind(candidate_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(comments))
}

pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
    Validated(request): Validated<CommentRequest>,
) -> ApiResult<(StatusCode, Json<Comment>)> {
    let candidate = load_candidate(&state, candidate_id).await?;

    let body = request.body.trim().to_string();
    let mentioned = resolve_mentions(&state, &body).await?;
    let mention_ids: Vec<Uuid> = mentioned.iter().map(|(id, _)| *id).collect();

    let comment = sqlx::query_as::<_, Comment>(&format!(
        r#"
        INSERT INTO comments (id, candidate_id, author_id, body, mentions, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        RETURNING {}
        "#,
        COMMENT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(candidate_id)
    .bind(request.author_id)
    .bind(&body)
    .bind(&mention_ids)
    .fetch_one(&state.db_pool)
    .await?;

    notify_mentioned(&state, &comment, &mentioned, &candidate.full_name()).await;

    state
        .automation
        .dispatch(TriggerEvent::comment_added(
            candidate_id,
            comment.id,
            &mention_ids,
            EventSource::from_actor(request.author_id),
        ))
        .await;

    Ok((StatusCode::CREATED, Json(comment)))
}

/// Edit a comment; only users mentioned for the first time are notified
async fn update_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<CommentRequest>,
) -> ApiResult<Json<Comment>> {
    let existing = sqlx::query_as::<_, Comment>(&format!(
        "SELECT {} FROM comments WHERE id = $1 AND deleted_at IS NULL",
        COMMENT_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Comment"))?;

    let body = request.body.trim().to_string();
    let mentioned = resolve_mentions(&state, &body).await?;
    let mention_ids: Vec<Uuid> = mentioned.iter().map(|(id, _)| *id).collect();

    let comment = sqlx::query_as::<_, Comment>(&format!(
        "UPDATE comments SET body = $2, mentions = $3, updated_at = NOW() WHERE id = $1 RETURNING {}",
        COMMENT_COLUMNS
    ))
    .bind(id)
    .bind(&body)
    .bind(&mention_ids)
    .fetch_one(&state.db_pool)
    .await?;

    let newly_mentioned: Vec<(Uuid, String)> = mentioned
        .into_iter()
        .filter(|(user_id, _)| !existing.mentions.contains(user_id))
        .collect();
    if !newly_mentioned.is_empty() {
        let candidate = load_candidate(&state, comment.candidate_id).await?;
        notify_mentioned(&state, &comment, &newly_mentioned, &candidate.full_name()).await;
    }

    Ok(Json(comment))
}

async fn delete_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("UPDATE comments SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Comment"));
    }

    tracing::info!(comment_id = %id, actor_id = ?actor.actor_id, "Comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
