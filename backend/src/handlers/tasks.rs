use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use recruit_shared::Task;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::pagination::QueryBuilder;
use crate::validation::Validated;
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

use super::candidates::load_candidate;

const TASK_COLUMNS: &str = "id, candidate_id, title, description, assignee_id, priority, status, \
     due_at, workflow_id, created_at, updated_at, completed_at";

const PRIORITIES: [&str; 3] = ["low", "normal", "high"];
const STATUSES: [&str; 2] = ["open", "done"];

pub fn task_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks).post(create_task))
        .route("/:id", axum::routing::put(update_task).delete(delete_task))
        .route("/:id/complete", post(complete_task))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateTaskRequest {
    pub candidate_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub priority: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200, message = "title must be 1-200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub priority: Option<String>,
    pub status: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub assignee_id: Option<Uuid>,
    pub candidate_id: Option<Uuid>,
    pub status: Option<String>,
    pub priority: Option<String>,
}

fn check_choice(field: &str, value: Option<&str>, allowed: &[&str]) -> ApiResult<()> {
    match value {
        Some(v) if !allowed.contains(&v) => Err(ApiError::validation_single(
            field,
            format!("{} must be one of: {}", field, allowed.join(", ")),
        )),
        _ => Ok(()),
    }
}

async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<TaskListQuery>,
) -> ApiResult<Json<PaginatedResponse<Task>>> {
    check_choice("status", filter.status.as_deref(), &STATUSES)?;
    check_choice("priority", filter.priority.as_deref(), &PRIORITIES)?;

    let mut builder = QueryBuilder::new();
    let mut uuid_binds: Vec<Uuid> = Vec::new();
    let mut text_binds: Vec<String> = Vec::new();

    // uuid filters first so placeholders line up with the bind order below
    if let Some(assignee_id) = filter.assignee_id {
        builder.add_condition("assignee_id = {}");
        uuid_binds.push(assignee_id);
    }
    if let Some(candidate_id) = filter.candidate_id {
        builder.add_condition("candidate_id = {}");
        uuid_binds.push(candidate_id);
    }
    if let Some(status) = filter.status {
        builder.add_condition("status = {}");
        text_binds.push(status);
    }
    if let Some(priority) = filter.priority {
        builder.add_condition("priority = {}");
        text_binds.push(priority);
    }
    let where_clause = builder.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM tasks {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for id in &uuid_binds {
        count_query = count_query.bind(id);
    }
    for value in &text_binds {
        count_query = count_query.bind(value);
    }
    let total = count_query.fetch_one(&state.db_pool).await?;

    let list_sql = format!(
        "SELECT {} FROM tasks {} ORDER BY due_at ASC NULLS LAST, created_at DESC LIMIT ${} OFFSET ${}",
        TASK_COLUMNS,
        where_clause,
        builder.next_param(),
        builder.next_param() + 1
    );
    let mut list_query = sqlx::query_as::<_, Task>(&list_sql);
    for id in &uuid_binds {
        list_query = list_query.bind(id);
    }
    for value in &text_binds {
        list_query = list_query.bind(value);
    }
    let tasks = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db_pool)
        .await?;

    Ok(Json(PaginatedResponse::new(tasks, &params, total)))
}

pub async fn list_candidate_tasks(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<Uuid>,
) -> ApiResult<Json<Vec<Task>>> {
    load_candidate(&state, candidate_id).await?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {} FROM tasks WHERE candidate_id = $1 ORDER BY status, due_at ASC NULLS LAST",
        TASK_COLUMNS
    ))
    .bind(candidate_id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(tasks))
}

async fn create_task(
    State(state): State<Arc<AppState>>,
    Validated(request): Validated<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    check_choice("priority", request.priority.as_deref(), &PRIORITIES)?;
    if let Some(candidate_id) = request.candidate_id {
        load_candidate(&state, candidate_id).await?;
    }

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        INSERT INTO tasks (id, candidate_id, title, description, assignee_id, priority, status, due_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'open', $7, NOW())
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.candidate_id)
    .bind(request.title.trim())
    .bind(&request.description)
    .bind(request.assignee_id)
    .bind(request.priority.as_deref().unwrap_or("normal"))
    .bind(request.due_at)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<UpdateTaskRequest>,
) -> ApiResult<Json<Task>> {
    check_choice("priority", request.priority.as_deref(), &PRIORITIES)?;
    check_choice("status", request.status.as_deref(), &STATUSES)?;

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks
        SET title = COALESCE($2, title),
            description = COALESCE($3, description),
            assignee_id = COALESCE($4, assignee_id),
            priority = COALESCE($5, priority),
            status = COALESCE($6, status),
            due_at = COALESCE($7, due_at),
            completed_at = CASE
                WHEN $6 = 'done' AND status <> 'done' THEN NOW()
                WHEN $6 = 'open' THEN NULL
                ELSE completed_at
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(id)
    .bind(request.title.as_deref().map(str::trim))
    .bind(&request.description)
    .bind(request.assignee_id)
    .bind(&request.priority)
    .bind(&request.status)
    .bind(request.due_at)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Task"))?;

    Ok(Json(task))
}

async fn complete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Task>> {
    let task = sqlx::query_as::<_, Task>(&format!(
        r#"
        UPDATE tasks
        SET status = 'done', completed_at = COALESCE(completed_at, NOW()), updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TASK_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Task"))?;

    Ok(Json(task))
}

async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM tasks WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Task"));
    }
    Ok(StatusCode::NO_CONTENT)
}
