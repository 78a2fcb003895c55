use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use recruit_shared::User;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::validation::Validated;
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

const USER_COLUMNS: &str = "id, name, username, email, role, created_at";
const ROLES: [&str; 3] = ["admin", "recruiter", "hiring_manager"];

pub fn user_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(list_users).post(create_user))
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 2, max = 39, message = "username must be 2-39 characters"))]
    pub username: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: String,
    pub role: Option<String>,
}

/// Usernames are what `@mentions` resolve against
fn normalize_username(raw: &str) -> ApiResult<String> {
    let username = raw.trim().to_lowercase();
    let valid = username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        && username.chars().next().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(ApiError::validation_single(
            "username",
            "username may only contain letters, digits, '_', '.' and '-'",
        ));
    }
    Ok(username)
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<User>>> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db_pool)
        .await?;

    let users = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users ORDER BY name LIMIT $1 OFFSET $2",
        USER_COLUMNS
    ))
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(users, &params, total)))
}

async fn create_user(
    State(state): State<Arc<AppState>>,
    Validated(request): Validated<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<User>)> {
    let username = normalize_username(&request.username)?;
    let role = request.role.as_deref().unwrap_or("recruiter");
    if !ROLES.contains(&role) {
        return Err(ApiError::validation_single(
            "role",
            format!("role must be one of: {}", ROLES.join(", ")),
        ));
    }

    let user = sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, name, username, email, role, created_at)
        VALUES ($1, $2, $3, $4, $5, NOW())
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.name.trim())
    .bind(&username)
    .bind(request.email.trim())
    .bind(role)
    .fetch_one(&state.db_pool)
    .await?;

    tracing::info!(user_id = %user.id, "User @{} created", user.username);
    Ok((StatusCode::CREATED, Json(user)))
}
