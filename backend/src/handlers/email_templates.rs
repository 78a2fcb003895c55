use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use recruit_shared::EmailTemplate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use crate::services::templates;
use crate::validation::Validated;
use crate::workflows::executor::candidate_document;
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

use super::candidates::load_candidate;

const TEMPLATE_COLUMNS: &str = "id, name, subject, body, created_at, updated_at";

pub fn email_template_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_templates).post(create_template))
        .route("/:id", get(get_template).put(update_template).delete(delete_template))
        .route("/:id/preview", post(preview_template))
}

#[derive(Debug, Deserialize, Validate)]
pub struct TemplateRequest {
    #[validate(length(min = 1, max = 100, message = "name must be 1-100 characters"))]
    pub name: String,
    #[validate(length(min = 1, max = 300, message = "subject must be 1-300 characters"))]
    pub subject: String,
    #[validate(length(min = 1, message = "body is required"))]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct PreviewRequest {
    pub candidate_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct TemplatePreview {
    pub subject: String,
    pub body: String,
}

/// Stand-in document used when no candidate is given
fn sample_context() -> serde_json::Value {
    serde_json::json!({
        "candidate": {
            "first_name": "Jane",
            "last_name": "Doe",
            "full_name": "Jane Doe",
            "email": "jane.doe@example.com",
            "status": "interview",
            "tags": ["sample"]
        },
        "event": {},
        "workflow": { "name": "Preview" }
    })
}

async fn list_templates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<EmailTemplate>>> {
    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM email_templates")
        .fetch_one(&state.db_pool)
        .await?;

    let items = sqlx::query_as::<_, EmailTemplate>(&format!(
        "SELECT {} FROM email_templates ORDER BY name LIMIT $1 OFFSET $2",
        TEMPLATE_COLUMNS
    ))
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db_pool)
    .await?;

    Ok(Json(PaginatedResponse::new(items, &params, total)))
}

async fn create_template(
    State(state): State<Arc<AppState>>,
    Validated(request): Validated<TemplateRequest>,
) -> ApiResult<(StatusCode, Json<EmailTemplate>)> {
    let template = sqlx::query_as::<_, EmailTemplate>(&format!(
        r#"
        INSERT INTO email_templates (id, name, subject, body, created_at)
        VALUES ($1, $2, $3, $4, NOW())
        RETURNING {}
        "#,
        TEMPLATE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.name.trim())
    .bind(&request.subject)
    .bind(&request.body)
    .fetch_one(&state.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(template)))
}

async fn fetch_template(state: &AppState, id: Uuid) -> ApiResult<EmailTemplate> {
    sqlx::query_as::<_, EmailTemplate>(&format!(
        "SELECT {} FROM email_templates WHERE id = $1",
        TEMPLATE_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Email template"))
}

async fn get_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<EmailTemplate>> {
    Ok(Json(fetch_template(&state, id).await?))
}

async fn update_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<TemplateRequest>,
) -> ApiResult<Json<EmailTemplate>> {
    let template = sqlx::query_as::<_, EmailTemplate>(&format!(
        r#"
        UPDATE email_templates
        SET name = $2, subject = $3, body = $4, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        TEMPLATE_COLUMNS
    ))
    .bind(id)
    .bind(request.name.trim())
    .bind(&request.subject)
    .bind(&request.body)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Email template"))?;

    Ok(Json(template))
}

async fn delete_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM email_templates WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Email template"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Render subject and body against a candidate, or sample data
async fn preview_template(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    request: Option<Json<PreviewRequest>>,
) -> ApiResult<Json<TemplatePreview>> {
    let template = fetch_template(&state, id).await?;
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let context = match request.candidate_id {
        Some(candidate_id) => {
            let candidate = load_candidate(&state, candidate_id).await?;
            serde_json::json!({
                "candidate": candidate_document(&candidate),
                "event": {},
                "workflow": { "name": "Preview" }
            })
        }
        None => sample_context(),
    };

    Ok(Json(TemplatePreview {
        subject: templates::render(&template.subject, &context),
        body: templates::render(&template.body, &context),
    }))
}
