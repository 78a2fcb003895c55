use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ValidationBuilder;
use crate::models::workflows::{RunWorkflowRequest, WorkflowListQuery, WorkflowRequest};
use crate::models::{ExecutionRow, WorkflowRow, EXECUTION_COLUMNS, WORKFLOW_COLUMNS};
use crate::pagination::QueryBuilder;
use crate::validation::Validated;
use crate::workflows::{
    EventSource, ExecutionRecord, TriggerType, WorkflowDefinition, WorkflowOutcome,
};
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

pub fn workflow_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_workflows).post(create_workflow))
        .route("/:id", get(get_workflow).put(update_workflow).delete(delete_workflow))
        .route("/:id/toggle", post(toggle_workflow))
        .route("/:id/run", post(run_workflow))
        .route("/:id/executions", get(list_executions))
}

/// Check the trigger, every condition and every action of a definition,
/// collecting all problems into one validation error
pub(crate) fn validate_definition(request: &WorkflowRequest) -> ApiResult<()> {
    let mut errors = ValidationBuilder::new();

    if let Err(e) = request.trigger.validate() {
        errors.push("trigger", &e);
    }
    for (i, condition) in request.conditions.iter().enumerate() {
        if let Err(e) = condition.validate() {
            errors.push(&format!("conditions[{}]", i), &e);
        }
    }
    for (i, action) in request.actions.iter().enumerate() {
        if let Err(e) = action.validate() {
            errors.push(&format!("actions[{}]", i), &e);
        }
    }

    errors.finish()
}

fn into_definition(row: WorkflowRow) -> ApiResult<WorkflowDefinition> {
    Ok(WorkflowDefinition::try_from(row)?)
}

async fn list_workflows(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<WorkflowListQuery>,
) -> ApiResult<Json<PaginatedResponse<WorkflowDefinition>>> {
    let mut builder = QueryBuilder::new();

    let trigger_type = match filter.trigger_type.as_deref() {
        Some(raw) => Some(raw.parse::<TriggerType>().map_err(|e| {
            ApiError::validation_single("trigger_type", e)
        })?),
        None => None,
    };
    if trigger_type.is_some() {
        builder.add_condition("trigger_type = {}");
    }
    if filter.is_active.is_some() {
        builder.add_condition("is_active = {}");
    }
    let where_clause = builder.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM workflows {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(trigger_type) = trigger_type {
        count_query = count_query.bind(trigger_type.as_str());
    }
    if let Some(is_active) = filter.is_active {
        count_query = count_query.bind(is_active);
    }
    let total = count_query.fetch_one(&state.db_pool).await?;

    let list_sql = format!(
        "SELECT {} FROM workflows {} ORDER BY execution_order, created_at LIMIT ${} OFFSET ${}",
        WORKFLOW_COLUMNS,
        where_clause,
        builder.next_param(),
        builder.next_param() + 1
    );
    let mut list_query = sqlx::query_as::<_, WorkflowRow>(&list_sql);
    if let Some(trigger_type) = trigger_type {
        list_query = list_query.bind(trigger_type.as_str());
    }
    if let Some(is_active) = filter.is_active {
        list_query = list_query.bind(is_active);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db_pool)
        .await?;

    let workflows = rows
        .into_iter()
        .map(into_definition)
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(PaginatedResponse::new(workflows, &params, total)))
}

async fn create_workflow(
    State(state): State<Arc<AppState>>,
    Validated(request): Validated<WorkflowRequest>,
) -> ApiResult<(StatusCode, Json<WorkflowDefinition>)> {
    validate_definition(&request)?;

    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        r#"
        INSERT INTO workflows (
            id, name, description, trigger_type, trigger_params, conditions, actions,
            is_active, execution_order, stop_on_first_match,
            max_executions_per_day, max_executions_per_candidate, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
        RETURNING {}
        "#,
        WORKFLOW_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.name.trim())
    .bind(&request.description)
    .bind(request.trigger.trigger_type.as_str())
    .bind(SqlJson(&request.trigger.params))
    .bind(SqlJson(&request.conditions))
    .bind(SqlJson(&request.actions))
    .bind(request.is_active)
    .bind(request.execution_order)
    .bind(request.stop_on_first_match)
    .bind(request.max_executions_per_day)
    .bind(request.max_executions_per_candidate)
    .bind(request.created_by)
    .fetch_one(&state.db_pool)
    .await?;

    let workflow = into_definition(row)?;
    tracing::info!(workflow_id = %workflow.id, "Workflow '{}' created for {}", workflow.name, workflow.trigger.trigger_type);

    Ok((StatusCode::CREATED, Json(workflow)))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "SELECT {} FROM workflows WHERE id = $1",
        WORKFLOW_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Workflow"))?;

    Ok(Json(into_definition(row)?))
}

/// Replace the whole definition. Counters are kept.
async fn update_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<WorkflowRequest>,
) -> ApiResult<Json<WorkflowDefinition>> {
    validate_definition(&request)?;

    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        r#"
        UPDATE workflows
        SET name = $2, description = $3, trigger_type = $4, trigger_params = $5,
            conditions = $6, actions = $7, is_active = $8, execution_order = $9,
            stop_on_first_match = $10, max_executions_per_day = $11,
            max_executions_per_candidate = $12, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        WORKFLOW_COLUMNS
    ))
    .bind(id)
    .bind(request.name.trim())
    .bind(&request.description)
    .bind(request.trigger.trigger_type.as_str())
    .bind(SqlJson(&request.trigger.params))
    .bind(SqlJson(&request.conditions))
    .bind(SqlJson(&request.actions))
    .bind(request.is_active)
    .bind(request.execution_order)
    .bind(request.stop_on_first_match)
    .bind(request.max_executions_per_day)
    .bind(request.max_executions_per_candidate)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Workflow"))?;

    Ok(Json(into_definition(row)?))
}

async fn delete_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
        .bind(id)
        .execute(&state.db_pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Workflow"));
    }

    tracing::info!(workflow_id = %id, "Workflow deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn toggle_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<WorkflowDefinition>> {
    let row = sqlx::query_as::<_, WorkflowRow>(&format!(
        "UPDATE workflows SET is_active = NOT is_active, updated_at = NOW() WHERE id = $1 RETURNING {}",
        WORKFLOW_COLUMNS
    ))
    .bind(id)
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Workflow"))?;

    let workflow = into_definition(row)?;
    tracing::info!(workflow_id = %id, is_active = workflow.is_active, "Workflow toggled");
    Ok(Json(workflow))
}

/// Run the workflow for one candidate right away and report the outcome
async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<RunWorkflowRequest>,
) -> ApiResult<Json<WorkflowOutcome>> {
    let outcome = state
        .engine
        .run_manual(id, request.candidate_id, EventSource::from_actor(request.actor_id))
        .await?;

    Ok(Json(outcome))
}

async fn list_executions(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<ExecutionRecord>>> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM workflows WHERE id = $1)")
        .bind(id)
        .fetch_one(&state.db_pool)
        .await?;
    if !exists {
        return Err(ApiError::not_found("Workflow"));
    }

    let total = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = $1")
        .bind(id)
        .fetch_one(&state.db_pool)
        .await?;

    let rows = sqlx::query_as::<_, ExecutionRow>(&format!(
        "SELECT {} FROM workflow_executions WHERE workflow_id = $1 ORDER BY started_at DESC LIMIT $2 OFFSET $3",
        EXECUTION_COLUMNS
    ))
    .bind(id)
    .bind(params.limit())
    .bind(params.offset())
    .fetch_all(&state.db_pool)
    .await?;

    let executions = rows
        .into_iter()
        .map(|row| Ok(ExecutionRecord::try_from(row)?))
        .collect::<ApiResult<Vec<_>>>()?;

    Ok(Json(PaginatedResponse::new(executions, &params, total)))
}
