use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::Utc;
use recruit_shared::{Activity, Candidate, CandidateNote, CandidateStatus, ProcessPlacement, QuickScore};
use sqlx::types::Json as SqlJson;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::candidates::{
    ActorQuery, AddNoteRequest, AddScoreRequest, CandidateListQuery, ChangeStatusRequest,
    CreateCandidateRequest, MoveStageRequest, TagRequest, UpdateCandidateRequest,
};
use crate::models::{CandidateRow, CANDIDATE_COLUMNS};
use crate::pagination::QueryBuilder;
use crate::services::{pipeline, privacy};
use crate::validation::{self, Validated};
use crate::workflows::{AutomationStore, EventSource, TriggerEvent};
use crate::{ApiError, ApiResult, AppState, PaginatedResponse, PaginationParams};

use super::comments::{create_comment, list_comments};
use super::tasks::list_candidate_tasks;

pub fn candidate_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_candidates).post(create_candidate))
        .route("/:id", get(get_candidate).put(update_candidate).delete(delete_candidate))
        .route("/:id/status", put(change_status))
        .route("/:id/stage", put(move_stage))
        .route("/:id/tags", post(add_tag))
        .route("/:id/tags/:tag", axum::routing::delete(remove_tag))
        .route("/:id/notes", post(add_note))
        .route("/:id/scores", post(add_score))
        .route("/:id/activities", get(list_activities))
        .route("/:id/anonymize", post(anonymize_candidate))
        .route("/:id/comments", get(list_comments).post(create_comment))
        .route("/:id/tasks", get(list_candidate_tasks))
}

/// Load a live candidate; soft-deleted candidates are reported as missing
pub(crate) async fn load_candidate(state: &AppState, id: Uuid) -> ApiResult<Candidate> {
    let candidate = state
        .store
        .candidate(id)
        .await?
        .filter(|c| !c.is_deleted())
        .ok_or_else(|| ApiError::not_found("Candidate"))?;
    Ok(candidate)
}

async fn list_candidates(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
    Query(filter): Query<CandidateListQuery>,
) -> ApiResult<Json<PaginatedResponse<Candidate>>> {
    let mut builder = QueryBuilder::new();
    let mut binds: Vec<String> = Vec::new();

    if !filter.include_deleted {
        builder.add_static("deleted_at IS NULL");
    }
    if let Some(status) = filter.status.as_deref() {
        validation::status(status, "status")?;
        builder.add_condition("status = {}");
        binds.push(status.to_string());
    }
    if let Some(tag) = filter.tag.as_deref() {
        builder.add_condition("{} = ANY(tags)");
        binds.push(tag.to_string());
    }
    if let Some(search) = validation::optional_trimmed(filter.search.clone()) {
        builder.add_condition("(first_name ILIKE {} OR last_name ILIKE {} OR email ILIKE {})");
        binds.push(format!("%{}%", search));
    }

    let where_clause = builder.where_clause();

    let count_sql = format!("SELECT COUNT(*) FROM candidates {}", where_clause);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    for value in &binds {
        count_query = count_query.bind(value);
    }
    let total = count_query.fetch_one(&state.db_pool).await?;

    let list_sql = format!(
        "SELECT {} FROM candidates {} ORDER BY created_at DESC LIMIT ${} OFFSET ${}",
        CANDIDATE_COLUMNS,
        where_clause,
        builder.next_param(),
        builder.next_param() + 1
    );
    let mut list_query = sqlx::query_as::<_, CandidateRow>(&list_sql);
    for value in &binds {
        list_query = list_query.bind(value);
    }
    let rows = list_query
        .bind(params.limit())
        .bind(params.offset())
        .fetch_all(&state.db_pool)
        .await?;

    let candidates = rows.into_iter().map(Candidate::from).collect();
    Ok(Json(PaginatedResponse::new(candidates, &params, total)))
}

async fn create_candidate(
    State(state): State<Arc<AppState>>,
    Validated(request): Validated<CreateCandidateRequest>,
) -> ApiResult<(StatusCode, Json<Candidate>)> {
    let status = match request.status.as_deref() {
        Some(raw) => validation::status(raw, "status")?,
        None => CandidateStatus::New,
    };

    let mut tags: Vec<String> = Vec::new();
    for raw in &request.tags {
        let tag = validation::tag(raw)?;
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let activity = Activity::new("created", "Candidate created").by_actor(request.actor_id);

    let row = sqlx::query_as::<_, CandidateRow>(&format!(
        r#"
        INSERT INTO candidates (id, first_name, last_name, email, phone, source, status, status_changed_at, tags, activities, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), $8, $9, NOW())
        RETURNING {}
        "#,
        CANDIDATE_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(request.first_name.trim())
    .bind(request.last_name.trim())
    .bind(validation::optional_trimmed(request.email.clone()))
    .bind(validation::optional_trimmed(request.phone.clone()))
    .bind(validation::optional_trimmed(request.source.clone()))
    .bind(status.as_str())
    .bind(&tags)
    .bind(SqlJson(vec![activity]))
    .fetch_one(&state.db_pool)
    .await?;

    let candidate = Candidate::from(row);
    tracing::info!(candidate_id = %candidate.id, "Candidate created");

    state
        .automation
        .dispatch(TriggerEvent::candidate_created(
            candidate.id,
            &candidate.status,
            EventSource::from_actor(request.actor_id),
        ))
        .await;

    Ok((StatusCode::CREATED, Json(candidate)))
}

async fn get_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Candidate>> {
    Ok(Json(load_candidate(&state, id).await?))
}

async fn update_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<UpdateCandidateRequest>,
) -> ApiResult<Json<Candidate>> {
    let activity = Activity::new("updated", "Candidate details updated").by_actor(request.actor_id);

    let row = sqlx::query_as::<_, CandidateRow>(&format!(
        r#"
        UPDATE candidates
        SET first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            email = COALESCE($4, email),
            phone = COALESCE($5, phone),
            source = COALESCE($6, source),
            activities = activities || jsonb_build_array($7::jsonb),
            updated_at = NOW()
        WHERE id = $1 AND deleted_at IS NULL
        RETURNING {}
        "#,
        CANDIDATE_COLUMNS
    ))
    .bind(id)
    .bind(validation::optional_trimmed(request.first_name.clone()))
    .bind(validation::optional_trimmed(request.last_name.clone()))
    .bind(validation::optional_trimmed(request.email.clone()))
    .bind(validation::optional_trimmed(request.phone.clone()))
    .bind(validation::optional_trimmed(request.source.clone()))
    .bind(SqlJson(activity))
    .fetch_optional(&state.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Candidate"))?;

    Ok(Json(Candidate::from(row)))
}

async fn delete_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(actor): Query<ActorQuery>,
) -> ApiResult<StatusCode> {
    let activity = Activity::new("deleted", "Candidate deleted").by_actor(actor.actor_id);

    let result = sqlx::query(
        r#"
        UPDATE candidates
        SET deleted_at = NOW(), updated_at = NOW(),
            activities = activities || jsonb_build_array($2::jsonb)
        WHERE id = $1 AND deleted_at IS NULL
        "#,
    )
    .bind(id)
    .bind(SqlJson(activity))
    .execute(&state.db_pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Candidate"));
    }

    tracing::info!(candidate_id = %id, "Candidate soft-deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn change_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<ChangeStatusRequest>,
) -> ApiResult<Json<Candidate>> {
    let status = validation::status(&request.status, "status")?;
    let candidate = load_candidate(&state, id).await?;

    let activity = Activity::new(
        "status_changed",
        format!("Status changed from {} to {}", candidate.status, status),
    )
    .by_actor(request.actor_id);

    if let Some(previous) = state.store.set_status(id, status.as_str(), activity).await? {
        state
            .automation
            .dispatch(TriggerEvent::status_changed(
                id,
                &previous,
                status.as_str(),
                EventSource::from_actor(request.actor_id),
            ))
            .await;
    }

    Ok(Json(load_candidate(&state, id).await?))
}

/// Place the candidate in a process stage, updating the status it implies.
/// The row is locked for the read-modify-write so concurrent moves on other
/// processes keep their placements.
async fn move_stage(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<MoveStageRequest>,
) -> ApiResult<Json<Candidate>> {
    let explicit = match request.status.as_deref() {
        Some(raw) => Some(validation::status(raw, "status")?),
        None => None,
    };
    let process_name = request.process_name.trim().to_string();
    let stage = request.stage.trim().to_string();

    let mut tx = state.db_pool.begin().await?;

    let (current_status, SqlJson(mut processes)) =
        sqlx::query_as::<_, (String, SqlJson<Vec<ProcessPlacement>>)>(
            "SELECT status, current_processes FROM candidates WHERE id = $1 AND deleted_at IS NULL FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Candidate"))?;

    let old_stage = match processes.iter_mut().find(|p| p.process_name == process_name) {
        Some(placement) => {
            let old = std::mem::replace(&mut placement.stage, stage.clone());
            placement.entered_at = Utc::now();
            if request.job_id.is_some() {
                placement.job_id = request.job_id;
            }
            Some(old)
        }
        None => {
            processes.push(ProcessPlacement {
                process_name: process_name.clone(),
                job_id: request.job_id,
                stage: stage.clone(),
                entered_at: Utc::now(),
            });
            None
        }
    };

    let stage_changed = old_stage.as_deref() != Some(stage.as_str());
    let new_status = pipeline::resolve_stage_status(&stage, explicit, &current_status);

    let mut activities = Vec::new();
    if stage_changed {
        activities.push(
            Activity::new(
                "stage_changed",
                match &old_stage {
                    Some(old) => format!("{}: moved from {} to {}", process_name, old, stage),
                    None => format!("{}: placed in {}", process_name, stage),
                },
            )
            .by_actor(request.actor_id),
        );
    }
    if let Some(status) = new_status {
        activities.push(
            Activity::new(
                "status_changed",
                format!("Status changed from {} to {} (stage {})", current_status, status, stage),
            )
            .by_actor(request.actor_id),
        );
    }

    if !activities.is_empty() {
        sqlx::query(
            r#"
            UPDATE candidates
            SET current_processes = $2,
                activities = activities || $3::jsonb,
                status = COALESCE($4, status),
                status_changed_at = CASE WHEN $4::text IS NULL THEN status_changed_at ELSE NOW() END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(SqlJson(&processes))
        .bind(SqlJson(&activities))
        .bind(new_status.map(|status| status.as_str()))
        .execute(&mut *tx)
        .await?;
    }
    tx.commit().await?;

    let source = EventSource::from_actor(request.actor_id);
    if stage_changed {
        state
            .automation
            .dispatch(TriggerEvent::stage_changed(
                id,
                &process_name,
                old_stage.as_deref(),
                &stage,
                source.clone(),
            ))
            .await;
    }
    if let Some(status) = new_status {
        state
            .automation
            .dispatch(TriggerEvent::status_changed(id, &current_status, status.as_str(), source))
            .await;
    }

    Ok(Json(load_candidate(&state, id).await?))
}

async fn add_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<TagRequest>,
) -> ApiResult<Json<Candidate>> {
    let tag = validation::tag(&request.tag)?;
    load_candidate(&state, id).await?;

    let activity = Activity::new("tag_added", format!("Tag '{}' added", tag)).by_actor(request.actor_id);
    if state.store.add_tag(id, &tag, activity).await? {
        state
            .automation
            .dispatch(TriggerEvent::tag_added(id, &tag, EventSource::from_actor(request.actor_id)))
            .await;
    }

    Ok(Json(load_candidate(&state, id).await?))
}

async fn remove_tag(
    State(state): State<Arc<AppState>>,
    Path((id, tag)): Path<(Uuid, String)>,
    Query(actor): Query<ActorQuery>,
) -> ApiResult<Json<Candidate>> {
    load_candidate(&state, id).await?;

    let activity = Activity::new("tag_removed", format!("Tag '{}' removed", tag)).by_actor(actor.actor_id);
    if !state.store.remove_tag(id, &tag, activity).await? {
        return Err(ApiError::not_found("Tag"));
    }

    state
        .automation
        .dispatch(TriggerEvent::tag_removed(id, &tag, EventSource::from_actor(actor.actor_id)))
        .await;

    Ok(Json(load_candidate(&state, id).await?))
}

async fn add_note(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<AddNoteRequest>,
) -> ApiResult<(StatusCode, Json<CandidateNote>)> {
    load_candidate(&state, id).await?;

    let note = CandidateNote {
        id: Uuid::new_v4(),
        author_id: request.author_id,
        body: request.body.trim().to_string(),
        created_at: Utc::now(),
    };
    let activity = Activity::new("note_added", "Note added").by_actor(request.author_id);
    state.store.add_note(id, note.clone(), activity).await?;

    Ok((StatusCode::CREATED, Json(note)))
}

async fn add_score(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Validated(request): Validated<AddScoreRequest>,
) -> ApiResult<(StatusCode, Json<QuickScore>)> {
    load_candidate(&state, id).await?;

    let score = QuickScore {
        id: Uuid::new_v4(),
        author_id: request.author_id,
        score: request.score,
        comment: validation::optional_trimmed(request.comment),
        created_at: Utc::now(),
    };
    let activity = Activity::new("scored", format!("Quick score {}/5", score.score)).by_actor(request.author_id);
    state.store.add_quick_score(id, score.clone(), activity).await?;

    Ok((StatusCode::CREATED, Json(score)))
}

/// Newest first
async fn list_activities(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<Activity>>> {
    let mut activities = load_candidate(&state, id).await?.activities;
    activities.reverse();
    Ok(Json(activities))
}

/// Irreversibly strip personal data from the candidate and their comments
async fn anonymize_candidate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Candidate>> {
    let mut candidate = load_candidate(&state, id).await?;
    if candidate.anonymized_at.is_some() {
        return Err(ApiError::conflict("Candidate is already anonymized"));
    }

    privacy::anonymize_candidate(&mut candidate);

    let mut tx = state.db_pool.begin().await?;

    let updated = sqlx::query(
        r#"
        UPDATE candidates
        SET first_name = $2, last_name = $3, email = NULL, phone = NULL, source = NULL,
            notes = $4, quick_scores = $5, activities = $6,
            anonymized_at = $7, updated_at = $7
        WHERE id = $1 AND deleted_at IS NULL AND anonymized_at IS NULL
        "#,
    )
    .bind(id)
    .bind(&candidate.first_name)
    .bind(&candidate.last_name)
    .bind(SqlJson(&candidate.notes))
    .bind(SqlJson(&candidate.quick_scores))
    .bind(SqlJson(&candidate.activities))
    .bind(candidate.anonymized_at)
    .execute(&mut *tx)
    .await?;
    if updated.rows_affected() == 0 {
        return Err(ApiError::conflict("Candidate is already anonymized"));
    }

    let comments = sqlx::query_as::<_, (Uuid, String)>("SELECT id, body FROM comments WHERE candidate_id = $1")
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
    for (comment_id, body) in comments {
        sqlx::query("UPDATE comments SET body = $2 WHERE id = $1")
            .bind(comment_id)
            .bind(privacy::scrub_text(&body))
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query("UPDATE email_outbox SET to_address = $2 WHERE candidate_id = $1")
        .bind(id)
        .bind(privacy::REDACTED)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    tracing::info!(candidate_id = %id, "Candidate anonymized");
    Ok(Json(candidate))
}
