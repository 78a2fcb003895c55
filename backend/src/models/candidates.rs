use chrono::{DateTime, Utc};
use recruit_shared::{Activity, Candidate, CandidateNote, ProcessPlacement, QuickScore};
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

/// Column list matching `CandidateRow`
pub const CANDIDATE_COLUMNS: &str = "id, first_name, last_name, email, phone, source, status, \
     status_changed_at, tags, activities, current_processes, notes, quick_scores, \
     created_at, updated_at, deleted_at, anonymized_at";

#[derive(Debug, Clone, FromRow)]
pub struct CandidateRow {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: String,
    pub status_changed_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub activities: Json<Vec<Activity>>,
    pub current_processes: Json<Vec<ProcessPlacement>>,
    pub notes: Json<Vec<CandidateNote>>,
    pub quick_scores: Json<Vec<QuickScore>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub anonymized_at: Option<DateTime<Utc>>,
}

impl From<CandidateRow> for Candidate {
    fn from(row: CandidateRow) -> Self {
        Candidate {
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            phone: row.phone,
            source: row.source,
            status: row.status,
            status_changed_at: row.status_changed_at,
            tags: row.tags,
            activities: row.activities.0,
            current_processes: row.current_processes.0,
            notes: row.notes.0,
            quick_scores: row.quick_scores.0,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
            anonymized_at: row.anonymized_at,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateCandidateRequest {
    #[validate(length(min = 1, max = 100, message = "first_name must be 1-100 characters"))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "last_name must be 1-100 characters"))]
    pub last_name: String,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(max = 40, message = "phone must be 40 characters or less"))]
    pub phone: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateCandidateRequest {
    #[validate(length(min = 1, max = 100, message = "first_name must be 1-100 characters"))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100, message = "last_name must be 1-100 characters"))]
    pub last_name: Option<String>,
    #[validate(email(message = "email must be a valid address"))]
    pub email: Option<String>,
    #[validate(length(max = 40, message = "phone must be 40 characters or less"))]
    pub phone: Option<String>,
    pub source: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangeStatusRequest {
    #[validate(length(min = 1, message = "status is required"))]
    pub status: String,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MoveStageRequest {
    #[validate(length(min = 1, max = 100, message = "process_name must be 1-100 characters"))]
    pub process_name: String,
    #[validate(length(min = 1, max = 100, message = "stage must be 1-100 characters"))]
    pub stage: String,
    pub job_id: Option<Uuid>,
    /// Overrides the status inferred from the stage name
    pub status: Option<String>,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TagRequest {
    pub tag: String,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ActorQuery {
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddNoteRequest {
    #[validate(length(min = 1, max = 10000, message = "body must be 1-10000 characters"))]
    pub body: String,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AddScoreRequest {
    #[validate(range(min = 1, max = 5, message = "score must be between 1 and 5"))]
    pub score: i16,
    #[validate(length(max = 2000, message = "comment must be 2000 characters or less"))]
    pub comment: Option<String>,
    pub author_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CandidateListQuery {
    pub status: Option<String>,
    pub tag: Option<String>,
    pub search: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}
