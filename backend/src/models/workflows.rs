use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::workflows::{
    Action, ActionResult, AutomationError, Condition, ExecutionRecord, Trigger, WorkflowDefinition,
};

pub const WORKFLOW_COLUMNS: &str = "id, name, description, trigger_type, trigger_params, conditions, actions, \
     is_active, execution_order, stop_on_first_match, max_executions_per_day, \
     max_executions_per_candidate, execution_count, success_count, failure_count, \
     last_executed_at, created_by, created_at, updated_at";

pub const EXECUTION_COLUMNS: &str =
    "id, workflow_id, candidate_id, event_id, trigger_type, status, action_results, started_at, finished_at";

/// Parse a snake_case enum stored as TEXT
pub fn parse_text_enum<T: DeserializeOwned>(value: &str) -> Result<T, AutomationError> {
    Ok(serde_json::from_value(serde_json::Value::String(value.to_string()))?)
}

#[derive(Debug, Clone, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger_type: String,
    pub trigger_params: Json<serde_json::Value>,
    pub conditions: Json<Vec<Condition>>,
    pub actions: Json<Vec<Action>>,
    pub is_active: bool,
    pub execution_order: i32,
    pub stop_on_first_match: bool,
    pub max_executions_per_day: Option<i32>,
    pub max_executions_per_candidate: Option<i32>,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TryFrom<WorkflowRow> for WorkflowDefinition {
    type Error = AutomationError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(WorkflowDefinition {
            id: row.id,
            name: row.name,
            description: row.description,
            trigger: Trigger::new(parse_text_enum(&row.trigger_type)?, row.trigger_params.0),
            conditions: row.conditions.0,
            actions: row.actions.0,
            is_active: row.is_active,
            execution_order: row.execution_order,
            stop_on_first_match: row.stop_on_first_match,
            max_executions_per_day: row.max_executions_per_day,
            max_executions_per_candidate: row.max_executions_per_candidate,
            execution_count: row.execution_count,
            success_count: row.success_count,
            failure_count: row.failure_count,
            last_executed_at: row.last_executed_at,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub candidate_id: Uuid,
    pub event_id: Uuid,
    pub trigger_type: String,
    pub status: String,
    pub action_results: Json<Vec<ActionResult>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TryFrom<ExecutionRow> for ExecutionRecord {
    type Error = AutomationError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(ExecutionRecord {
            id: row.id,
            workflow_id: row.workflow_id,
            candidate_id: row.candidate_id,
            event_id: row.event_id,
            trigger_type: parse_text_enum(&row.trigger_type)?,
            status: parse_text_enum(&row.status)?,
            action_results: row.action_results.0,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

fn default_true() -> bool {
    true
}

/// Full workflow definition as accepted by create and update
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct WorkflowRequest {
    #[validate(length(min = 1, max = 200, message = "name must be 1-200 characters"))]
    pub name: String,
    #[validate(length(max = 2000, message = "description must be 2000 characters or less"))]
    pub description: Option<String>,
    pub trigger: Trigger,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[validate(length(min = 1, message = "at least one action is required"))]
    pub actions: Vec<Action>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub execution_order: i32,
    #[serde(default)]
    pub stop_on_first_match: bool,
    #[validate(range(min = 1, message = "max_executions_per_day must be at least 1"))]
    pub max_executions_per_day: Option<i32>,
    #[validate(range(min = 1, message = "max_executions_per_candidate must be at least 1"))]
    pub max_executions_per_candidate: Option<i32>,
    pub created_by: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct RunWorkflowRequest {
    pub candidate_id: Uuid,
    pub actor_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowListQuery {
    pub trigger_type: Option<String>,
    pub is_active: Option<bool>,
}
