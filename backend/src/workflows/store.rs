// Persistence seams used by the engine, the executor and the outbox worker

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use recruit_shared::{Activity, Candidate, CandidateNote, EmailTemplate};
use serde::Serialize;
use uuid::Uuid;

use super::engine::{ExecutionRecord, WorkflowDefinition};
use super::error::AutomationResult;
use super::triggers::{TriggerEvent, TriggerType};

/// Which cap stopped a run
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    PerCandidate,
    PerDay,
}

/// Outcome of the atomic increment-and-check on a workflow's caps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reservation {
    Granted,
    CapReached(CapKind),
}

#[derive(Debug, Clone)]
pub struct NewTask {
    pub candidate_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub priority: String,
    pub due_at: Option<DateTime<Utc>>,
    pub workflow_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
pub struct OutgoingEmail {
    pub candidate_id: Option<Uuid>,
    pub workflow_id: Option<Uuid>,
    pub template_id: Option<Uuid>,
    pub to_address: String,
    pub subject: String,
    pub body: String,
}

/// Event claimed from the outbox
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub id: Uuid,
    pub event: TriggerEvent,
    /// Attempts including the current one
    pub attempts: i32,
}

#[async_trait]
pub trait AutomationStore: Send + Sync {
    /// Soft-deleted candidates are returned; callers decide what to skip
    async fn candidate(&self, id: Uuid) -> AutomationResult<Option<Candidate>>;

    /// Active workflows for a trigger type, by `execution_order`
    async fn active_workflows(&self, trigger: TriggerType) -> AutomationResult<Vec<WorkflowDefinition>>;

    async fn workflow(&self, id: Uuid) -> AutomationResult<Option<WorkflowDefinition>>;

    /// Increment the per-candidate and per-day counters only while both are
    /// under their caps. Either both increments happen or neither does.
    async fn reserve_execution(
        &self,
        workflow: &WorkflowDefinition,
        candidate_id: Uuid,
        day: NaiveDate,
    ) -> AutomationResult<Reservation>;

    /// Store the execution row and bump the workflow counters
    async fn record_execution(&self, record: &ExecutionRecord) -> AutomationResult<()>;

    /// Returns false when the tag was already present
    async fn add_tag(&self, candidate_id: Uuid, tag: &str, activity: Activity) -> AutomationResult<bool>;

    /// Returns false when the tag was not present
    async fn remove_tag(&self, candidate_id: Uuid, tag: &str, activity: Activity) -> AutomationResult<bool>;

    /// Returns the previous status, or None when nothing changed
    async fn set_status(
        &self,
        candidate_id: Uuid,
        status: &str,
        activity: Activity,
    ) -> AutomationResult<Option<String>>;

    async fn add_note(&self, candidate_id: Uuid, note: CandidateNote, activity: Activity) -> AutomationResult<()>;

    async fn append_activity(&self, candidate_id: Uuid, activity: Activity) -> AutomationResult<()>;

    async fn create_task(&self, task: NewTask) -> AutomationResult<Uuid>;

    async fn create_notification(&self, notification: NewNotification) -> AutomationResult<Uuid>;

    /// Look up a template by id or by unique name
    async fn email_template(&self, key: &str) -> AutomationResult<Option<EmailTemplate>>;

    async fn queue_email(&self, email: OutgoingEmail) -> AutomationResult<Uuid>;

    /// Live candidates in `status` since before `changed_before` that the
    /// workflow has not run for since they entered the status
    async fn stale_candidates(
        &self,
        workflow_id: Uuid,
        status: &str,
        changed_before: DateTime<Utc>,
    ) -> AutomationResult<Vec<Uuid>>;
}

/// Durable queue of trigger events
#[async_trait]
pub trait EventQueue: Send + Sync {
    async fn enqueue(&self, event: &TriggerEvent) -> AutomationResult<()>;

    /// Claim up to `limit` due events and mark them as processing
    async fn claim(&self, limit: i64) -> AutomationResult<Vec<QueuedEvent>>;

    async fn complete(&self, id: Uuid) -> AutomationResult<()>;

    /// Put the event back as pending, due at `retry_at`
    async fn retry(&self, id: Uuid, error: &str, retry_at: DateTime<Utc>) -> AutomationResult<()>;

    async fn dead_letter(&self, id: Uuid, error: &str) -> AutomationResult<()>;
}
