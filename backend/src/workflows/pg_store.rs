// PostgreSQL implementation of the automation store and event queue

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use recruit_shared::{Activity, Candidate, CandidateNote, EmailTemplate, QuickScore};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use super::engine::{ExecutionRecord, ExecutionStatus, WorkflowDefinition};
use super::error::{AutomationError, AutomationResult};
use super::store::{
    AutomationStore, CapKind, EventQueue, NewNotification, NewTask, OutgoingEmail, QueuedEvent, Reservation,
};
use super::triggers::{EventSource, TriggerEvent, TriggerType};
use crate::models::workflows::parse_text_enum;
use crate::models::{CandidateRow, WorkflowRow, CANDIDATE_COLUMNS, WORKFLOW_COLUMNS};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Delete finished and dead events older than `days`
    pub async fn purge_events(&self, days: i32) -> AutomationResult<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM automation_events
            WHERE status IN ('done', 'dead')
              AND COALESCE(processed_at, created_at) < NOW() - make_interval(days => $1)
            "#,
        )
        .bind(days)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Hand events stuck in `processing` (worker crashed mid-batch) back to the queue
    pub async fn release_stale_events(&self, minutes: i32) -> AutomationResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE automation_events
            SET status = 'pending', locked_at = NULL, available_at = NOW()
            WHERE status = 'processing'
              AND locked_at < NOW() - make_interval(mins => $1)
            "#,
        )
        .bind(minutes)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Daily counters are only read for the current day
    pub async fn purge_daily_counters(&self, keep_days: i32) -> AutomationResult<u64> {
        let result = sqlx::query("DELETE FROM workflow_daily_counters WHERE day < CURRENT_DATE - $1::int")
            .bind(keep_days)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn add_quick_score(&self, candidate_id: Uuid, score: QuickScore, activity: Activity) -> AutomationResult<()> {
        self.append_to_candidate(candidate_id, "quick_scores", serde_json::to_value(score)?, activity)
            .await
    }

    /// `column` is one of the candidate's JSONB array columns
    async fn append_to_candidate(&self, candidate_id: Uuid, column: &str, value: serde_json::Value, activity: Activity) -> AutomationResult<()> {
        let query = format!(
            "UPDATE candidates SET {col} = {col} || jsonb_build_array($2::jsonb), \
             activities = activities || jsonb_build_array($3::jsonb), updated_at = NOW() \
             WHERE id = $1",
            col = column
        );
        let result = sqlx::query(&query)
            .bind(candidate_id)
            .bind(Json(value))
            .bind(Json(activity))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AutomationError::NotFound("Candidate".to_string()));
        }
        Ok(())
    }
}

fn definitions(rows: Vec<WorkflowRow>) -> Vec<WorkflowDefinition> {
    rows.into_iter()
        .filter_map(|row| {
            let id = row.id;
            WorkflowDefinition::try_from(row)
                .map_err(|e| warn!("Skipping workflow {} with invalid definition: {}", id, e))
                .ok()
        })
        .collect()
}

#[async_trait]
impl AutomationStore for PgStore {
    async fn candidate(&self, id: Uuid) -> AutomationResult<Option<Candidate>> {
        let row = sqlx::query_as::<_, CandidateRow>(&format!(
            "SELECT {} FROM candidates WHERE id = $1",
            CANDIDATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Candidate::from))
    }

    async fn active_workflows(&self, trigger: TriggerType) -> AutomationResult<Vec<WorkflowDefinition>> {
        let rows = sqlx::query_as::<_, WorkflowRow>(&format!(
            "SELECT {} FROM workflows WHERE is_active = true AND trigger_type = $1 \
             ORDER BY execution_order ASC, created_at ASC",
            WORKFLOW_COLUMNS
        ))
        .bind(trigger.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(definitions(rows))
    }

    async fn workflow(&self, id: Uuid) -> AutomationResult<Option<WorkflowDefinition>> {
        let row = sqlx::query_as::<_, WorkflowRow>(&format!("SELECT {} FROM workflows WHERE id = $1", WORKFLOW_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(WorkflowDefinition::try_from).transpose()
    }

    async fn reserve_execution(
        &self,
        workflow: &WorkflowDefinition,
        candidate_id: Uuid,
        day: NaiveDate,
    ) -> AutomationResult<Reservation> {
        let mut tx = self.pool.begin().await?;

        // The conflicting row is locked by the upsert, so concurrent
        // reservations serialise on it and re-check the cap.
        let per_candidate = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO workflow_candidate_counters (workflow_id, candidate_id, executions)
            VALUES ($1, $2, 1)
            ON CONFLICT (workflow_id, candidate_id) DO UPDATE
                SET executions = workflow_candidate_counters.executions + 1
                WHERE $3::int IS NULL OR workflow_candidate_counters.executions < $3::int
            RETURNING executions
            "#,
        )
        .bind(workflow.id)
        .bind(candidate_id)
        .bind(workflow.max_executions_per_candidate)
        .fetch_optional(&mut *tx)
        .await?;

        if per_candidate.is_none() {
            tx.rollback().await?;
            return Ok(Reservation::CapReached(CapKind::PerCandidate));
        }

        let per_day = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO workflow_daily_counters (workflow_id, day, executions)
            VALUES ($1, $2, 1)
            ON CONFLICT (workflow_id, day) DO UPDATE
                SET executions = workflow_daily_counters.executions + 1
                WHERE $3::int IS NULL OR workflow_daily_counters.executions < $3::int
            RETURNING executions
            "#,
        )
        .bind(workflow.id)
        .bind(day)
        .bind(workflow.max_executions_per_day)
        .fetch_optional(&mut *tx)
        .await?;

        if per_day.is_none() {
            tx.rollback().await?;
            return Ok(Reservation::CapReached(CapKind::PerDay));
        }

        tx.commit().await?;
        Ok(Reservation::Granted)
    }

    async fn record_execution(&self, record: &ExecutionRecord) -> AutomationResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, candidate_id, event_id, trigger_type, status, action_results, started_at, finished_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(record.id)
        .bind(record.workflow_id)
        .bind(record.candidate_id)
        .bind(record.event_id)
        .bind(record.trigger_type.as_str())
        .bind(record.status.as_str())
        .bind(Json(&record.action_results))
        .bind(record.started_at)
        .bind(record.finished_at)
        .execute(&mut *tx)
        .await?;

        let succeeded = record.status == ExecutionStatus::Succeeded;
        sqlx::query(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1,
                success_count = success_count + CASE WHEN $2 THEN 1 ELSE 0 END,
                failure_count = failure_count + CASE WHEN $2 THEN 0 ELSE 1 END,
                last_executed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(record.workflow_id)
        .bind(succeeded)
        .bind(record.finished_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn add_tag(&self, candidate_id: Uuid, tag: &str, activity: Activity) -> AutomationResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET tags = array_append(tags, $2),
                activities = activities || jsonb_build_array($3::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND NOT ($2 = ANY(tags))
            "#,
        )
        .bind(candidate_id)
        .bind(tag)
        .bind(Json(activity))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove_tag(&self, candidate_id: Uuid, tag: &str, activity: Activity) -> AutomationResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE candidates
            SET tags = array_remove(tags, $2),
                activities = activities || jsonb_build_array($3::jsonb),
                updated_at = NOW()
            WHERE id = $1 AND $2 = ANY(tags)
            "#,
        )
        .bind(candidate_id)
        .bind(tag)
        .bind(Json(activity))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn set_status(
        &self,
        candidate_id: Uuid,
        status: &str,
        activity: Activity,
    ) -> AutomationResult<Option<String>> {
        let previous = sqlx::query_scalar::<_, String>(
            r#"
            UPDATE candidates c
            SET status = $2,
                status_changed_at = NOW(),
                activities = c.activities || jsonb_build_array($3::jsonb),
                updated_at = NOW()
            FROM (SELECT id, status FROM candidates WHERE id = $1 AND deleted_at IS NULL FOR UPDATE) old
            WHERE c.id = old.id AND old.status <> $2
            RETURNING old.status
            "#,
        )
        .bind(candidate_id)
        .bind(status)
        .bind(Json(activity))
        .fetch_optional(&self.pool)
        .await?;

        Ok(previous)
    }

    async fn add_note(&self, candidate_id: Uuid, note: CandidateNote, activity: Activity) -> AutomationResult<()> {
        self.append_to_candidate(candidate_id, "notes", serde_json::to_value(note)?, activity)
            .await
    }

    async fn append_activity(&self, candidate_id: Uuid, activity: Activity) -> AutomationResult<()> {
        let result = sqlx::query(
            "UPDATE candidates SET activities = activities || jsonb_build_array($2::jsonb), updated_at = NOW() WHERE id = $1",
        )
        .bind(candidate_id)
        .bind(Json(activity))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AutomationError::NotFound("Candidate".to_string()));
        }
        Ok(())
    }

    async fn create_task(&self, task: NewTask) -> AutomationResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO tasks (id, candidate_id, title, description, assignee_id, priority, status, due_at, workflow_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'open', $7, $8, NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(task.candidate_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.assignee_id)
        .bind(&task.priority)
        .bind(task.due_at)
        .bind(task.workflow_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn create_notification(&self, notification: NewNotification) -> AutomationResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO notifications (id, user_id, title, message, notification_type, entity_type, entity_id, read, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, false, NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(&notification.notification_type)
        .bind(&notification.entity_type)
        .bind(notification.entity_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn email_template(&self, key: &str) -> AutomationResult<Option<EmailTemplate>> {
        let template = match key.parse::<Uuid>() {
            Ok(id) => {
                sqlx::query_as::<_, EmailTemplate>(
                    "SELECT id, name, subject, body, created_at, updated_at FROM email_templates WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(&self.pool)
                .await?
            }
            Err(_) => {
                sqlx::query_as::<_, EmailTemplate>(
                    "SELECT id, name, subject, body, created_at, updated_at FROM email_templates WHERE name = $1",
                )
                .bind(key)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(template)
    }

    async fn queue_email(&self, email: OutgoingEmail) -> AutomationResult<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO email_outbox (id, candidate_id, workflow_id, template_id, to_address, subject, body, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'queued', NOW())
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(email.candidate_id)
        .bind(email.workflow_id)
        .bind(email.template_id)
        .bind(&email.to_address)
        .bind(&email.subject)
        .bind(&email.body)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn stale_candidates(
        &self,
        workflow_id: Uuid,
        status: &str,
        changed_before: DateTime<Utc>,
    ) -> AutomationResult<Vec<Uuid>> {
        // A candidate qualifies once per stay in a status: skip it when the
        // workflow already ran, or an event was already queued, since the
        // status was entered.
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT c.id FROM candidates c
            WHERE c.deleted_at IS NULL
              AND c.status = $2
              AND c.status_changed_at <= $3
              AND NOT EXISTS (
                  SELECT 1 FROM workflow_executions e
                  WHERE e.workflow_id = $1 AND e.candidate_id = c.id
                    AND e.started_at >= c.status_changed_at
              )
              AND NOT EXISTS (
                  SELECT 1 FROM automation_events a
                  WHERE a.workflow_id = $1 AND a.candidate_id = c.id
                    AND a.trigger_type = 'time_in_status'
                    AND a.created_at >= c.status_changed_at
              )
            ORDER BY c.status_changed_at ASC
            LIMIT 500
            "#,
        )
        .bind(workflow_id)
        .bind(status)
        .bind(changed_before)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

#[derive(Debug, FromRow)]
struct EventRow {
    id: Uuid,
    trigger_type: String,
    candidate_id: Uuid,
    workflow_id: Option<Uuid>,
    payload: Json<serde_json::Value>,
    source: Json<EventSource>,
    correlation_id: Option<Uuid>,
    attempts: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<EventRow> for QueuedEvent {
    type Error = AutomationError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(QueuedEvent {
            id: row.id,
            attempts: row.attempts,
            event: TriggerEvent {
                event_id: row.id,
                trigger_type: parse_text_enum(&row.trigger_type)?,
                candidate_id: row.candidate_id,
                payload: row.payload.0,
                source: row.source.0,
                workflow_id: row.workflow_id,
                timestamp: row.created_at,
                correlation_id: row.correlation_id,
            },
        })
    }
}

#[async_trait]
impl EventQueue for PgStore {
    async fn enqueue(&self, event: &TriggerEvent) -> AutomationResult<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_events
                (id, trigger_type, candidate_id, workflow_id, payload, source, correlation_id, status, attempts, available_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 'pending', 0, NOW(), $8)
            "#,
        )
        .bind(event.event_id)
        .bind(event.trigger_type.as_str())
        .bind(event.candidate_id)
        .bind(event.workflow_id)
        .bind(Json(&event.payload))
        .bind(Json(&event.source))
        .bind(event.correlation_id)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn claim(&self, limit: i64) -> AutomationResult<Vec<QueuedEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            UPDATE automation_events
            SET status = 'processing', attempts = attempts + 1, locked_at = NOW()
            WHERE id IN (
                SELECT id FROM automation_events
                WHERE status = 'pending' AND available_at <= NOW()
                ORDER BY available_at ASC, created_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, trigger_type, candidate_id, workflow_id, payload, source, correlation_id, attempts, created_at
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut events = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match QueuedEvent::try_from(row) {
                Ok(event) => events.push(event),
                Err(e) => {
                    warn!("Dead-lettering unreadable automation event {}: {}", id, e);
                    self.dead_letter(id, &e.to_string()).await?;
                }
            }
        }
        events.sort_by_key(|e| e.event.timestamp);
        Ok(events)
    }

    async fn complete(&self, id: Uuid) -> AutomationResult<()> {
        sqlx::query(
            "UPDATE automation_events SET status = 'done', processed_at = NOW(), locked_at = NULL, last_error = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn retry(&self, id: Uuid, error: &str, retry_at: DateTime<Utc>) -> AutomationResult<()> {
        sqlx::query(
            "UPDATE automation_events SET status = 'pending', last_error = $2, available_at = $3, locked_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .bind(retry_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn dead_letter(&self, id: Uuid, error: &str) -> AutomationResult<()> {
        sqlx::query(
            "UPDATE automation_events SET status = 'dead', last_error = $2, processed_at = NOW(), locked_at = NULL WHERE id = $1",
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
