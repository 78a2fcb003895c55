// Workflow Executor - Executes workflow actions

use chrono::{Duration, Utc};
use recruit_shared::{Activity, Candidate, CandidateNote, CandidateStatus};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use super::engine::WorkflowDefinition;
use super::error::{AutomationError, AutomationResult};
use super::store::{AutomationStore, NewNotification, NewTask, OutgoingEmail};
use super::{Action, ActionResult, ActionType, TriggerEvent};
use crate::services::templates;

/// Everything an action can read while it runs
pub struct ExecutionContext<'a> {
    pub workflow: &'a WorkflowDefinition,
    pub candidate: &'a Candidate,
    pub event: &'a TriggerEvent,
    /// `{ candidate, event, workflow }` document used for placeholders
    pub template_context: serde_json::Value,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(workflow: &'a WorkflowDefinition, candidate: &'a Candidate, event: &'a TriggerEvent) -> Self {
        let template_context = serde_json::json!({
            "candidate": candidate_document(candidate),
            "event": event.payload,
            "workflow": {
                "id": workflow.id,
                "name": workflow.name,
            }
        });
        Self {
            workflow,
            candidate,
            event,
            template_context,
        }
    }

    fn activity(&self, kind: &str, description: impl Into<String>) -> Activity {
        Activity::new(kind, description)
            .by_workflow(self.workflow.id)
            .with_metadata(serde_json::json!({ "workflow_name": self.workflow.name }))
    }
}

/// Candidate as a JSON document with `full_name` added for templates
pub fn candidate_document(candidate: &Candidate) -> serde_json::Value {
    let mut document = serde_json::to_value(candidate).unwrap_or_default();
    if let Some(map) = document.as_object_mut() {
        map.insert("full_name".to_string(), serde_json::Value::String(candidate.full_name()));
    }
    document
}

#[derive(Clone)]
pub struct WorkflowExecutor {
    store: Arc<dyn AutomationStore>,
    http: reqwest::Client,
}

impl WorkflowExecutor {
    pub fn new(store: Arc<dyn AutomationStore>, webhook_timeout: std::time::Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(webhook_timeout)
            .build()
            .unwrap_or_default();
        Self { store, http }
    }

    /// Execute a single action. Failures are captured in the result, never
    /// propagated, so the remaining actions still run.
    pub async fn execute_action(&self, action: &Action, context: &ExecutionContext<'_>) -> ActionResult {
        let start = Instant::now();
        let params = templates::render_value(&action.params, &context.template_context);

        let result = match action.action_type {
            ActionType::SendEmail => self.send_email(&params, context).await,
            ActionType::AddTag => self.add_tag(&params, context).await,
            ActionType::RemoveTag => self.remove_tag(&params, context).await,
            ActionType::ChangeStatus => self.change_status(&params, context).await,
            ActionType::CreateTask => self.create_task(&params, context).await,
            ActionType::Notify => self.notify(&params, context).await,
            ActionType::Webhook => self.webhook(&params, context).await,
            ActionType::AddNote => self.add_note(&params, context).await,
        };

        let duration = start.elapsed().as_millis() as i64;

        match result {
            Ok(output) => {
                info!(
                    workflow = %context.workflow.name,
                    candidate_id = %context.candidate.id,
                    "Action {} completed",
                    action.action_type
                );
                ActionResult::success(action.action_type, output).with_duration(duration)
            }
            Err(e) => {
                warn!(
                    workflow = %context.workflow.name,
                    candidate_id = %context.candidate.id,
                    "Action {} failed: {}",
                    action.action_type,
                    e
                );
                ActionResult::failure(action.action_type, &e.to_string()).with_duration(duration)
            }
        }
    }

    // ===== Action Implementations =====

    async fn send_email(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let to_address = str_param(params, "to")
            .map(str::to_string)
            .or_else(|| context.candidate.email.clone())
            .ok_or_else(|| AutomationError::InvalidParams("candidate has no email address".to_string()))?;

        let (template_id, subject, body) = match str_param(params, "template") {
            Some(key) => {
                let template = self
                    .store
                    .email_template(key)
                    .await?
                    .ok_or_else(|| AutomationError::NotFound(format!("email template '{}'", key)))?;
                (
                    Some(template.id),
                    templates::render(&template.subject, &context.template_context),
                    templates::render(&template.body, &context.template_context),
                )
            }
            None => (None, required(params, "subject")?.to_string(), required(params, "body")?.to_string()),
        };

        let email_id = self
            .store
            .queue_email(OutgoingEmail {
                candidate_id: Some(context.candidate.id),
                workflow_id: Some(context.workflow.id),
                template_id,
                to_address: to_address.clone(),
                subject: subject.clone(),
                body,
            })
            .await?;

        self.store
            .append_activity(
                context.candidate.id,
                context.activity("email_queued", format!("Email queued: {}", subject)),
            )
            .await?;

        Ok(Some(serde_json::json!({ "email_id": email_id, "to": to_address })))
    }

    async fn add_tag(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let tag = required(params, "tag")?;
        let activity = context.activity("tag_added", format!("Tag '{}' added", tag));
        let added = self.store.add_tag(context.candidate.id, tag, activity).await?;
        Ok(Some(serde_json::json!({ "tag": tag, "changed": added })))
    }

    async fn remove_tag(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let tag = required(params, "tag")?;
        let activity = context.activity("tag_removed", format!("Tag '{}' removed", tag));
        let removed = self.store.remove_tag(context.candidate.id, tag, activity).await?;
        Ok(Some(serde_json::json!({ "tag": tag, "changed": removed })))
    }

    async fn change_status(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let status: CandidateStatus = required(params, "status")?
            .parse()
            .map_err(AutomationError::InvalidParams)?;

        let activity = context.activity(
            "status_changed",
            format!("Status changed to {} by workflow", status),
        );
        let previous = self
            .store
            .set_status(context.candidate.id, status.as_str(), activity)
            .await?;

        Ok(Some(serde_json::json!({
            "status": status,
            "previous_status": previous,
            "changed": previous.is_some()
        })))
    }

    async fn create_task(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let title = required(params, "title")?.to_string();
        let due_at = params
            .get("due_in_days")
            .and_then(|v| v.as_i64())
            .map(|days| Utc::now() + Duration::days(days));

        let task_id = self
            .store
            .create_task(NewTask {
                candidate_id: context.candidate.id,
                title: title.clone(),
                description: str_param(params, "description").map(str::to_string),
                assignee_id: uuid_param(params, "assignee_id")?,
                priority: str_param(params, "priority").unwrap_or("normal").to_string(),
                due_at,
                workflow_id: Some(context.workflow.id),
            })
            .await?;

        self.store
            .append_activity(
                context.candidate.id,
                context.activity("task_created", format!("Task created: {}", title)),
            )
            .await?;

        Ok(Some(serde_json::json!({ "task_id": task_id })))
    }

    async fn notify(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let title = required(params, "title")?.to_string();
        let message = str_param(params, "message").unwrap_or_default().to_string();

        let mut recipients: Vec<Uuid> = Vec::new();
        if let Some(user_id) = uuid_param(params, "user_id")? {
            recipients.push(user_id);
        }
        for value in params.get("user_ids").and_then(|v| v.as_array()).into_iter().flatten() {
            let user_id = value
                .as_str()
                .and_then(|s| s.parse::<Uuid>().ok())
                .ok_or_else(|| AutomationError::InvalidParams(format!("invalid user id {}", value)))?;
            if !recipients.contains(&user_id) {
                recipients.push(user_id);
            }
        }
        if recipients.is_empty() {
            return Err(AutomationError::InvalidParams("no notification recipients".to_string()));
        }

        let mut ids = Vec::with_capacity(recipients.len());
        for user_id in recipients {
            let id = self
                .store
                .create_notification(NewNotification {
                    user_id,
                    title: title.clone(),
                    message: message.clone(),
                    notification_type: "workflow".to_string(),
                    entity_type: Some("candidate".to_string()),
                    entity_id: Some(context.candidate.id),
                })
                .await?;
            ids.push(id);
        }

        Ok(Some(serde_json::json!({ "notification_ids": ids })))
    }

    async fn webhook(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let url = required(params, "url")?;
        let method = str_param(params, "method").unwrap_or("POST").to_uppercase();

        let body = match params.get("body") {
            Some(body) if !body.is_null() => body.clone(),
            _ => serde_json::json!({
                "workflow": { "id": context.workflow.id, "name": context.workflow.name },
                "event": {
                    "id": context.event.event_id,
                    "type": context.event.trigger_type,
                    "payload": context.event.payload,
                },
                "candidate": candidate_document(context.candidate),
            }),
        };

        let mut request = match method.as_str() {
            "POST" => self.http.post(url),
            "PUT" => self.http.put(url),
            "PATCH" => self.http.patch(url),
            other => {
                return Err(AutomationError::InvalidParams(format!("unsupported HTTP method '{}'", other)));
            }
        };

        if let Some(headers) = params.get("headers").and_then(|h| h.as_object()) {
            for (key, value) in headers {
                if let Some(v) = value.as_str() {
                    request = request.header(key.as_str(), v);
                }
            }
        }

        let response = request.json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AutomationError::WebhookStatus(status.as_u16()));
        }

        Ok(Some(serde_json::json!({
            "url": url,
            "status_code": status.as_u16()
        })))
    }

    async fn add_note(
        &self,
        params: &serde_json::Value,
        context: &ExecutionContext<'_>,
    ) -> AutomationResult<Option<serde_json::Value>> {
        let body = required(params, "body")?.to_string();
        let note = CandidateNote {
            id: Uuid::new_v4(),
            author_id: None,
            body,
            created_at: Utc::now(),
        };
        let note_id = note.id;
        let activity = context.activity("note_added", "Note added by workflow");
        self.store.add_note(context.candidate.id, note, activity).await?;
        Ok(Some(serde_json::json!({ "note_id": note_id })))
    }
}

fn str_param<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn required<'a>(params: &'a serde_json::Value, key: &str) -> AutomationResult<&'a str> {
    str_param(params, key).ok_or_else(|| AutomationError::InvalidParams(format!("missing '{}'", key)))
}

fn uuid_param(params: &serde_json::Value, key: &str) -> AutomationResult<Option<Uuid>> {
    match str_param(params, key) {
        Some(raw) => raw
            .parse::<Uuid>()
            .map(Some)
            .map_err(|_| AutomationError::InvalidParams(format!("'{}' is not a valid id", key))),
        None => Ok(None),
    }
}
