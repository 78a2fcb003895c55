// Workflow Actions - Effects a workflow performs when it fires

use recruit_shared::CandidateStatus;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Types of actions that workflows can execute
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendEmail,
    AddTag,
    RemoveTag,
    ChangeStatus,
    CreateTask,
    Notify,
    Webhook,
    AddNote,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendEmail => "send_email",
            Self::AddTag => "add_tag",
            Self::RemoveTag => "remove_tag",
            Self::ChangeStatus => "change_status",
            Self::CreateTask => "create_task",
            Self::Notify => "notify",
            Self::Webhook => "webhook",
            Self::AddNote => "add_note",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An action to be executed in a workflow: `{ "type": ..., "params": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Result of executing an action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionResult {
    pub action_type: ActionType,
    pub success: bool,
    pub output: Option<serde_json::Value>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

impl Action {
    pub fn new(action_type: ActionType, params: serde_json::Value) -> Self {
        Self { action_type, params }
    }

    pub fn send_template(template: &str) -> Self {
        Self::new(ActionType::SendEmail, serde_json::json!({ "template": template }))
    }

    pub fn add_tag(tag: &str) -> Self {
        Self::new(ActionType::AddTag, serde_json::json!({ "tag": tag }))
    }

    pub fn remove_tag(tag: &str) -> Self {
        Self::new(ActionType::RemoveTag, serde_json::json!({ "tag": tag }))
    }

    pub fn change_status(status: CandidateStatus) -> Self {
        Self::new(ActionType::ChangeStatus, serde_json::json!({ "status": status.as_str() }))
    }

    pub fn create_task(title: &str) -> Self {
        Self::new(ActionType::CreateTask, serde_json::json!({ "title": title }))
    }

    pub fn webhook(url: &str) -> Self {
        Self::new(ActionType::Webhook, serde_json::json!({ "url": url }))
    }

    pub fn add_note(body: &str) -> Self {
        Self::new(ActionType::AddNote, serde_json::json!({ "body": body }))
    }

    fn str_param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(|v| v.as_str()).filter(|s| !s.trim().is_empty())
    }

    /// Structural validation performed when a workflow is saved
    pub fn validate(&self) -> Result<(), String> {
        if !self.params.is_object() {
            return Err(format!("{}: params must be an object", self.action_type));
        }
        let require = |key: &str| {
            self.str_param(key)
                .map(|_| ())
                .ok_or_else(|| format!("{}: params.{} is required", self.action_type, key))
        };

        match self.action_type {
            ActionType::SendEmail => {
                if self.str_param("template").is_none() {
                    require("subject")?;
                    require("body")?;
                }
            }
            ActionType::AddTag | ActionType::RemoveTag => require("tag")?,
            ActionType::ChangeStatus => {
                require("status")?;
                let status = self.str_param("status").unwrap_or_default();
                // placeholders resolve at run time
                if !status.contains("{{") {
                    status.parse::<CandidateStatus>()?;
                }
            }
            ActionType::CreateTask => require("title")?,
            ActionType::Notify => {
                require("title")?;
                let has_recipients = self.params.get("user_id").is_some_and(|v| v.is_string())
                    || self
                        .params
                        .get("user_ids")
                        .and_then(|v| v.as_array())
                        .is_some_and(|ids| !ids.is_empty());
                if !has_recipients {
                    return Err("notify: params.user_id or params.user_ids is required".to_string());
                }
            }
            ActionType::Webhook => {
                let url = self.str_param("url").ok_or("webhook: params.url is required")?;
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err("webhook: params.url must be an http(s) URL".to_string());
                }
                if let Some(method) = self.str_param("method") {
                    if !matches!(method.to_uppercase().as_str(), "POST" | "PUT" | "PATCH") {
                        return Err(format!("webhook: unsupported method '{}'", method));
                    }
                }
            }
            ActionType::AddNote => require("body")?,
        }
        Ok(())
    }
}

impl ActionResult {
    pub fn success(action_type: ActionType, output: Option<serde_json::Value>) -> Self {
        Self {
            action_type,
            success: true,
            output,
            error: None,
            duration_ms: 0,
        }
    }

    pub fn failure(action_type: ActionType, error: &str) -> Self {
        Self {
            action_type,
            success: false,
            output: None,
            error: Some(error.to_string()),
            duration_ms: 0,
        }
    }

    pub fn with_duration(mut self, duration_ms: i64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
