// Workflow Triggers - Candidate events that can start workflow evaluation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Types of candidate events that can trigger workflows
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    CandidateCreated,
    StatusChange,
    StageChange,
    TagAdded,
    TagRemoved,
    CommentAdded,
    /// Candidate has been in a status for at least N days (scheduler driven)
    TimeInStatus,
    Manual,
}

impl TriggerType {
    pub const ALL: [TriggerType; 8] = [
        TriggerType::CandidateCreated,
        TriggerType::StatusChange,
        TriggerType::StageChange,
        TriggerType::TagAdded,
        TriggerType::TagRemoved,
        TriggerType::CommentAdded,
        TriggerType::TimeInStatus,
        TriggerType::Manual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CandidateCreated => "candidate_created",
            Self::StatusChange => "status_change",
            Self::StageChange => "stage_change",
            Self::TagAdded => "tag_added",
            Self::TagRemoved => "tag_removed",
            Self::CommentAdded => "comment_added",
            Self::TimeInStatus => "time_in_status",
            Self::Manual => "manual",
        }
    }

    /// Events of these types only run the workflow they name
    pub fn is_targeted(&self) -> bool {
        matches!(self, Self::Manual | Self::TimeInStatus)
    }
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("unknown trigger type '{}'", s))
    }
}

/// Trigger configuration stored on a workflow: `{ "type": ..., "params": {...} }`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Trigger {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    #[serde(default = "empty_params")]
    pub params: serde_json::Value,
}

fn empty_params() -> serde_json::Value {
    serde_json::json!({})
}

impl Trigger {
    pub fn new(trigger_type: TriggerType, params: serde_json::Value) -> Self {
        Self { trigger_type, params }
    }

    /// Check the trigger params against an event payload. Params that are
    /// absent match anything.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        if self.trigger_type != event.trigger_type {
            return false;
        }

        let param = |key: &str| self.params.get(key).and_then(|v| v.as_str());
        let payload = |key: &str| event.payload.get(key).and_then(|v| v.as_str());

        match self.trigger_type {
            TriggerType::StatusChange => {
                let to_ok = param("to_status").is_none_or(|want| payload("new_status") == Some(want));
                let from_ok = param("from_status").is_none_or(|want| payload("old_status") == Some(want));
                to_ok && from_ok
            }
            TriggerType::StageChange => param("stage").is_none_or(|want| {
                payload("new_stage")
                    .map(|stage| stage.to_lowercase().contains(&want.to_lowercase()))
                    .unwrap_or(false)
            }),
            TriggerType::TagAdded | TriggerType::TagRemoved => {
                param("tag").is_none_or(|want| payload("tag") == Some(want))
            }
            _ => true,
        }
    }

    /// Structural validation of params for the trigger type
    pub fn validate(&self) -> Result<(), String> {
        if !self.params.is_object() {
            return Err("trigger.params must be an object".to_string());
        }
        if self.trigger_type == TriggerType::TimeInStatus {
            let status = self.params.get("status").and_then(|v| v.as_str());
            let days = self.params.get("days").and_then(|v| v.as_i64());
            if status.is_none() {
                return Err("time_in_status triggers require params.status".to_string());
            }
            if !matches!(days, Some(d) if d >= 1) {
                return Err("time_in_status triggers require params.days >= 1".to_string());
            }
        }
        Ok(())
    }

    /// `(status, days)` for time_in_status triggers
    pub fn time_in_status(&self) -> Option<(String, i64)> {
        if self.trigger_type != TriggerType::TimeInStatus {
            return None;
        }
        let status = self.params.get("status")?.as_str()?.to_string();
        let days = self.params.get("days")?.as_i64()?;
        Some((status, days))
    }
}

/// A candidate event that can initiate workflow execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub candidate_id: Uuid,
    pub payload: serde_json::Value,
    pub source: EventSource,
    /// Only this workflow is evaluated (manual and scheduled events)
    pub workflow_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
}

/// Source of the trigger event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum EventSource {
    System,
    User(Uuid),
    Api,
    Scheduler,
}

impl EventSource {
    pub fn from_actor(actor_id: Option<Uuid>) -> Self {
        actor_id.map(EventSource::User).unwrap_or(EventSource::Api)
    }
}

impl TriggerEvent {
    pub fn new(
        trigger_type: TriggerType,
        candidate_id: Uuid,
        payload: serde_json::Value,
        source: EventSource,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            trigger_type,
            candidate_id,
            payload,
            source,
            workflow_id: None,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn candidate_created(candidate_id: Uuid, status: &str, source: EventSource) -> Self {
        Self::new(
            TriggerType::CandidateCreated,
            candidate_id,
            serde_json::json!({ "status": status }),
            source,
        )
    }

    pub fn status_changed(candidate_id: Uuid, old_status: &str, new_status: &str, source: EventSource) -> Self {
        Self::new(
            TriggerType::StatusChange,
            candidate_id,
            serde_json::json!({
                "old_status": old_status,
                "new_status": new_status
            }),
            source,
        )
    }

    pub fn stage_changed(
        candidate_id: Uuid,
        process_name: &str,
        old_stage: Option<&str>,
        new_stage: &str,
        source: EventSource,
    ) -> Self {
        Self::new(
            TriggerType::StageChange,
            candidate_id,
            serde_json::json!({
                "process_name": process_name,
                "old_stage": old_stage,
                "new_stage": new_stage
            }),
            source,
        )
    }

    pub fn tag_added(candidate_id: Uuid, tag: &str, source: EventSource) -> Self {
        Self::new(TriggerType::TagAdded, candidate_id, serde_json::json!({ "tag": tag }), source)
    }

    pub fn tag_removed(candidate_id: Uuid, tag: &str, source: EventSource) -> Self {
        Self::new(TriggerType::TagRemoved, candidate_id, serde_json::json!({ "tag": tag }), source)
    }

    pub fn comment_added(candidate_id: Uuid, comment_id: Uuid, mentions: &[Uuid], source: EventSource) -> Self {
        Self::new(
            TriggerType::CommentAdded,
            candidate_id,
            serde_json::json!({
                "comment_id": comment_id,
                "mentions": mentions
            }),
            source,
        )
    }

    pub fn time_in_status(candidate_id: Uuid, workflow_id: Uuid, status: &str, days: i64) -> Self {
        Self::new(
            TriggerType::TimeInStatus,
            candidate_id,
            serde_json::json!({ "status": status, "days": days }),
            EventSource::Scheduler,
        )
        .for_workflow(workflow_id)
    }

    pub fn manual(candidate_id: Uuid, workflow_id: Uuid, source: EventSource) -> Self {
        Self::new(TriggerType::Manual, candidate_id, serde_json::json!({}), source).for_workflow(workflow_id)
    }

    pub fn for_workflow(mut self, workflow_id: Uuid) -> Self {
        self.workflow_id = Some(workflow_id);
        self
    }

    /// Add correlation ID for tracking related events
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}
