// Workflow Engine - Matches events to workflows and runs them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::conditions::evaluate_all;
use super::error::{AutomationError, AutomationResult};
use super::executor::{candidate_document, ExecutionContext, WorkflowExecutor};
use super::store::{AutomationStore, CapKind, Reservation};
use super::{Action, ActionResult, Condition, EventSource, Trigger, TriggerEvent, TriggerType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub trigger: Trigger,
    pub conditions: Vec<Condition>,
    pub actions: Vec<Action>,
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

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Succeeded,
    Failed,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }
}

/// One run of a workflow for one candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub candidate_id: Uuid,
    pub event_id: Uuid,
    pub trigger_type: TriggerType,
    pub status: ExecutionStatus,
    pub action_results: Vec<ActionResult>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn failed_actions(&self) -> usize {
        self.action_results.iter().filter(|r| !r.success).count()
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", tag = "reason", content = "cap")]
pub enum SkipReason {
    TriggerMismatch,
    ConditionsNotMet,
    CapReached(CapKind),
}

/// What happened to one workflow while processing an event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Executed(ExecutionRecord),
    Skipped { workflow_id: Uuid, reason: SkipReason },
}

impl WorkflowOutcome {
    pub fn executed(&self) -> Option<&ExecutionRecord> {
        match self {
            Self::Executed(record) => Some(record),
            Self::Skipped { .. } => None,
        }
    }
}

fn has_executed(outcomes: &[WorkflowOutcome]) -> bool {
    outcomes.iter().any(|o| o.executed().is_some())
}

#[derive(Clone)]
pub struct WorkflowEngine {
    store: Arc<dyn AutomationStore>,
    executor: WorkflowExecutor,
}

impl WorkflowEngine {
    pub fn new(store: Arc<dyn AutomationStore>, executor: WorkflowExecutor) -> Self {
        Self { store, executor }
    }

    /// Process a trigger event and execute matching workflows. Store errors
    /// fail the event only while no workflow has run yet; after that they
    /// end processing so a retry cannot replay executed actions.
    pub async fn process_event(&self, event: &TriggerEvent) -> AutomationResult<Vec<WorkflowOutcome>> {
        let Some(mut candidate) = self.store.candidate(event.candidate_id).await? else {
            debug!(event_id = %event.event_id, "Candidate {} not found, skipping event", event.candidate_id);
            return Ok(Vec::new());
        };
        if candidate.is_deleted() {
            debug!(event_id = %event.event_id, "Candidate {} is deleted, skipping event", candidate.id);
            return Ok(Vec::new());
        }

        let workflows = self.workflows_for(event).await?;
        info!(
            event_id = %event.event_id,
            candidate_id = %candidate.id,
            "Processing {} event against {} workflows",
            event.trigger_type,
            workflows.len()
        );

        let mut outcomes: Vec<WorkflowOutcome> = Vec::new();
        for workflow in &workflows {
            let outcome = match self.evaluate_workflow(workflow, &candidate, event).await {
                Ok(outcome) => outcome,
                Err(e) if has_executed(&outcomes) => {
                    warn!(
                        event_id = %event.event_id,
                        workflow = %workflow.name,
                        "Stopping event after earlier workflows ran: {}",
                        e
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            if let WorkflowOutcome::Skipped { reason, .. } = &outcome {
                debug!(workflow = %workflow.name, "Workflow skipped: {:?}", reason);
            }
            let executed = outcome.executed().is_some();
            outcomes.push(outcome);

            if executed {
                if workflow.stop_on_first_match {
                    break;
                }
                // later workflows see the changes made by earlier ones
                match self.store.candidate(candidate.id).await {
                    Ok(Some(fresh)) if !fresh.is_deleted() => candidate = fresh,
                    Ok(_) => break,
                    Err(e) => {
                        warn!(
                            event_id = %event.event_id,
                            "Failed to reload candidate {}, stopping event: {}",
                            candidate.id,
                            e
                        );
                        break;
                    }
                }
            }
        }

        Ok(outcomes)
    }

    /// Run one workflow for one candidate on request. Conditions and caps
    /// still apply; inactive workflows may be run by hand.
    pub async fn run_manual(
        &self,
        workflow_id: Uuid,
        candidate_id: Uuid,
        source: EventSource,
    ) -> AutomationResult<WorkflowOutcome> {
        let workflow = self
            .store
            .workflow(workflow_id)
            .await?
            .ok_or_else(|| AutomationError::NotFound("Workflow".to_string()))?;
        let candidate = self
            .store
            .candidate(candidate_id)
            .await?
            .filter(|c| !c.is_deleted())
            .ok_or_else(|| AutomationError::NotFound("Candidate".to_string()))?;

        let event = TriggerEvent::manual(candidate_id, workflow_id, source);
        let mut manual = workflow.clone();
        manual.trigger = Trigger::new(TriggerType::Manual, serde_json::json!({}));

        self.evaluate_workflow(&manual, &candidate, &event).await
    }

    async fn workflows_for(&self, event: &TriggerEvent) -> AutomationResult<Vec<WorkflowDefinition>> {
        match event.workflow_id {
            Some(workflow_id) if event.trigger_type.is_targeted() => Ok(self
                .store
                .workflow(workflow_id)
                .await?
                .filter(|w| w.is_active || event.trigger_type == TriggerType::Manual)
                .into_iter()
                .collect()),
            _ => self.store.active_workflows(event.trigger_type).await,
        }
    }

    async fn evaluate_workflow(
        &self,
        workflow: &WorkflowDefinition,
        candidate: &recruit_shared::Candidate,
        event: &TriggerEvent,
    ) -> AutomationResult<WorkflowOutcome> {
        let skipped = |reason| WorkflowOutcome::Skipped {
            workflow_id: workflow.id,
            reason,
        };

        if !workflow.trigger.matches(event) {
            return Ok(skipped(SkipReason::TriggerMismatch));
        }

        let mut condition_context = candidate_document(candidate);
        if let Some(map) = condition_context.as_object_mut() {
            map.insert("event".to_string(), event.payload.clone());
        }
        if !evaluate_all(&workflow.conditions, &condition_context) {
            return Ok(skipped(SkipReason::ConditionsNotMet));
        }

        if let Reservation::CapReached(cap) = self
            .store
            .reserve_execution(workflow, candidate.id, Utc::now().date_naive())
            .await?
        {
            info!(workflow = %workflow.name, candidate_id = %candidate.id, "Execution cap reached: {:?}", cap);
            return Ok(skipped(SkipReason::CapReached(cap)));
        }

        let record = self.execute_workflow(workflow, candidate, event).await;

        if let Err(e) = self.store.record_execution(&record).await {
            warn!(workflow = %workflow.name, "Failed to record execution {}: {}", record.id, e);
        }

        info!(
            workflow = %workflow.name,
            candidate_id = %candidate.id,
            "Workflow {} with {}/{} failed actions",
            record.status.as_str(),
            record.failed_actions(),
            record.action_results.len()
        );

        Ok(WorkflowOutcome::Executed(record))
    }

    async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        candidate: &recruit_shared::Candidate,
        event: &TriggerEvent,
    ) -> ExecutionRecord {
        let started_at = Utc::now();
        let context = ExecutionContext::new(workflow, candidate, event);

        let mut action_results = Vec::with_capacity(workflow.actions.len());
        for action in &workflow.actions {
            action_results.push(self.executor.execute_action(action, &context).await);
        }

        let status = if action_results.iter().all(|r| r.success) {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed
        };

        ExecutionRecord {
            id: Uuid::new_v4(),
            workflow_id: workflow.id,
            candidate_id: candidate.id,
            event_id: event.event_id,
            trigger_type: event.trigger_type,
            status,
            action_results,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
