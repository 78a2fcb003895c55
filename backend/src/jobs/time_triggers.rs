// Time-in-status trigger - enqueues events for candidates that have sat in a
// status for longer than a workflow allows

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::JobResult;
use crate::workflows::{AutomationDispatcher, AutomationStore, TriggerEvent, TriggerType};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TimeTriggerResult {
    pub workflows_checked: i32,
    pub events_enqueued: i32,
    pub errors: Vec<String>,
}

pub struct TimeTriggerJob {
    store: Arc<dyn AutomationStore>,
    dispatcher: AutomationDispatcher,
}

impl TimeTriggerJob {
    pub fn new(store: Arc<dyn AutomationStore>, dispatcher: AutomationDispatcher) -> Self {
        Self { store, dispatcher }
    }

    pub async fn run(&self) -> JobResult<TimeTriggerResult> {
        let mut result = TimeTriggerResult::default();
        let workflows = self.store.active_workflows(TriggerType::TimeInStatus).await?;

        for workflow in workflows {
            let Some((status, days)) = workflow.trigger.time_in_status() else {
                warn!("Workflow '{}' has an incomplete time_in_status trigger", workflow.name);
                continue;
            };
            result.workflows_checked += 1;

            let changed_before = Utc::now() - Duration::days(days);
            let candidates = match self.store.stale_candidates(workflow.id, &status, changed_before).await {
                Ok(ids) => ids,
                Err(e) => {
                    result.errors.push(format!("{}: {}", workflow.name, e));
                    continue;
                }
            };

            debug!(
                "Workflow '{}': {} candidates in '{}' for {}+ days",
                workflow.name,
                candidates.len(),
                status,
                days
            );

            for candidate_id in candidates {
                let enqueued = self
                    .dispatcher
                    .dispatch(TriggerEvent::time_in_status(candidate_id, workflow.id, &status, days))
                    .await;
                if enqueued {
                    result.events_enqueued += 1;
                } else {
                    result
                        .errors
                        .push(format!("{}: failed to enqueue candidate {}", workflow.name, candidate_id));
                }
            }
        }

        if result.events_enqueued > 0 {
            info!(
                "Time triggers: {} events enqueued across {} workflows",
                result.events_enqueued, result.workflows_checked
            );
        }
        Ok(result)
    }
}
