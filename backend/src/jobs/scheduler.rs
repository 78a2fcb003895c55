// Job Scheduler - Central scheduler for background jobs

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{MaintenanceJobs, TimeTriggerJob};
use crate::config::JobConfig;
use crate::workflows::{AutomationDispatcher, AutomationError, PgStore};

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Automation error: {0}")]
    AutomationError(#[from] AutomationError),
}

pub type JobResult<T> = Result<T, JobError>;

const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Debug, Clone, Serialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub status: JobStatus,
    pub items_processed: i64,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Completed,
    Failed,
    PartialFailure,
}

/// Recent job runs, newest last
pub type JobLogs = Arc<RwLock<Vec<JobExecutionLog>>>;

async fn push_log(logs: &JobLogs, log: JobExecutionLog) {
    let mut logs = logs.write().await;
    logs.push(log);
    if logs.len() > MAX_EXECUTION_LOGS {
        logs.remove(0);
    }
}

pub struct JobScheduler {
    scheduler: TokioScheduler,
    store: PgStore,
    dispatcher: AutomationDispatcher,
    config: JobConfig,
    execution_logs: JobLogs,
}

impl JobScheduler {
    pub async fn new(
        store: PgStore,
        dispatcher: AutomationDispatcher,
        config: JobConfig,
        execution_logs: JobLogs,
    ) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            store,
            dispatcher,
            config,
            execution_logs,
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_time_triggers().await?;
        self.schedule_outbox_recovery().await?;
        self.schedule_daily_cleanup().await?;

        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_time_triggers(&self) -> JobResult<()> {
        let interval = self.config.time_trigger_interval_minutes;
        let cron_expr = format!("0 */{} * * * *", interval); // Every N minutes

        let store = self.store.clone();
        let dispatcher = self.dispatcher.clone();
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let store = store.clone();
            let dispatcher = dispatcher.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                let job = TimeTriggerJob::new(Arc::new(store), dispatcher);

                let (status, items_processed, errors) = match job.run().await {
                    Ok(result) => {
                        let status = if result.errors.is_empty() {
                            JobStatus::Completed
                        } else {
                            JobStatus::PartialFailure
                        };
                        (status, result.events_enqueued as i64, result.errors)
                    }
                    Err(e) => {
                        error!("Time trigger job failed: {}", e);
                        (JobStatus::Failed, 0, vec![e.to_string()])
                    }
                };

                push_log(
                    &logs,
                    JobExecutionLog {
                        id: Uuid::new_v4(),
                        job_name: "Time Triggers".to_string(),
                        started_at,
                        completed_at: Utc::now(),
                        status,
                        items_processed,
                        errors,
                    },
                )
                .await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled time triggers to run every {} minutes", interval);

        Ok(())
    }

    async fn schedule_outbox_recovery(&self) -> JobResult<()> {
        let stale_minutes = self.config.stale_event_minutes;
        let store = self.store.clone();

        let job = Job::new_async("0 */5 * * * *", move |_uuid, _lock| {
            let store = store.clone();

            Box::pin(async move {
                if let Err(e) = MaintenanceJobs::recover_stale_events(&store, stale_minutes).await {
                    warn!("Outbox recovery failed: {}", e);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled outbox recovery every 5 minutes");

        Ok(())
    }

    async fn schedule_daily_cleanup(&self) -> JobResult<()> {
        let retention_days = self.config.outbox_retention_days;
        let store = self.store.clone();
        let logs = self.execution_logs.clone();

        // Run at 3 AM every day
        let job = Job::new_async("0 0 3 * * *", move |_uuid, _lock| {
            let store = store.clone();
            let logs = logs.clone();

            Box::pin(async move {
                let started_at = Utc::now();
                let (status, items_processed, errors) =
                    match MaintenanceJobs::cleanup_outbox(&store, retention_days).await {
                        Ok(removed) => (JobStatus::Completed, removed as i64, Vec::new()),
                        Err(e) => {
                            warn!("Outbox cleanup failed: {}", e);
                            (JobStatus::Failed, 0, vec![e.to_string()])
                        }
                    };

                push_log(
                    &logs,
                    JobExecutionLog {
                        id: Uuid::new_v4(),
                        job_name: "Outbox Cleanup".to_string(),
                        started_at,
                        completed_at: Utc::now(),
                        status,
                        items_processed,
                        errors,
                    },
                )
                .await;
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled outbox cleanup at 3 AM");

        Ok(())
    }
}
