// Background Jobs
//
// Scheduled with tokio-cron-scheduler: the time-in-status trigger and
// automation outbox maintenance.

pub mod maintenance;
pub mod scheduler;
pub mod time_triggers;

pub use maintenance::MaintenanceJobs;
pub use scheduler::{JobError, JobExecutionLog, JobLogs, JobResult, JobScheduler, JobStatus};
pub use time_triggers::{TimeTriggerJob, TimeTriggerResult};
