// Maintenance Jobs - Outbox recovery and retention

use tracing::info;

use super::JobResult;
use crate::workflows::PgStore;

/// Daily counters older than this are no longer read by cap checks
const DAILY_COUNTER_RETENTION_DAYS: i32 = 7;

pub struct MaintenanceJobs;

impl MaintenanceJobs {
    /// Return events abandoned in `processing` to the queue
    pub async fn recover_stale_events(store: &PgStore, stale_minutes: i32) -> JobResult<u64> {
        let released = store.release_stale_events(stale_minutes).await?;
        if released > 0 {
            info!("Released {} stale automation events back to the queue", released);
        }
        Ok(released)
    }

    /// Purge processed events and outdated cap counters
    pub async fn cleanup_outbox(store: &PgStore, retention_days: i32) -> JobResult<u64> {
        let events = store.purge_events(retention_days).await?;
        let counters = store.purge_daily_counters(DAILY_COUNTER_RETENTION_DAYS).await?;

        info!(
            "Outbox cleanup removed {} events and {} daily counters",
            events, counters
        );
        Ok(events + counters)
    }
}
