// Automation outbox: handlers enqueue trigger events, a background worker
// claims and processes them with retry and dead-lettering.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info, warn};

use super::engine::WorkflowEngine;
use super::error::AutomationResult;
use super::store::{EventQueue, QueuedEvent};
use super::TriggerEvent;
use crate::config::AutomationConfig;

/// Handle used by request handlers to publish candidate events
#[derive(Clone)]
pub struct AutomationDispatcher {
    queue: Arc<dyn EventQueue>,
    wake: Arc<Notify>,
}

impl AutomationDispatcher {
    pub fn new(queue: Arc<dyn EventQueue>, wake: Arc<Notify>) -> Self {
        Self { queue, wake }
    }

    /// Enqueue an event and report whether it was stored. Failures are
    /// logged and swallowed: automation never fails the request that caused
    /// the event.
    pub async fn dispatch(&self, event: TriggerEvent) -> bool {
        match self.queue.enqueue(&event).await {
            Ok(()) => {
                self.wake.notify_one();
                true
            }
            Err(e) => {
                error!(
                    event_id = %event.event_id,
                    candidate_id = %event.candidate_id,
                    "Failed to enqueue {} event: {}",
                    event.trigger_type,
                    e
                );
                false
            }
        }
    }

    pub async fn dispatch_all(&self, events: impl IntoIterator<Item = TriggerEvent>) {
        for event in events {
            self.dispatch(event).await;
        }
    }
}

#[derive(Clone)]
pub struct AutomationWorker {
    queue: Arc<dyn EventQueue>,
    engine: WorkflowEngine,
    wake: Arc<Notify>,
    config: AutomationConfig,
}

impl AutomationWorker {
    pub fn new(
        queue: Arc<dyn EventQueue>,
        engine: WorkflowEngine,
        wake: Arc<Notify>,
        config: AutomationConfig,
    ) -> Self {
        Self {
            queue,
            engine,
            wake,
            config,
        }
    }

    /// Run forever, draining the queue whenever woken or on the poll interval
    pub async fn start(self) {
        info!(
            "Starting automation worker (poll every {:?}, batch {})",
            self.config.poll_interval, self.config.batch_size
        );

        let mut ticker = interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.wake.notified() => {}
            }

            loop {
                match self.run_once().await {
                    Ok(claimed) if (claimed as i64) < self.config.batch_size => break,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Automation worker failed to claim events: {}", e);
                        break;
                    }
                }
            }
        }
    }

    /// Claim one batch and process it. Returns the number of claimed events.
    pub async fn run_once(&self) -> AutomationResult<usize> {
        let batch = self.queue.claim(self.config.batch_size).await?;
        for queued in &batch {
            self.handle(queued).await;
        }
        Ok(batch.len())
    }

    async fn handle(&self, queued: &QueuedEvent) {
        let event = &queued.event;

        let outcome = match self.engine.process_event(event).await {
            Ok(outcomes) => {
                let executed = outcomes.iter().filter(|o| o.executed().is_some()).count();
                info!(
                    event_id = %event.event_id,
                    "Processed {} event: {} workflows executed",
                    event.trigger_type,
                    executed
                );
                self.queue.complete(queued.id).await
            }
            Err(e) if queued.attempts >= self.config.max_attempts => {
                error!(
                    event_id = %event.event_id,
                    attempts = queued.attempts,
                    "Dead-lettering {} event: {}",
                    event.trigger_type,
                    e
                );
                self.queue.dead_letter(queued.id, &e.to_string()).await
            }
            Err(e) => {
                let delay = self.config.retry_delay(queued.attempts);
                warn!(
                    event_id = %event.event_id,
                    attempts = queued.attempts,
                    "Processing {} event failed, retrying in {:?}: {}",
                    event.trigger_type,
                    delay,
                    e
                );
                let retry_at = Utc::now()
                    + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(60));
                self.queue.retry(queued.id, &e.to_string(), retry_at).await
            }
        };

        if let Err(e) = outcome {
            error!(event_id = %event.event_id, "Failed to update outbox row {}: {}", queued.id, e);
        }
    }
}
