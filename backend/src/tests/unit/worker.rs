use chrono::Utc;
use recruit_shared::CandidateStatus;
use std::sync::Arc;

use crate::jobs::TimeTriggerJob;
use crate::tests::fixtures::{CandidateFixture, WorkflowFixture};
use crate::tests::helpers::automation;
use crate::tests::memory_store::{EventStatus, InMemoryStore};
use crate::workflows::{Action, EventSource, TriggerEvent, TriggerType};

#[tokio::test]
async fn test_dispatched_event_is_processed_and_completed() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::new(TriggerType::TagAdded)
            .with_action(Action::create_task("Check portfolio"))
            .build(),
    );

    auto.dispatcher
        .dispatch(TriggerEvent::tag_added(candidate, "designer", EventSource::Api))
        .await;
    assert_eq!(store.events()[0].status, EventStatus::Pending);

    let claimed = auto.worker.run_once().await.unwrap();

    assert_eq!(claimed, 1);
    assert_eq!(store.events()[0].status, EventStatus::Done);
    assert_eq!(store.executions_for(workflow).len(), 1);
    assert_eq!(auto.worker.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_failed_event_is_retried_later() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .with_action(Action::add_tag("welcomed"))
            .build(),
    );
    store.fail_next_candidate_loads(1);

    auto.dispatcher
        .dispatch(TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await;
    auto.worker.run_once().await.unwrap();

    let event = store.events()[0].clone();
    assert_eq!(event.status, EventStatus::Pending);
    assert_eq!(event.attempts, 1);
    assert!(event.available_at > Utc::now());
    assert!(event.last_error.unwrap().contains("database error"));

    // not due yet
    assert_eq!(auto.worker.run_once().await.unwrap(), 0);

    store.release_delayed_events();
    auto.worker.run_once().await.unwrap();

    let event = store.events()[0].clone();
    assert_eq!(event.status, EventStatus::Done);
    assert_eq!(event.attempts, 2);
    assert!(store.candidate_snapshot(candidate).has_tag("welcomed"));
}

#[tokio::test]
async fn test_event_is_dead_lettered_after_max_attempts() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.fail_next_candidate_loads(u32::MAX);

    auto.dispatcher
        .dispatch(TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await;

    // max_attempts is 3 in the test config
    for _ in 0..3 {
        store.release_delayed_events();
        auto.worker.run_once().await.unwrap();
    }

    let event = store.events()[0].clone();
    assert_eq!(event.status, EventStatus::Dead);
    assert_eq!(event.attempts, 3);

    store.release_delayed_events();
    assert_eq!(auto.worker.run_once().await.unwrap(), 0);
}

#[tokio::test]
async fn test_time_trigger_job_enqueues_each_stale_candidate_once() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let stale = store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Screening)
            .in_status_for(10)
            .build(),
    );
    store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Screening)
            .in_status_for(1)
            .build(),
    );
    store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Screening)
            .in_status_for(30)
            .deleted()
            .build(),
    );
    store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Interview)
            .in_status_for(30)
            .build(),
    );
    let workflow = store.insert_workflow(
        WorkflowFixture::time_in_status(CandidateStatus::Screening, 7)
            .with_action(Action::create_task("Screening is taking too long"))
            .build(),
    );

    let job = TimeTriggerJob::new(Arc::new(store.clone()), auto.dispatcher.clone());

    let first = job.run().await.unwrap();
    assert_eq!(first.workflows_checked, 1);
    assert_eq!(first.events_enqueued, 1);
    assert!(first.errors.is_empty());

    let events = store.events();
    assert_eq!(events[0].event.candidate_id, stale);
    assert_eq!(events[0].event.workflow_id, Some(workflow));

    // already queued since the candidate entered the status
    assert_eq!(job.run().await.unwrap().events_enqueued, 0);

    auto.worker.run_once().await.unwrap();
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.executions_for(workflow).len(), 1);
    assert_eq!(job.run().await.unwrap().events_enqueued, 0);
}

fn two_created_workflows(store: &InMemoryStore) -> (uuid::Uuid, uuid::Uuid) {
    let first = store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .named("first")
            .order(1)
            .with_action(Action::create_task("Review application"))
            .build(),
    );
    let second = store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .named("second")
            .order(2)
            .with_action(Action::add_tag("reviewed"))
            .build(),
    );
    (first, second)
}

#[tokio::test]
async fn test_reload_failure_after_a_run_does_not_replay_actions() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let (first, second) = two_created_workflows(&store);
    // initial load succeeds, the reload after the first workflow fails
    store.fail_candidate_loads_after(1, 1);

    auto.dispatcher
        .dispatch(TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await;
    auto.worker.run_once().await.unwrap();
    store.release_delayed_events();
    auto.worker.run_once().await.unwrap();

    let event = store.events()[0].clone();
    assert_eq!(event.status, EventStatus::Done);
    assert_eq!(event.attempts, 1);
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.workflow_snapshot(first).execution_count, 1);
    assert!(store.executions_for(second).is_empty());
}

#[tokio::test]
async fn test_reservation_failure_after_a_run_does_not_replay_actions() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let (first, second) = two_created_workflows(&store);
    store.fail_reservations_after(1, 1);

    auto.dispatcher
        .dispatch(TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await;
    auto.worker.run_once().await.unwrap();
    store.release_delayed_events();
    auto.worker.run_once().await.unwrap();

    assert_eq!(store.events()[0].status, EventStatus::Done);
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.workflow_snapshot(first).execution_count, 1);
    assert_eq!(store.workflow_snapshot(second).execution_count, 0);
}

#[tokio::test]
async fn test_reservation_failure_before_any_run_is_retried() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let (first, second) = two_created_workflows(&store);
    store.fail_reservations_after(0, 1);

    auto.dispatcher
        .dispatch(TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await;
    auto.worker.run_once().await.unwrap();
    assert_eq!(store.events()[0].status, EventStatus::Pending);
    assert!(store.tasks().is_empty());

    store.release_delayed_events();
    auto.worker.run_once().await.unwrap();

    assert_eq!(store.events()[0].status, EventStatus::Done);
    assert_eq!(store.tasks().len(), 1);
    assert_eq!(store.workflow_snapshot(first).execution_count, 1);
    assert_eq!(store.workflow_snapshot(second).execution_count, 1);
}

#[tokio::test]
async fn test_time_trigger_job_counts_only_stored_events() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    for _ in 0..2 {
        store.insert_candidate(
            CandidateFixture::new()
                .with_status(CandidateStatus::Offer)
                .in_status_for(5)
                .build(),
        );
    }
    store.insert_workflow(
        WorkflowFixture::time_in_status(CandidateStatus::Offer, 3)
            .with_action(Action::create_task("Chase the offer"))
            .build(),
    );
    store.fail_next_enqueues(1);

    let job = TimeTriggerJob::new(Arc::new(store.clone()), auto.dispatcher.clone());
    let result = job.run().await.unwrap();

    assert_eq!(result.events_enqueued, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(store.events().len(), 1);

    // the candidate that was not stored is picked up next run
    assert_eq!(job.run().await.unwrap().events_enqueued, 1);
}
