use recruit_shared::CandidateStatus;
use serde_json::json;
use uuid::Uuid;

use crate::tests::fixtures::{CandidateFixture, WorkflowFixture};
use crate::tests::helpers::{automation, mock_webhook};
use crate::tests::memory_store::InMemoryStore;
use crate::workflows::{
    Action, ActionType, AutomationError, CapKind, Condition, EventSource, ExecutionStatus, SkipReason,
    TriggerEvent, TriggerType, WorkflowOutcome,
};

fn skip_reason(outcome: &WorkflowOutcome) -> Option<SkipReason> {
    match outcome {
        WorkflowOutcome::Skipped { reason, .. } => Some(*reason),
        WorkflowOutcome::Executed(_) => None,
    }
}

fn moved_to(candidate_id: Uuid, from: CandidateStatus, to: CandidateStatus) -> TriggerEvent {
    TriggerEvent::status_changed(candidate_id, from.as_str(), to.as_str(), EventSource::System)
}

#[tokio::test]
async fn test_status_workflow_fires_only_on_matching_status() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Interview)
            .build(),
    );
    let workflow = store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Interview)
            .with_condition(Condition::equals("source", json!("referral")))
            .with_action(Action::add_tag("interviewing"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&moved_to(candidate, CandidateStatus::Screening, CandidateStatus::Interview))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    let record = outcomes[0].executed().expect("workflow should execute");
    assert_eq!(record.status, ExecutionStatus::Succeeded);
    assert!(store.candidate_snapshot(candidate).has_tag("interviewing"));

    let outcomes = auto
        .engine
        .process_event(&moved_to(candidate, CandidateStatus::Interview, CandidateStatus::Offer))
        .await
        .unwrap();
    assert_eq!(skip_reason(&outcomes[0]), Some(SkipReason::TriggerMismatch));
    assert_eq!(store.executions_for(workflow).len(), 1);
}

#[tokio::test]
async fn test_conditions_gate_execution() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let mut job_board = CandidateFixture::new().build();
    job_board.source = Some("job_board".to_string());
    let candidate = store.insert_candidate(job_board);
    store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Offer)
            .with_condition(Condition::equals("source", json!("referral")))
            .with_action(Action::create_task("Thank the referrer"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&moved_to(candidate, CandidateStatus::Interview, CandidateStatus::Offer))
        .await
        .unwrap();

    assert_eq!(skip_reason(&outcomes[0]), Some(SkipReason::ConditionsNotMet));
    assert!(store.tasks().is_empty());
}

#[tokio::test]
async fn test_conditions_can_read_the_event_payload() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Rejected)
            .with_condition(Condition::equals("event.old_status", json!("offer")))
            .with_action(Action::add_tag("late-rejection"))
            .build(),
    );

    let early = auto
        .engine
        .process_event(&moved_to(candidate, CandidateStatus::Screening, CandidateStatus::Rejected))
        .await
        .unwrap();
    assert_eq!(skip_reason(&early[0]), Some(SkipReason::ConditionsNotMet));

    let late = auto
        .engine
        .process_event(&moved_to(candidate, CandidateStatus::Offer, CandidateStatus::Rejected))
        .await
        .unwrap();
    assert!(late[0].executed().is_some());
}

#[tokio::test]
async fn test_counters_increment_once_per_run_when_actions_fail() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .with_action(Action::add_tag("first"))
            .with_action(Action::send_template("no-such-template"))
            .with_action(Action::add_tag("last"))
            .build(),
    );

    let event = TriggerEvent::candidate_created(candidate, "new", EventSource::Api);
    let outcomes = auto.engine.process_event(&event).await.unwrap();

    let record = outcomes[0].executed().unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert_eq!(record.action_results.len(), 3);
    assert!(!record.action_results[1].success);
    assert!(record.action_results[1].error.as_deref().unwrap().contains("no-such-template"));
    // actions after a failure still run
    assert!(store.candidate_snapshot(candidate).has_tag("last"));

    let stats = store.workflow_snapshot(workflow);
    assert_eq!(stats.execution_count, 1);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(stats.success_count, 0);
    assert!(stats.last_executed_at.is_some());

    auto.engine.process_event(&event).await.unwrap();
    let stats = store.workflow_snapshot(workflow);
    assert_eq!(stats.execution_count, 2);
    assert_eq!(stats.failure_count, 2);
    assert_eq!(store.executions_for(workflow).len(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_candidate_cap_holds_under_concurrent_triggers() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let other = store.insert_candidate(CandidateFixture::new().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::new(TriggerType::TagAdded)
            .max_per_candidate(1)
            .with_action(Action::create_task("Review"))
            .build(),
    );

    let handles: Vec<_> = (0..10)
        .map(|i| {
            let engine = auto.engine.clone();
            let event = TriggerEvent::tag_added(candidate, &format!("tag-{}", i), EventSource::System);
            tokio::spawn(async move { engine.process_event(&event).await })
        })
        .collect();

    let mut executed = 0;
    let mut capped = 0;
    for result in futures::future::join_all(handles).await {
        let outcomes = result.unwrap().unwrap();
        match skip_reason(&outcomes[0]) {
            None => executed += 1,
            Some(SkipReason::CapReached(CapKind::PerCandidate)) => capped += 1,
            Some(unexpected) => panic!("unexpected skip: {:?}", unexpected),
        }
    }

    assert_eq!(executed, 1);
    assert_eq!(capped, 9);
    assert_eq!(store.executions_for(workflow).len(), 1);
    assert_eq!(store.workflow_snapshot(workflow).execution_count, 1);
    assert_eq!(store.tasks().len(), 1);

    // the cap is per candidate
    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::tag_added(other, "x", EventSource::System))
        .await
        .unwrap();
    assert!(outcomes[0].executed().is_some());
}

#[tokio::test]
async fn test_per_day_cap() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .max_per_day(2)
            .with_action(Action::add_tag("welcomed"))
            .build(),
    );

    let mut reasons = Vec::new();
    for _ in 0..3 {
        let candidate = store.insert_candidate(CandidateFixture::new().build());
        let outcomes = auto
            .engine
            .process_event(&TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
            .await
            .unwrap();
        reasons.push(skip_reason(&outcomes[0]));
    }

    assert_eq!(
        reasons,
        vec![None, None, Some(SkipReason::CapReached(CapKind::PerDay))]
    );
}

#[tokio::test]
async fn test_deleted_candidates_are_skipped() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().deleted().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::new(TriggerType::TagAdded)
            .with_action(Action::create_task("Follow up"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::tag_added(candidate, "python", EventSource::System))
        .await
        .unwrap();

    assert!(outcomes.is_empty());
    assert!(store.executions_for(workflow).is_empty());
    assert!(store.tasks().is_empty());

    let missing = auto
        .engine
        .process_event(&TriggerEvent::tag_added(Uuid::new_v4(), "python", EventSource::System))
        .await
        .unwrap();
    assert!(missing.is_empty());
}

#[tokio::test]
async fn test_tag_conditions_are_case_sensitive() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let lower = store.insert_candidate(CandidateFixture::new().with_tags(&["rust"]).build());
    let upper = store.insert_candidate(CandidateFixture::new().with_tags(&["Rust"]).build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .with_condition(Condition::contains("tags", json!("Rust")))
            .with_action(Action::add_tag("rustacean"))
            .build(),
    );

    let lower_outcome = auto
        .engine
        .process_event(&TriggerEvent::candidate_created(lower, "new", EventSource::Api))
        .await
        .unwrap();
    let upper_outcome = auto
        .engine
        .process_event(&TriggerEvent::candidate_created(upper, "new", EventSource::Api))
        .await
        .unwrap();

    assert_eq!(skip_reason(&lower_outcome[0]), Some(SkipReason::ConditionsNotMet));
    assert!(upper_outcome[0].executed().is_some());
    assert!(!store.candidate_snapshot(lower).has_tag("rustacean"));
}

#[tokio::test]
async fn test_stop_on_first_match() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let first = store.insert_workflow(
        WorkflowFixture::new(TriggerType::CommentAdded)
            .order(0)
            .stop_on_first_match()
            .with_action(Action::add_tag("first"))
            .build(),
    );
    let second = store.insert_workflow(
        WorkflowFixture::new(TriggerType::CommentAdded)
            .order(1)
            .with_action(Action::add_tag("second"))
            .build(),
    );

    let event = TriggerEvent::comment_added(candidate, Uuid::new_v4(), &[], EventSource::System);
    let outcomes = auto.engine.process_event(&event).await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].executed().unwrap().workflow_id, first);
    assert!(store.executions_for(second).is_empty());
    assert!(!store.candidate_snapshot(candidate).has_tag("second"));
}

#[tokio::test]
async fn test_later_workflows_see_changes_of_earlier_ones() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .order(1)
            .with_condition(Condition::contains("tags", json!("vip")))
            .with_action(Action::create_task("Call the VIP"))
            .build(),
    );
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .order(0)
            .with_action(Action::add_tag("vip"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.executed().is_some()));
    assert_eq!(store.tasks()[0].title, "Call the VIP");
}

#[tokio::test]
async fn test_manual_run() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let deleted = store.insert_candidate(CandidateFixture::new().deleted().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Hired)
            .inactive()
            .with_action(Action::add_note("Reviewed by hand"))
            .build(),
    );

    let outcome = auto
        .engine
        .run_manual(workflow, candidate, EventSource::User(Uuid::new_v4()))
        .await
        .unwrap();
    let record = outcome.executed().expect("manual runs ignore the trigger");
    assert_eq!(record.trigger_type, TriggerType::Manual);
    assert_eq!(store.candidate_snapshot(candidate).notes.len(), 1);
    assert_eq!(store.workflow_snapshot(workflow).execution_count, 1);

    let missing_workflow = auto
        .engine
        .run_manual(Uuid::new_v4(), candidate, EventSource::Api)
        .await;
    assert!(matches!(missing_workflow, Err(AutomationError::NotFound(_))));

    let deleted_candidate = auto.engine.run_manual(workflow, deleted, EventSource::Api).await;
    assert!(matches!(deleted_candidate, Err(AutomationError::NotFound(_))));
}

#[tokio::test]
async fn test_time_in_status_event_runs_only_its_workflow() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(
        CandidateFixture::new()
            .with_status(CandidateStatus::Screening)
            .in_status_for(10)
            .build(),
    );
    let targeted = store.insert_workflow(
        WorkflowFixture::time_in_status(CandidateStatus::Screening, 7)
            .with_action(Action::create_task("Nudge screening"))
            .build(),
    );
    let other = store.insert_workflow(
        WorkflowFixture::time_in_status(CandidateStatus::Screening, 3)
            .with_action(Action::create_task("Other"))
            .build(),
    );
    let paused = store.insert_workflow(
        WorkflowFixture::time_in_status(CandidateStatus::Screening, 5)
            .inactive()
            .with_action(Action::create_task("Paused"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::time_in_status(candidate, targeted, "screening", 7))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].executed().unwrap().workflow_id, targeted);
    assert!(store.executions_for(other).is_empty());

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::time_in_status(candidate, paused, "screening", 5))
        .await
        .unwrap();
    assert!(outcomes.is_empty());
}

#[tokio::test]
async fn test_action_params_are_rendered() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = CandidateFixture::new().build();
    let first_name = candidate.first_name.clone();
    let email = candidate.email.clone();
    let candidate_id = store.insert_candidate(candidate);
    store.insert_template(
        "interview-invite",
        "Interview with {{candidate.first_name}}",
        "Hello {{candidate.full_name}}, moving from {{event.old_status}}",
    );
    store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Interview)
            .named("Invite")
            .with_action(Action::send_template("interview-invite"))
            .with_action(Action::new(
                ActionType::CreateTask,
                json!({ "title": "Prepare {{candidate.first_name}} ({{workflow.name}})", "due_in_days": 2 }),
            ))
            .build(),
    );

    auto.engine
        .process_event(&moved_to(candidate_id, CandidateStatus::Screening, CandidateStatus::Interview))
        .await
        .unwrap();

    let emails = store.emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].subject, format!("Interview with {}", first_name));
    assert!(emails[0].body.ends_with("moving from screening"));
    assert_eq!(Some(emails[0].to_address.clone()), email);
    assert!(emails[0].template_id.is_some());

    let tasks = store.tasks();
    assert_eq!(tasks[0].title, format!("Prepare {} (Invite)", first_name));
    assert!(tasks[0].due_at.is_some());

    let kinds: Vec<String> = store
        .candidate_snapshot(candidate_id)
        .activities
        .iter()
        .map(|a| a.kind.clone())
        .collect();
    assert_eq!(kinds, vec!["email_queued", "task_created"]);
}

#[tokio::test]
async fn test_send_email_without_address_fails() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().without_email().build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .with_action(Action::new(
                ActionType::SendEmail,
                json!({ "subject": "Hi", "body": "Welcome" }),
            ))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await
        .unwrap();

    let record = outcomes[0].executed().unwrap();
    assert_eq!(record.status, ExecutionStatus::Failed);
    assert!(store.emails().is_empty());
}

#[tokio::test]
async fn test_workflow_changes_do_not_enqueue_events() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::CandidateCreated)
            .with_action(Action::change_status(CandidateStatus::Screening))
            .with_action(Action::add_tag("auto-screened"))
            .build(),
    );

    auto.engine
        .process_event(&TriggerEvent::candidate_created(candidate, "new", EventSource::Api))
        .await
        .unwrap();

    let snapshot = store.candidate_snapshot(candidate);
    assert_eq!(snapshot.status, "screening");
    assert!(snapshot.has_tag("auto-screened"));
    assert!(snapshot.activities.iter().all(|a| a.workflow_id.is_some()));
    assert!(store.events().is_empty());
}

#[tokio::test]
async fn test_notify_action_creates_one_notification_per_recipient() {
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::on_status(CandidateStatus::Offer)
            .with_action(Action::new(
                ActionType::Notify,
                json!({
                    "title": "{{candidate.full_name}} reached offer",
                    "user_id": alice.to_string(),
                    "user_ids": [alice.to_string(), bob.to_string()]
                }),
            ))
            .build(),
    );

    auto.engine
        .process_event(&moved_to(candidate, CandidateStatus::Interview, CandidateStatus::Offer))
        .await
        .unwrap();

    let notifications = store.notifications();
    assert_eq!(notifications.len(), 2);
    assert!(notifications.iter().all(|n| n.notification_type == "workflow"));
    assert!(notifications.iter().all(|n| n.entity_id == Some(candidate)));
}

#[tokio::test]
async fn test_webhook_action_posts_to_receiver() {
    let server = mock_webhook(200).await;
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    store.insert_workflow(
        WorkflowFixture::new(TriggerType::TagAdded)
            .with_action(Action::webhook(&format!("{}/hook", server.uri())))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::tag_added(candidate, "python", EventSource::System))
        .await
        .unwrap();

    let result = &outcomes[0].executed().unwrap().action_results[0];
    assert!(result.success);
    assert_eq!(result.output.as_ref().unwrap()["status_code"], 200);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["event"]["type"], "tag_added");
    assert_eq!(body["event"]["payload"]["tag"], "python");
    assert_eq!(body["candidate"]["id"], json!(candidate));
}

#[tokio::test]
async fn test_webhook_error_status_fails_the_action() {
    let server = mock_webhook(503).await;
    let store = InMemoryStore::new();
    let auto = automation(&store);

    let candidate = store.insert_candidate(CandidateFixture::new().build());
    let workflow = store.insert_workflow(
        WorkflowFixture::new(TriggerType::TagAdded)
            .with_action(Action::webhook(&format!("{}/hook", server.uri())))
            .with_action(Action::add_tag("after-webhook"))
            .build(),
    );

    let outcomes = auto
        .engine
        .process_event(&TriggerEvent::tag_added(candidate, "python", EventSource::System))
        .await
        .unwrap();

    let record = outcomes[0].executed().unwrap();
    assert!(!record.action_results[0].success);
    assert!(record.action_results[0].error.as_deref().unwrap().contains("503"));
    assert!(record.action_results[1].success);
    assert_eq!(store.workflow_snapshot(workflow).failure_count, 1);
}
