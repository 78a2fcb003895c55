// Candidate endpoints against a real database. The worker is not spawned,
// so every dispatched event is still pending when the assertions run.
// Run with: TEST_DATABASE_URL=... cargo test -- --ignored

use axum::http::StatusCode;
use serde_json::{json, Value};
use serial_test::serial;
use sqlx::PgPool;
use uuid::Uuid;

use crate::tests::helpers::{app_with_pool, send_json};
use crate::tests::TestContext;

async fn insert_candidate(pool: &PgPool, status: &str, processes: Value) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO candidates (id, first_name, last_name, email, status, current_processes) VALUES ($1, 'Ada', 'Lovelace', 'ada@example.com', $2, $3)",
    )
    .bind(id)
    .bind(status)
    .bind(processes)
    .execute(pool)
    .await
    .unwrap();
    id
}

async fn insert_user(pool: &PgPool, username: &str) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query("INSERT INTO users (id, name, username, email) VALUES ($1, $2, $2, $3)")
        .bind(id)
        .bind(username)
        .bind(format!("{}@example.com", username))
        .execute(pool)
        .await
        .unwrap();
    id
}

/// `(trigger_type, payload)` of every queued event for the candidate, by type
async fn queued_events(pool: &PgPool, candidate_id: Uuid) -> Vec<(String, Value)> {
    sqlx::query_as::<_, (String, Value)>(
        "SELECT trigger_type, payload FROM automation_events WHERE candidate_id = $1 AND status = 'pending' ORDER BY trigger_type",
    )
    .bind(candidate_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

fn stage_uri(id: Uuid) -> String {
    format!("/api/v1/candidates/{}/stage", id)
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_move_stage_infers_status_and_queues_both_events() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "screening", json!([])).await;

    let (status, body) = send_json(
        app_with_pool(ctx.db_pool.clone()),
        "PUT",
        &stage_uri(candidate),
        json!({ "process_name": "Backend", "stage": "Onsite interview" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "interview");
    assert_eq!(body["current_processes"][0]["stage"], "Onsite interview");

    let events = queued_events(&ctx.db_pool, candidate).await;
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].0, "stage_change");
    assert_eq!(events[0].1["old_stage"], Value::Null);
    assert_eq!(events[0].1["new_stage"], "Onsite interview");
    assert_eq!(events[1].0, "status_change");
    assert_eq!(events[1].1["old_status"], "screening");
    assert_eq!(events[1].1["new_status"], "interview");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_move_stage_within_same_status_queues_only_stage_event() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(
        &ctx.db_pool,
        "interview",
        json!([{ "process_name": "Backend", "job_id": null, "stage": "Interview 1", "entered_at": "2026-01-05T09:00:00Z" }]),
    )
    .await;

    let (status, body) = send_json(
        app_with_pool(ctx.db_pool.clone()),
        "PUT",
        &stage_uri(candidate),
        json!({ "process_name": "Backend", "stage": "Interview 2" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "interview");

    let events = queued_events(&ctx.db_pool, candidate).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "stage_change");
    assert_eq!(events[0].1["old_stage"], "Interview 1");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_move_stage_explicit_status_wins_over_stage_name() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "screening", json!([])).await;

    let (status, body) = send_json(
        app_with_pool(ctx.db_pool.clone()),
        "PUT",
        &stage_uri(candidate),
        json!({ "process_name": "Backend", "stage": "Onsite interview", "status": "on_hold" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "on_hold");

    let events = queued_events(&ctx.db_pool, candidate).await;
    assert_eq!(events[1].1["new_status"], "on_hold");
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_move_stage_on_deleted_candidate_is_not_found() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "screening", json!([])).await;
    sqlx::query("UPDATE candidates SET deleted_at = NOW() WHERE id = $1")
        .bind(candidate)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let (status, _) = send_json(
        app_with_pool(ctx.db_pool.clone()),
        "PUT",
        &stage_uri(candidate),
        json!({ "process_name": "Backend", "stage": "Offer" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(queued_events(&ctx.db_pool, candidate).await.is_empty());

    let stored: String = sqlx::query_scalar("SELECT status FROM candidates WHERE id = $1")
        .bind(candidate)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(stored, "screening");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
#[serial]
async fn test_concurrent_moves_keep_every_placement() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "new", json!([])).await;
    let app = app_with_pool(ctx.db_pool.clone());

    let moves = ["Backend", "Frontend", "Platform", "Data"].map(|process| {
        let app = app.clone();
        tokio::spawn(async move {
            send_json(app, "PUT", &stage_uri(candidate), json!({ "process_name": process, "stage": "Sourced" })).await
        })
    });
    for joined in futures::future::join_all(moves).await {
        assert_eq!(joined.unwrap().0, StatusCode::OK);
    }

    let processes: Value = sqlx::query_scalar("SELECT current_processes FROM candidates WHERE id = $1")
        .bind(candidate)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    let mut names: Vec<&str> = processes
        .as_array()
        .unwrap()
        .iter()
        .map(|p| p["process_name"].as_str().unwrap())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["Backend", "Data", "Frontend", "Platform"]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_comment_mentions_notify_everyone_but_the_author() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "screening", json!([])).await;
    let author = insert_user(&ctx.db_pool, "grace").await;
    let reviewer = insert_user(&ctx.db_pool, "linus").await;

    let (status, body) = send_json(
        app_with_pool(ctx.db_pool.clone()),
        "POST",
        &format!("/api/v1/candidates/{}/comments", candidate),
        json!({ "body": "@linus can you review? cc @grace and @nobody", "author_id": author }),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["mentions"].as_array().unwrap().len(), 2);

    let notified: Vec<(Uuid, String)> = sqlx::query_as(
        "SELECT user_id, notification_type FROM notifications WHERE entity_id = $1",
    )
    .bind(candidate)
    .fetch_all(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(notified, vec![(reviewer, "mention".to_string())]);

    let events = queued_events(&ctx.db_pool, candidate).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].0, "comment_added");
    assert_eq!(events[0].1["comment_id"], body["id"]);
}

#[tokio::test]
#[ignore]
#[serial]
async fn test_anonymize_scrubs_candidate_once() {
    let ctx = TestContext::new().await;
    let candidate = insert_candidate(&ctx.db_pool, "rejected", json!([])).await;
    sqlx::query("INSERT INTO comments (id, candidate_id, body) VALUES ($1, $2, 'Reach her at ada@example.com')")
        .bind(Uuid::new_v4())
        .bind(candidate)
        .execute(&ctx.db_pool)
        .await
        .unwrap();

    let uri = format!("/api/v1/candidates/{}/anonymize", candidate);
    let app = app_with_pool(ctx.db_pool.clone());

    let (status, body) = send_json(app.clone(), "POST", &uri, json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["first_name"], "Anonymized");
    assert_eq!(body["email"], Value::Null);
    assert!(body["anonymized_at"].is_string());

    let (email, anonymized): (Option<String>, bool) =
        sqlx::query_as("SELECT email, anonymized_at IS NOT NULL FROM candidates WHERE id = $1")
            .bind(candidate)
            .fetch_one(&ctx.db_pool)
            .await
            .unwrap();
    assert_eq!(email, None);
    assert!(anonymized);

    let comment: String = sqlx::query_scalar("SELECT body FROM comments WHERE candidate_id = $1")
        .bind(candidate)
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(comment, "Reach her at [redacted]");

    let (status, body) = send_json(app, "POST", &uri, json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "CONFLICT");
}
