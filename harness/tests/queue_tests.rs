//! `PgJobQueue` delivery rules against a real Postgres container.

mod common;

use std::time::Duration;

use bd_harness::queue::{JobQueue, PgJobQueue, QueueError};
use bd_test_macros::shared_runtime_test;
use common::test_db::{get_test_db, unique_name};
use serde_json::json;

const TASK: &str = "isbn_test.perform";

async fn job_status(pool: &sqlx::PgPool, id: uuid::Uuid) -> (String, i32, Option<String>) {
    sqlx::query_as("SELECT status, attempts, last_error FROM harness_jobs WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

#[shared_runtime_test]
async fn claims_fifo_and_completes() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 3);
    let name = unique_name("q");

    let first = queue
        .enqueue(&name, TASK, json!({"isbn": "0307269706"}), Duration::from_secs(600))
        .await
        .unwrap();
    let second = queue
        .enqueue(&name, TASK, json!({"isbn": "9780688002305"}), Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(queue.pending(&name).await.unwrap(), 2);

    let job = queue.claim(&name).await.unwrap().unwrap();
    assert_eq!(job.id, first);
    assert_eq!(job.task_name, TASK);
    assert_eq!(job.kwargs, json!({"isbn": "0307269706"}));
    assert_eq!(job.attempt, 1);
    assert_eq!(job.timeout, Duration::from_secs(600));

    assert_eq!(queue.claim(&name).await.unwrap().unwrap().id, second);
    assert!(queue.claim(&name).await.unwrap().is_none());

    assert!(queue.complete(&job).await.unwrap());
    assert_eq!(job_status(db.pool(), first).await.0, "finished");
    assert_eq!(queue.pending(&name).await.unwrap(), 1);
}

#[shared_runtime_test]
async fn failure_requeues_until_max_attempts() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 2);
    let name = unique_name("q");

    let id = queue
        .enqueue(&name, TASK, json!({"isbn": "1"}), Duration::from_secs(600))
        .await
        .unwrap();

    let job = queue.claim(&name).await.unwrap().unwrap();
    assert!(queue.fail(&job, "search failed").await.unwrap());
    assert_eq!(job_status(db.pool(), id).await.0, "queued");

    let job = queue.claim(&name).await.unwrap().unwrap();
    assert_eq!(job.attempt, 2);
    assert!(queue.fail(&job, "search failed again").await.unwrap());

    let (status, attempts, last_error) = job_status(db.pool(), id).await;
    assert_eq!(status, "failed");
    assert_eq!(attempts, 2);
    assert_eq!(last_error.as_deref(), Some("search failed again"));
    assert!(queue.claim(&name).await.unwrap().is_none());
    assert_eq!(queue.pending(&name).await.unwrap(), 0);
}

#[shared_runtime_test]
async fn expired_lease_is_redelivered() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 3);
    let name = unique_name("q");

    let id = queue
        .enqueue(&name, TASK, json!({"isbn": "1"}), Duration::from_secs(1))
        .await
        .unwrap();
    queue.claim(&name).await.unwrap().unwrap();
    assert!(queue.claim(&name).await.unwrap().is_none());

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    let again = queue.claim(&name).await.unwrap().unwrap();
    assert_eq!(again.id, id);
    assert_eq!(again.attempt, 2);
}

#[shared_runtime_test]
async fn expired_lease_on_last_attempt_fails_the_job() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 1);
    let name = unique_name("q");

    let id = queue
        .enqueue(&name, TASK, json!({"isbn": "1"}), Duration::from_secs(1))
        .await
        .unwrap();
    queue.claim(&name).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert!(queue.claim(&name).await.unwrap().is_none());
    assert_eq!(job_status(db.pool(), id).await.0, "failed");
}

#[shared_runtime_test]
async fn late_ack_from_lapsed_delivery_changes_nothing() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 3);
    let name = unique_name("q");

    let id = queue
        .enqueue(&name, TASK, json!({"isbn": "1"}), Duration::from_secs(1))
        .await
        .unwrap();
    let first = queue.claim(&name).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let second = queue.claim(&name).await.unwrap().unwrap();
    assert_eq!(second.attempt, 2);

    assert!(!queue.fail(&first, "slow worker gave up").await.unwrap());
    assert!(!queue.complete(&first).await.unwrap());
    assert!(queue.claim(&name).await.unwrap().is_none());

    let (status, attempts, last_error) = job_status(db.pool(), id).await;
    assert_eq!(status, "running");
    assert_eq!(attempts, 2);
    assert_eq!(last_error, None);

    assert!(queue.complete(&second).await.unwrap());
    assert_eq!(job_status(db.pool(), id).await.0, "finished");
}

#[shared_runtime_test]
async fn concurrent_claims_never_share_a_job() {
    let db = get_test_db().await;
    let queue = std::sync::Arc::new(PgJobQueue::new(db.pool().clone(), 3));
    let name = unique_name("q");

    for i in 0..10 {
        queue
            .enqueue(&name, TASK, json!({"isbn": i.to_string()}), Duration::from_secs(600))
            .await
            .unwrap();
    }

    let mut claims = tokio::task::JoinSet::new();
    for _ in 0..4 {
        let queue = queue.clone();
        let name = name.clone();
        claims.spawn(async move {
            let mut ids = Vec::new();
            while let Some(job) = queue.claim(&name).await.unwrap() {
                ids.push(job.id);
            }
            ids
        });
    }

    let mut all = Vec::new();
    while let Some(ids) = claims.join_next().await {
        all.extend(ids.unwrap());
    }
    let total = all.len();
    all.sort();
    all.dedup();
    assert_eq!(total, 10);
    assert_eq!(all.len(), 10);
}

#[shared_runtime_test]
async fn zero_timeout_is_rejected() {
    let db = get_test_db().await;
    let queue = PgJobQueue::new(db.pool().clone(), 3);

    let result = queue
        .enqueue(&unique_name("q"), TASK, json!({}), Duration::from_millis(500))
        .await;
    assert!(matches!(result, Err(QueueError::InvalidTimeout(_))));
}
