//! At-least-once work queue.
//!
//! A claimed job carries a lease as long as its timeout. Jobs whose lease
//! lapses become claimable again, and failed jobs go back to the queue until
//! they have used up their attempts. Handlers must therefore be idempotent.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::PgPool;
use uuid::Uuid;

/// Errors from queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("job timeout {0:?} does not fit the queue's range")]
    InvalidTimeout(Duration),
}

/// A job handed to a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimedJob {
    pub id: Uuid,
    pub task_name: String,
    pub kwargs: Value,
    /// Delivery number, starting at 1.
    pub attempt: u32,
    pub timeout: Duration,
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Submit one task. `timeout` is the ceiling a single delivery may run.
    async fn enqueue(
        &self,
        queue: &str,
        task_name: &str,
        kwargs: Value,
        timeout: Duration,
    ) -> Result<Uuid, QueueError>;

    /// Take the oldest claimable job, if any.
    async fn claim(&self, queue: &str) -> Result<Option<ClaimedJob>, QueueError>;

    /// Mark a delivery finished.
    ///
    /// Returns `false` when the delivery is stale: its lease lapsed and the job
    /// was claimed again or settled since. A stale acknowledgement changes nothing.
    async fn complete(&self, job: &ClaimedJob) -> Result<bool, QueueError>;

    /// Record a failed delivery. The job is redelivered unless it is out of attempts.
    ///
    /// Returns `false`, changing nothing, for a stale delivery.
    async fn fail(&self, job: &ClaimedJob, error: &str) -> Result<bool, QueueError>;

    /// Jobs queued or in flight.
    async fn pending(&self, queue: &str) -> Result<u64, QueueError>;
}

/// `PostgreSQL` implementation of [`JobQueue`].
pub struct PgJobQueue {
    pool: PgPool,
    max_attempts: i32,
}

impl PgJobQueue {
    #[must_use]
    pub fn new(pool: PgPool, max_attempts: u32) -> Self {
        Self {
            pool,
            max_attempts: i32::try_from(max_attempts).unwrap_or(i32::MAX),
        }
    }
}

#[async_trait]
impl JobQueue for PgJobQueue {
    async fn enqueue(
        &self,
        queue: &str,
        task_name: &str,
        kwargs: Value,
        timeout: Duration,
    ) -> Result<Uuid, QueueError> {
        let timeout_secs = i32::try_from(timeout.as_secs())
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or(QueueError::InvalidTimeout(timeout))?;
        let id = Uuid::new_v4();

        sqlx::query(
            r"
            INSERT INTO harness_jobs (id, queue, task_name, kwargs, timeout_secs)
            VALUES ($1, $2, $3, $4, $5)
            ",
        )
        .bind(id)
        .bind(queue)
        .bind(task_name)
        .bind(Json(kwargs))
        .bind(timeout_secs)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn claim(&self, queue: &str) -> Result<Option<ClaimedJob>, QueueError> {
        // Lapsed leases on a final attempt are dead; everything else lapsed is fair game.
        sqlx::query(
            r"
            UPDATE harness_jobs
            SET status = 'failed',
                last_error = 'lease expired on final attempt',
                lease_expires_at = NULL,
                finished_at = clock_timestamp()
            WHERE queue = $1
              AND status = 'running'
              AND lease_expires_at < clock_timestamp()
              AND attempts >= $2
            ",
        )
        .bind(queue)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query_as::<_, (Uuid, String, Json<Value>, i32, i32)>(
            r"
            UPDATE harness_jobs
            SET status = 'running',
                attempts = attempts + 1,
                lease_expires_at = clock_timestamp() + make_interval(secs => timeout_secs::float8)
            WHERE id = (
                SELECT id FROM harness_jobs
                WHERE queue = $1
                  AND (status = 'queued'
                       OR (status = 'running' AND lease_expires_at < clock_timestamp()))
                ORDER BY enqueued_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, task_name, kwargs, attempts, timeout_secs
            ",
        )
        .bind(queue)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, task_name, Json(kwargs), attempts, timeout_secs)| ClaimedJob {
            id,
            task_name,
            kwargs,
            attempt: u32::try_from(attempts).unwrap_or(0),
            timeout: Duration::from_secs(u64::try_from(timeout_secs).unwrap_or(0)),
        }))
    }

    async fn complete(&self, job: &ClaimedJob) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r"
            UPDATE harness_jobs
            SET status = 'finished', lease_expires_at = NULL, finished_at = clock_timestamp()
            WHERE id = $1 AND status = 'running' AND attempts = $2
            ",
        )
        .bind(job.id)
        .bind(delivery_number(job))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn fail(&self, job: &ClaimedJob, error: &str) -> Result<bool, QueueError> {
        let result = sqlx::query(
            r"
            UPDATE harness_jobs
            SET status = CASE WHEN attempts >= $4 THEN 'failed' ELSE 'queued' END,
                finished_at = CASE WHEN attempts >= $4 THEN clock_timestamp() END,
                last_error = $3,
                lease_expires_at = NULL
            WHERE id = $1 AND status = 'running' AND attempts = $2
            ",
        )
        .bind(job.id)
        .bind(delivery_number(job))
        .bind(error)
        .bind(self.max_attempts)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn pending(&self, queue: &str) -> Result<u64, QueueError> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM harness_jobs WHERE queue = $1 AND status IN ('queued', 'running')",
        )
        .bind(queue)
        .fetch_one(&self.pool)
        .await?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

fn delivery_number(job: &ClaimedJob) -> i32 {
    i32::try_from(job.attempt).unwrap_or(i32::MAX)
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
pub mod mock {
    //! In-memory queue for unit testing.
    //!
    //! Same delivery rules as the Postgres queue, minus persistence.

    use super::{async_trait, ClaimedJob, Duration, JobQueue, QueueError, Uuid, Value};
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum JobStatus {
        Queued,
        Running,
        Finished,
        Failed,
    }

    #[derive(Debug, Clone)]
    pub struct JobRecord {
        pub id: Uuid,
        pub queue: String,
        pub task_name: String,
        pub kwargs: Value,
        pub timeout: Duration,
        pub status: JobStatus,
        pub attempts: u32,
        pub last_error: Option<String>,
        lease_expires_at: Option<Instant>,
    }

    pub struct MemoryJobQueue {
        jobs: Mutex<Vec<JobRecord>>,
        max_attempts: u32,
    }

    impl MemoryJobQueue {
        #[must_use]
        pub const fn new(max_attempts: u32) -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                max_attempts,
            }
        }

        /// Snapshot of every job ever enqueued, in enqueue order.
        pub fn jobs(&self) -> Vec<JobRecord> {
            self.jobs.lock().unwrap().clone()
        }

        /// Let every running lease lapse, as if the workers had hung.
        pub fn expire_leases(&self) {
            let now = Instant::now();
            for job in self.jobs.lock().unwrap().iter_mut() {
                if job.status == JobStatus::Running {
                    job.lease_expires_at = Some(now);
                }
            }
        }
    }

    impl Default for MemoryJobQueue {
        fn default() -> Self {
            Self::new(3)
        }
    }

    fn is_current(job: &JobRecord, delivery: &ClaimedJob) -> bool {
        job.id == delivery.id
            && job.status == JobStatus::Running
            && job.attempts == delivery.attempt
    }

    fn lapsed(job: &JobRecord, now: Instant) -> bool {
        job.status == JobStatus::Running && job.lease_expires_at.is_some_and(|at| at <= now)
    }

    #[async_trait]
    impl JobQueue for MemoryJobQueue {
        async fn enqueue(
            &self,
            queue: &str,
            task_name: &str,
            kwargs: Value,
            timeout: Duration,
        ) -> Result<Uuid, QueueError> {
            if timeout.as_secs() == 0 {
                return Err(QueueError::InvalidTimeout(timeout));
            }
            let id = Uuid::new_v4();
            self.jobs.lock().unwrap().push(JobRecord {
                id,
                queue: queue.to_string(),
                task_name: task_name.to_string(),
                kwargs,
                timeout,
                status: JobStatus::Queued,
                attempts: 0,
                last_error: None,
                lease_expires_at: None,
            });
            Ok(id)
        }

        async fn claim(&self, queue: &str) -> Result<Option<ClaimedJob>, QueueError> {
            let now = Instant::now();
            let mut jobs = self.jobs.lock().unwrap();

            for job in jobs.iter_mut() {
                if job.queue == queue && lapsed(job, now) && job.attempts >= self.max_attempts {
                    job.status = JobStatus::Failed;
                    job.last_error = Some("lease expired on final attempt".to_string());
                    job.lease_expires_at = None;
                }
            }

            let Some(job) = jobs
                .iter_mut()
                .find(|job| job.queue == queue && (job.status == JobStatus::Queued || lapsed(job, now)))
            else {
                return Ok(None);
            };

            job.status = JobStatus::Running;
            job.attempts += 1;
            job.lease_expires_at = Some(now + job.timeout);

            Ok(Some(ClaimedJob {
                id: job.id,
                task_name: job.task_name.clone(),
                kwargs: job.kwargs.clone(),
                attempt: job.attempts,
                timeout: job.timeout,
            }))
        }

        async fn complete(&self, delivery: &ClaimedJob) -> Result<bool, QueueError> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.iter_mut().find(|j| is_current(j, delivery)) else {
                return Ok(false);
            };
            job.status = JobStatus::Finished;
            job.lease_expires_at = None;
            Ok(true)
        }

        async fn fail(&self, delivery: &ClaimedJob, error: &str) -> Result<bool, QueueError> {
            let mut jobs = self.jobs.lock().unwrap();
            let Some(job) = jobs.iter_mut().find(|j| is_current(j, delivery)) else {
                return Ok(false);
            };
            job.status = if job.attempts >= self.max_attempts {
                JobStatus::Failed
            } else {
                JobStatus::Queued
            };
            job.last_error = Some(error.to_string());
            job.lease_expires_at = None;
            Ok(true)
        }

        async fn pending(&self, queue: &str) -> Result<u64, QueueError> {
            let count = self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|job| {
                    job.queue == queue
                        && matches!(job.status, JobStatus::Queued | JobStatus::Running)
                })
                .count();
            Ok(count as u64)
        }
    }
}
