//! Worker process: claim queued jobs and run them until told to stop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::worker::TestJobWorker;
use super::PERFORM_TASK;
use crate::error::HarnessError;
use crate::queue::{ClaimedJob, JobQueue, QueueError};

/// Consecutive failed claims after which a loop gives up.
const MAX_CLAIM_ERRORS: u32 = 5;

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Exit once the queue has nothing left to claim.
    pub burst: bool,
}

/// Deliveries handled by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub failed: u64,
    /// Deliveries whose lease lapsed before they reported back; the queue
    /// ignored their outcome.
    pub superseded: u64,
}

impl RunSummary {
    const fn merge(self, other: Self) -> Self {
        Self {
            completed: self.completed + other.completed,
            failed: self.failed + other.failed,
            superseded: self.superseded + other.superseded,
        }
    }
}

/// A shutdown channel that flips to `true` on Ctrl-C.
#[must_use]
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested; finishing in-flight jobs");
            if tx.send(true).is_err() {
                warn!("no worker loops left to notify");
            }
        }
    });
    rx
}

/// Run `options.concurrency` claim loops against `queue_name`.
///
/// A job in flight when shutdown is signalled runs to completion. A loop that
/// stops early does not cut the others short; every loop is awaited before
/// the first failure is returned.
///
/// # Errors
/// A loop that could not claim `MAX_CLAIM_ERRORS` times in a row, or a loop
/// that panicked.
pub async fn run_worker(
    queue: Arc<dyn JobQueue>,
    worker: Arc<TestJobWorker>,
    queue_name: &str,
    options: WorkerOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<RunSummary, HarnessError> {
    info!(
        queue = queue_name,
        concurrency = options.concurrency,
        burst = options.burst,
        "worker starting"
    );

    let mut loops = JoinSet::new();
    for slot in 0..options.concurrency.max(1) {
        loops.spawn(claim_loop(
            slot,
            queue.clone(),
            worker.clone(),
            queue_name.to_string(),
            options.clone(),
            shutdown.clone(),
        ));
    }

    let mut summary = RunSummary::default();
    let mut first_error: Option<HarnessError> = None;
    while let Some(joined) = loops.join_next().await {
        match joined.map_err(HarnessError::from).and_then(|outcome| outcome) {
            Ok(loop_summary) => summary = summary.merge(loop_summary),
            Err(err) => {
                error!(error = %err, "claim loop stopped");
                first_error.get_or_insert(err);
            }
        }
    }

    info!(
        completed = summary.completed,
        failed = summary.failed,
        superseded = summary.superseded,
        "worker stopped"
    );
    first_error.map_or(Ok(summary), Err)
}

async fn claim_loop(
    slot: usize,
    queue: Arc<dyn JobQueue>,
    worker: Arc<TestJobWorker>,
    queue_name: String,
    options: WorkerOptions,
    mut shutdown: watch::Receiver<bool>,
) -> Result<RunSummary, HarnessError> {
    let mut summary = RunSummary::default();
    let mut claim_errors = 0;

    loop {
        if *shutdown.borrow() {
            break;
        }

        let claimed = match queue.claim(&queue_name).await {
            Ok(claimed) => {
                claim_errors = 0;
                claimed
            }
            Err(err) => {
                claim_errors += 1;
                warn!(slot, attempt = claim_errors, error = %err, "claim failed");
                if claim_errors >= MAX_CLAIM_ERRORS {
                    return Err(err.into());
                }
                None
            }
        };

        let Some(job) = claimed else {
            if options.burst && claim_errors == 0 {
                break;
            }
            tokio::select! {
                () = tokio::time::sleep(options.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
            continue;
        };

        let acknowledged = match tokio::time::timeout(job.timeout, handle_job(&worker, &job)).await {
            Ok(Ok(())) => queue.complete(&job).await.map(|current| (current, true)),
            Ok(Err(err)) => {
                log_failure(slot, &job, &err);
                queue.fail(&job, &err.to_string()).await.map(|current| (current, false))
            }
            Err(_) => {
                warn!(slot, job_id = %job.id, timeout = ?job.timeout, "job exceeded its timeout");
                queue.fail(&job, "job timed out").await.map(|current| (current, false))
            }
        };

        match acknowledged {
            Ok((true, true)) => summary.completed += 1,
            Ok((true, false)) => summary.failed += 1,
            Ok((false, _)) => {
                warn!(slot, job_id = %job.id, attempt = job.attempt, "lease lapsed; outcome superseded by a later delivery");
                summary.superseded += 1;
            }
            Err(err) => log_ack_failure(slot, &job, &err),
        }
    }

    Ok(summary)
}

/// The lease will lapse and the queue redeliver, so the loop carries on.
fn log_ack_failure(slot: usize, job: &ClaimedJob, err: &QueueError) {
    error!(slot, job_id = %job.id, attempt = job.attempt, error = %err, "could not acknowledge job");
}

/// Route a claimed job to its handler by task name.
///
/// # Errors
/// `UnknownTask` for an unrecognised task name, `InvalidTask` for missing
/// arguments, or whatever the handler returns.
pub async fn handle_job(worker: &TestJobWorker, job: &ClaimedJob) -> Result<(), HarnessError> {
    match job.task_name.as_str() {
        PERFORM_TASK => {
            let identifier = job
                .kwargs
                .get("isbn")
                .and_then(serde_json::Value::as_str)
                .ok_or_else(|| {
                    HarnessError::InvalidTask(format!("{PERFORM_TASK} needs a string isbn argument"))
                })?;
            worker.perform(identifier).await
        }
        other => Err(HarnessError::UnknownTask(other.to_string())),
    }
}

fn log_failure(slot: usize, job: &ClaimedJob, err: &HarnessError) {
    match err {
        HarnessError::Client {
            identifier,
            phase,
            source,
        } => error!(
            slot,
            job_id = %job.id,
            attempt = job.attempt,
            identifier = %identifier,
            %phase,
            error = %source,
            "remote call failed"
        ),
        HarnessError::DataIntegrity { identifier } => error!(
            slot,
            job_id = %job.id,
            identifier = %identifier,
            phase = "request",
            "request result has no search result to merge into"
        ),
        other => error!(slot, job_id = %job.id, attempt = job.attempt, error = %other, "job failed"),
    }
}
