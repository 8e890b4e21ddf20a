//! Batch pipeline: dispatch identifiers, run test jobs, aggregate the results.

pub mod aggregator;
pub mod dispatcher;
pub mod entry;
pub mod runner;
pub mod worker;

/// Task name the dispatcher enqueues and the runner routes to [`worker::TestJobWorker`].
pub const PERFORM_TASK: &str = "isbn_test.perform";

pub use aggregator::{Report, ResultAggregator};
pub use dispatcher::{dedupe, load_identifiers, TestJobDispatcher};
pub use entry::{PhaseRecord, StoredEntry};
pub use runner::{handle_job, run_worker, shutdown_on_ctrl_c, RunSummary, WorkerOptions};
pub use worker::TestJobWorker;
