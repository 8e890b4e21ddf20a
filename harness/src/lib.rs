//! Batch ISBN test harness for the BorrowDirect API.
//!
//! A run has three steps, each a subcommand of the `bd-harness` binary:
//!
//! 1. [`pipeline::TestJobDispatcher`] reads identifiers and enqueues one job each
//! 2. [`pipeline::run_worker`] claims jobs and runs [`pipeline::TestJobWorker`]
//!    (search, then request) against the remote service
//! 3. [`pipeline::ResultAggregator`] writes every stored entry to a JSON report
//!
//! Jobs live in a Postgres-backed [`queue::JobQueue`] and results in a
//! [`store::ResultStore`]; both have in-memory versions behind `test-utils`.

#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod queue;
pub mod store;
