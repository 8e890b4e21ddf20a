//! Errors raised by the batch pipeline.

use std::fmt;

use bd_client::BorrowDirectError;

use crate::queue::QueueError;
use crate::store::StoreError;

/// Which remote step of a test job was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Search,
    Request,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Request => "request",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("{phase} failed for {identifier}: {source}")]
    Client {
        identifier: String,
        phase: Phase,
        #[source]
        source: BorrowDirectError,
    },

    /// A request result arrived for an identifier whose stored entry has no
    /// search result.
    #[error("no search result stored for {identifier} at request time")]
    DataIntegrity { identifier: String },

    /// The batch namespace is not in a state a new run can start from.
    #[error("batch setup failed: {0}")]
    Setup(String),

    #[error("stored entry for {identifier} is not valid JSON: {source}")]
    CorruptEntry {
        identifier: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("cannot read identifiers from {path}: {source}")]
    Input {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// A known task whose arguments do not have the expected shape.
    #[error("invalid task arguments: {0}")]
    InvalidTask(String),

    #[error("worker loop aborted: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl HarnessError {
    pub(crate) fn client(identifier: &str, phase: Phase, source: BorrowDirectError) -> Self {
        Self::Client {
            identifier: identifier.to_string(),
            phase,
            source,
        }
    }
}
