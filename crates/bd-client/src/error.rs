//! Errors surfaced by the BorrowDirect client.

use thiserror::Error;

/// Errors that can occur when talking to the BorrowDirect API.
///
/// Nothing in this crate retries on any of these; callers own the retry policy.
#[derive(Debug, Error)]
pub enum BorrowDirectError {
    /// Network or HTTP-level failure (connect, timeout, undecodable body).
    #[error("transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    /// The remote service rejected the patron credentials or the session.
    #[error("authentication rejected: {message}")]
    Authentication { message: String },

    /// A response arrived but did not carry the fields this client depends on.
    #[error("remote service error ({status}): {message}")]
    RemoteService { status: u16, message: String },

    /// An operation needs a setting that was never configured.
    #[error("missing client setting: {0}")]
    MissingSetting(&'static str),
}

impl BorrowDirectError {
    pub(crate) fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub(crate) fn remote(status: u16, message: impl Into<String>) -> Self {
        Self::RemoteService {
            status,
            message: message.into(),
        }
    }
}
