//! The per-identifier record the phases of one job accumulate.

use bd_client::{RequestResult, SearchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One phase's result plus when it finished and how long it took.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseRecord<T> {
    #[serde(flatten)]
    pub result: T,
    pub elapsed_ms: u64,
    pub completed_at: DateTime<Utc>,
}

impl<T> PhaseRecord<T> {
    pub const fn new(result: T, elapsed_ms: u64, completed_at: DateTime<Utc>) -> Self {
        Self {
            result,
            elapsed_ms,
            completed_at,
        }
    }
}

/// Stored value for one identifier.
///
/// `request_result` is only ever written into an entry that already has a
/// `search_result`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoredEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_result: Option<PhaseRecord<SearchResult>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_result: Option<PhaseRecord<RequestResult>>,
}

impl StoredEntry {
    /// Replace the search result, keeping whatever request result is there.
    #[must_use]
    pub fn with_search(self, search: PhaseRecord<SearchResult>) -> Self {
        Self {
            search_result: Some(search),
            ..self
        }
    }

    #[must_use]
    pub fn with_request(self, request: PhaseRecord<RequestResult>) -> Self {
        Self {
            request_result: Some(request),
            ..self
        }
    }

    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
