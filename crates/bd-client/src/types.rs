//! Domain records returned by the client, and the JSON shapes of the API.
//!
//! The API speaks `PascalCase` JSON; records handed to callers are plain
//! `snake_case` structs so they can be stored and reported as-is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::BorrowDirectError;

/// Kind of catalog identifier an exact search is keyed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IdentifierType {
    Isbn,
    Issn,
    Oclc,
    Lccn,
}

impl IdentifierType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isbn => "ISBN",
            Self::Issn => "ISSN",
            Self::Oclc => "OCLC",
            Self::Lccn => "LCCN",
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentifierType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ISBN" => Ok(Self::Isbn),
            "ISSN" => Ok(Self::Issn),
            "OCLC" => Ok(Self::Oclc),
            "LCCN" => Ok(Self::Lccn),
            other => Err(format!("unknown identifier type '{other}'")),
        }
    }
}

/// A location a requested item can be delivered to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PickupLocation {
    pub code: String,
    pub description: Option<String>,
}

/// Availability of one item, as reported by the search endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Identifier value the search was run for.
    pub identifier: String,
    pub authorization_id: String,
    pub available: bool,
    pub pickup_locations: Vec<PickupLocation>,
    pub search_term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_link: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_records: Option<u32>,
}

/// Problem object the API attaches to refusals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProblem {
    pub code: Option<String>,
    pub message: Option<String>,
}

impl fmt::Display for RemoteProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}",
            self.code.as_deref().unwrap_or("unknown"),
            self.message.as_deref().unwrap_or("no message")
        )
    }
}

/// Outcome of placing a hold on one item.
///
/// A refusal the service reports in a successful response (item not
/// requestable, already requested, ...) is an outcome, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResult {
    pub identifier: String,
    pub request_number: Option<String>,
    pub problem: Option<RemoteProblem>,
}

impl RequestResult {
    /// Whether the service confirmed the hold with a request number.
    #[must_use]
    pub const fn is_placed(&self) -> bool {
        self.request_number.is_some()
    }
}

/// Result of a standalone authenticate/authorize round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthNzOutcome {
    pub valid: bool,
    /// Handle issued during the round, kept for diagnostics.
    pub authorization_id: String,
}

// Wire shapes

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WireProblem {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl From<WireProblem> for RemoteProblem {
    fn from(problem: WireProblem) -> Self {
        Self {
            code: problem.error_code,
            message: problem.error_message,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ProblemEnvelope {
    pub problem: Option<WireProblem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AuthenticationRequest<'a> {
    pub patron_id: &'a str,
    pub library_symbol: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partnership_id: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AuthenticationResponse {
    pub authorization_id: Option<String>,
    pub problem: Option<WireProblem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AuthorizationResponse {
    pub authorization_state: Option<AuthorizationState>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AuthorizationState {
    pub state: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ExactSearch<'a> {
    #[serde(rename = "Type")]
    pub kind: &'static str,
    pub value: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AvailabilityQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partnership_id: Option<&'a str>,
    pub exact_search: Vec<ExactSearch<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AddItemQuery<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partnership_id: Option<&'a str>,
    pub pickup_location: &'a str,
    pub exact_search: Vec<ExactSearch<'a>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AvailabilityResponse {
    pub item: Option<ItemAvailability>,
    pub problem: Option<WireProblem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct ItemAvailability {
    pub authorization_id: Option<String>,
    pub available: Option<bool>,
    pub pickup_locations: Option<Vec<WirePickupLocation>>,
    pub search_term: Option<String>,
    pub request_link: Option<serde_json::Value>,
    pub number_of_records: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct WirePickupLocation {
    pub pickup_location_code: String,
    pub pickup_location_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct AddItemResponse {
    pub request: Option<PlacedRequest>,
    pub problem: Option<WireProblem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct PlacedRequest {
    pub request_number: Option<String>,
}

impl ItemAvailability {
    /// Check the availability fields are all present.
    pub(crate) fn into_search_result(
        self,
        identifier: &str,
        status: u16,
    ) -> Result<SearchResult, BorrowDirectError> {
        let missing = |field: &str| {
            BorrowDirectError::remote(status, format!("availability response lacks '{field}'"))
        };

        Ok(SearchResult {
            identifier: identifier.to_string(),
            authorization_id: self.authorization_id.ok_or_else(|| missing("AuthorizationId"))?,
            available: self.available.ok_or_else(|| missing("Available"))?,
            pickup_locations: self
                .pickup_locations
                .ok_or_else(|| missing("PickupLocations"))?
                .into_iter()
                .map(|location| PickupLocation {
                    code: location.pickup_location_code,
                    description: location.pickup_location_description,
                })
                .collect(),
            search_term: self.search_term.ok_or_else(|| missing("SearchTerm"))?,
            request_link: self.request_link,
            number_of_records: self.number_of_records,
        })
    }
}
