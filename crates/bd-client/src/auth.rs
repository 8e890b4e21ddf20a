//! Two-step patron session protocol.
//!
//! `authenticate` trades a patron barcode for an unconfirmed
//! [`AuthenticationHandle`]. `authorize` consumes that handle and either
//! confirms it, yielding the [`ConfirmedHandle`] that catalog operations
//! require, or hands it back as rejected. An unconfirmed handle has no path
//! into a search or request call.

use reqwest::StatusCode;
use tracing::{info, instrument, warn};

use crate::error::BorrowDirectError;
use crate::types::{
    AuthenticationRequest, AuthenticationResponse, AuthorizationResponse, ProblemEnvelope,
    RemoteProblem,
};

/// Length of the handles the deployed API issues.
///
/// A different length is logged as a sign the remote contract moved; it is
/// not treated as a failure.
pub const EXPECTED_HANDLE_LEN: usize = 27;

/// A handle issued by `authenticate` that has not been confirmed yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationHandle(String);

impl AuthenticationHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn has_expected_length(&self) -> bool {
        self.0.len() == EXPECTED_HANDLE_LEN
    }
}

/// A handle the service accepted during `authorize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedHandle(String);

impl ConfirmedHandle {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Outcome of `authorize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    Confirmed(ConfirmedHandle),
    /// The service declined the handle. Kept only so it can be logged.
    Rejected(AuthenticationHandle),
}

impl Authorization {
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// The raw handle string, whichever way authorization went.
    #[must_use]
    pub fn authorization_id(&self) -> &str {
        match self {
            Self::Confirmed(handle) => handle.as_str(),
            Self::Rejected(handle) => handle.as_str(),
        }
    }

    #[must_use]
    pub fn into_confirmed(self) -> Option<ConfirmedHandle> {
        match self {
            Self::Confirmed(handle) => Some(handle),
            Self::Rejected(_) => None,
        }
    }
}

/// Performs the authenticate/authorize exchange against one API root.
#[derive(Debug, Clone)]
pub struct SessionAuthenticator {
    client: reqwest::Client,
    partnership_id: Option<String>,
}

impl SessionAuthenticator {
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            partnership_id: None,
        }
    }

    /// Scope authentication to a partnership. Without one the field is left
    /// out of the request body.
    #[must_use]
    pub fn with_partnership_id(mut self, id: impl Into<String>) -> Self {
        self.partnership_id = Some(id.into());
        self
    }

    /// Obtain an unconfirmed handle for a patron.
    ///
    /// # Errors
    ///
    /// - [`BorrowDirectError::Authentication`] if the service refuses the
    ///   barcode/university pair or answers without a handle
    /// - [`BorrowDirectError::Transport`] on network failure
    /// - [`BorrowDirectError::RemoteService`] on any other non-success status
    #[instrument(skip(self, patron_barcode), fields(university = university_code))]
    pub async fn authenticate(
        &self,
        patron_barcode: &str,
        api_root: &str,
        university_code: &str,
    ) -> Result<AuthenticationHandle, BorrowDirectError> {
        let url = format!("{api_root}/portal-service/user/authentication");

        let response = self
            .client
            .post(&url)
            .json(&AuthenticationRequest {
                patron_id: patron_barcode,
                library_symbol: university_code,
                partnership_id: self.partnership_id.as_deref(),
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: AuthenticationResponse = response.json().await?;
        if let Some(problem) = body.problem {
            return Err(BorrowDirectError::authentication(
                RemoteProblem::from(problem).to_string(),
            ));
        }

        let handle = body
            .authorization_id
            .filter(|id| !id.is_empty())
            .map(AuthenticationHandle)
            .ok_or_else(|| {
                BorrowDirectError::authentication("authentication response carried no AuthorizationId")
            })?;

        if !handle.has_expected_length() {
            warn!(
                handle_len = handle.as_str().len(),
                expected = EXPECTED_HANDLE_LEN,
                "authentication handle length differs from the deployed API contract"
            );
        }

        info!(handle = handle.as_str(), "patron authenticated");
        Ok(handle)
    }

    /// Ask the service to confirm (and extend) a handle.
    ///
    /// An explicit refusal is `Ok(Authorization::Rejected(..))`, not an error.
    ///
    /// # Errors
    ///
    /// - [`BorrowDirectError::Transport`] on network failure
    /// - [`BorrowDirectError::RemoteService`] if the response lacks the
    ///   authorization state or has an unexpected status
    #[instrument(skip(self, handle), fields(handle = handle.as_str()))]
    pub async fn authorize(
        &self,
        api_root: &str,
        handle: AuthenticationHandle,
    ) -> Result<Authorization, BorrowDirectError> {
        let url = format!("{api_root}/portal-service/user/authz/isAuthorized");

        let response = self
            .client
            .get(&url)
            .query(&[("aid", handle.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "handle refused");
            return Ok(Authorization::Rejected(handle));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: AuthorizationResponse = response.json().await?;
        let state = body.authorization_state.ok_or_else(|| {
            BorrowDirectError::remote(status.as_u16(), "authorization response lacks 'AuthorizationState'")
        })?;

        if state.state {
            info!("handle confirmed");
            Ok(Authorization::Confirmed(ConfirmedHandle(handle.0)))
        } else {
            warn!("handle not currently valid");
            Ok(Authorization::Rejected(handle))
        }
    }

    /// `authenticate` followed by `authorize`, returning only a confirmed handle.
    ///
    /// # Errors
    ///
    /// Everything `authenticate` and `authorize` return, plus
    /// [`BorrowDirectError::Authentication`] when the fresh handle is rejected.
    pub async fn confirmed_session(
        &self,
        patron_barcode: &str,
        api_root: &str,
        university_code: &str,
    ) -> Result<ConfirmedHandle, BorrowDirectError> {
        let handle = self
            .authenticate(patron_barcode, api_root, university_code)
            .await?;

        match self.authorize(api_root, handle).await? {
            Authorization::Confirmed(confirmed) => Ok(confirmed),
            Authorization::Rejected(rejected) => Err(BorrowDirectError::authentication(format!(
                "handle {} was not authorized",
                rejected.as_str()
            ))),
        }
    }
}

/// Map a non-success response to the error taxonomy.
///
/// 401/403 are credential or session refusals; everything else is the
/// service failing to honor its contract.
pub(crate) fn classify_failure(status: StatusCode, body: &str) -> BorrowDirectError {
    let problem = serde_json::from_str::<ProblemEnvelope>(body)
        .ok()
        .and_then(|envelope| envelope.problem)
        .map(RemoteProblem::from);

    let message = problem.map_or_else(|| body.to_string(), |problem| problem.to_string());

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        BorrowDirectError::authentication(message)
    } else {
        BorrowDirectError::remote(status.as_u16(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_length_check() {
        let handle = AuthenticationHandle("x".repeat(EXPECTED_HANDLE_LEN));
        assert!(handle.has_expected_length());
        assert!(!AuthenticationHandle("short".into()).has_expected_length());
    }

    #[test]
    fn rejected_authorization_is_not_valid() {
        let rejected = Authorization::Rejected(AuthenticationHandle("abc".into()));
        assert!(!rejected.is_valid());
        assert_eq!(rejected.authorization_id(), "abc");
        assert!(rejected.into_confirmed().is_none());

        let confirmed = Authorization::Confirmed(ConfirmedHandle("abc".into()));
        assert!(confirmed.is_valid());
        assert!(confirmed.into_confirmed().is_some());
    }

    #[test]
    fn forbidden_with_problem_is_authentication_error() {
        let body = r#"{"Problem": {"ErrorCode": "PUAUTH001", "ErrorMessage": "Invalid patron"}}"#;
        let err = classify_failure(StatusCode::FORBIDDEN, body);
        assert!(
            matches!(err, BorrowDirectError::Authentication { ref message } if message.contains("PUAUTH001"))
        );
    }

    #[test]
    fn server_error_is_remote_service_error() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "upstream down");
        assert!(matches!(
            err,
            BorrowDirectError::RemoteService { status: 502, ref message } if message == "upstream down"
        ));
    }
}
