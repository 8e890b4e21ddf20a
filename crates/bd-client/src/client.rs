//! Catalog operations: availability search and item requests.
//!
//! The API is call-scoped, so every operation runs a fresh
//! authenticate/authorize round before touching the catalog. Handles are
//! never cached across calls.

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::auth::{classify_failure, ConfirmedHandle, SessionAuthenticator};
use crate::error::BorrowDirectError;
use crate::settings::ClientSettings;
use crate::types::{
    AddItemQuery, AddItemResponse, AuthNzOutcome, AvailabilityQuery, AvailabilityResponse,
    ExactSearch, IdentifierType, RemoteProblem, RequestResult, SearchResult,
};

/// Operations the harness needs from the interlending service.
///
/// Use [`HttpCatalogClient`] against a real server, or
/// [`mock::MockCatalogClient`] in unit tests.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Authenticate and authorize a patron without touching the catalog.
    async fn run_auth_nz(&self, patron_barcode: &str) -> Result<AuthNzOutcome, BorrowDirectError>;

    /// Look up availability of one item.
    async fn search(
        &self,
        patron_barcode: &str,
        identifier_type: IdentifierType,
        identifier: &str,
    ) -> Result<SearchResult, BorrowDirectError>;

    /// Place a hold on one item. A single attempt; no retry.
    async fn request_item(
        &self,
        patron_barcode: &str,
        identifier_type: IdentifierType,
        identifier: &str,
    ) -> Result<RequestResult, BorrowDirectError>;
}

/// HTTP implementation of [`CatalogClient`].
#[derive(Debug, Clone)]
pub struct HttpCatalogClient {
    client: reqwest::Client,
    authenticator: SessionAuthenticator,
    settings: ClientSettings,
}

impl HttpCatalogClient {
    /// Create a client from settings. Never fails; unset settings are only
    /// reported when an operation needs them.
    #[must_use]
    pub fn new(settings: ClientSettings) -> Self {
        Self::with_client(reqwest::Client::new(), settings)
    }

    /// Create a client with a custom `reqwest::Client` (timeouts, proxies, tests).
    #[must_use]
    pub fn with_client(client: reqwest::Client, settings: ClientSettings) -> Self {
        let mut authenticator = SessionAuthenticator::new(client.clone());
        if let Some(id) = &settings.partnership_id {
            authenticator = authenticator.with_partnership_id(id.as_str());
        }
        Self {
            authenticator,
            client,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    async fn session(&self, patron_barcode: &str) -> Result<ConfirmedHandle, BorrowDirectError> {
        let api_root = self.settings.require_api_root()?;
        let university_code = self.settings.require_university_code()?;
        self.authenticator
            .confirmed_session(patron_barcode, api_root, university_code)
            .await
    }
}

#[async_trait]
impl CatalogClient for HttpCatalogClient {
    #[instrument(skip(self, patron_barcode))]
    async fn run_auth_nz(&self, patron_barcode: &str) -> Result<AuthNzOutcome, BorrowDirectError> {
        let api_root = self.settings.require_api_root()?;
        let university_code = self.settings.require_university_code()?;

        let handle = self
            .authenticator
            .authenticate(patron_barcode, api_root, university_code)
            .await?;
        let authorization = self.authenticator.authorize(api_root, handle).await?;

        let outcome = AuthNzOutcome {
            valid: authorization.is_valid(),
            authorization_id: authorization.authorization_id().to_string(),
        };
        info!(
            valid = outcome.valid,
            handle = %outcome.authorization_id,
            "authn/z round finished"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, patron_barcode), fields(phase = "search"))]
    async fn search(
        &self,
        patron_barcode: &str,
        identifier_type: IdentifierType,
        identifier: &str,
    ) -> Result<SearchResult, BorrowDirectError> {
        let handle = self.session(patron_barcode).await?;
        let api_root = self.settings.require_api_root()?;
        let url = format!("{api_root}/dws/item/available");

        let response = self
            .client
            .post(&url)
            .query(&[("aid", handle.as_str())])
            .json(&AvailabilityQuery {
                partnership_id: self.settings.partnership_id.as_deref(),
                exact_search: vec![ExactSearch {
                    kind: identifier_type.as_str(),
                    value: identifier,
                }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: AvailabilityResponse = response.json().await?;
        let item = match (body.item, body.problem) {
            (Some(item), _) => item,
            (None, Some(problem)) => {
                return Err(BorrowDirectError::remote(
                    status.as_u16(),
                    RemoteProblem::from(problem).to_string(),
                ))
            }
            (None, None) => {
                return Err(BorrowDirectError::remote(
                    status.as_u16(),
                    "availability response lacks 'Item'",
                ))
            }
        };

        let result = item.into_search_result(identifier, status.as_u16())?;
        info!(
            available = result.available,
            pickup_locations = result.pickup_locations.len(),
            "search finished"
        );
        Ok(result)
    }

    #[instrument(skip(self, patron_barcode), fields(phase = "request"))]
    async fn request_item(
        &self,
        patron_barcode: &str,
        identifier_type: IdentifierType,
        identifier: &str,
    ) -> Result<RequestResult, BorrowDirectError> {
        let pickup_location = self.settings.require_pickup_location()?;
        let handle = self.session(patron_barcode).await?;
        let api_root = self.settings.require_api_root()?;
        let url = format!("{api_root}/dws/item/add");

        let response = self
            .client
            .post(&url)
            .query(&[("aid", handle.as_str())])
            .json(&AddItemQuery {
                partnership_id: self.settings.partnership_id.as_deref(),
                pickup_location,
                exact_search: vec![ExactSearch {
                    kind: identifier_type.as_str(),
                    value: identifier,
                }],
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_failure(status, &body));
        }

        let body: AddItemResponse = response.json().await?;
        let request_number = body.request.and_then(|request| request.request_number);
        let problem = body.problem.map(RemoteProblem::from);

        if request_number.is_none() && problem.is_none() {
            return Err(BorrowDirectError::remote(
                status.as_u16(),
                "request response carries neither 'Request' nor 'Problem'",
            ));
        }

        let result = RequestResult {
            identifier: identifier.to_string(),
            request_number,
            problem,
        };
        if let Some(problem) = &result.problem {
            warn!(%problem, "request refused by service");
        } else {
            info!(request_number = ?result.request_number, "request placed");
        }
        Ok(result)
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    clippy::missing_const_for_fn,
    clippy::must_use_candidate
)]
pub mod mock {
    //! Mock implementation for unit testing.

    use super::{
        AuthNzOutcome, BorrowDirectError, CatalogClient, IdentifierType, RequestResult,
        SearchResult,
    };
    use crate::types::PickupLocation;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    type Responder<T> = Box<dyn Fn(&str) -> Result<T, BorrowDirectError> + Send + Sync>;

    /// Mock implementation of `CatalogClient` for unit tests.
    ///
    /// By default every search finds the item available at one pickup
    /// location and every request is placed. Override per identifier with
    /// `fail_search_for` / `fail_request_for`, or replace the whole behavior
    /// with `on_search` / `on_request`. Calls are recorded in order.
    pub struct MockCatalogClient {
        auth_valid: Mutex<bool>,
        search_responder: Mutex<Option<Responder<SearchResult>>>,
        request_responder: Mutex<Option<Responder<RequestResult>>>,
        search_failures: Mutex<HashMap<String, String>>,
        request_failures: Mutex<HashMap<String, String>>,
        calls: Mutex<Vec<(String, String)>>,
    }

    impl MockCatalogClient {
        pub fn new() -> Self {
            Self {
                auth_valid: Mutex::new(true),
                search_responder: Mutex::new(None),
                request_responder: Mutex::new(None),
                search_failures: Mutex::new(HashMap::new()),
                request_failures: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
            }
        }

        /// Set whether `run_auth_nz` reports a valid patron.
        pub fn set_auth_valid(&self, valid: bool) {
            *self.auth_valid.lock().unwrap() = valid;
        }

        pub fn on_search(
            &self,
            f: impl Fn(&str) -> Result<SearchResult, BorrowDirectError> + Send + Sync + 'static,
        ) {
            *self.search_responder.lock().unwrap() = Some(Box::new(f));
        }

        pub fn on_request(
            &self,
            f: impl Fn(&str) -> Result<RequestResult, BorrowDirectError> + Send + Sync + 'static,
        ) {
            *self.request_responder.lock().unwrap() = Some(Box::new(f));
        }

        /// Make `search` for one identifier fail with a remote service error.
        pub fn fail_search_for(&self, identifier: &str, message: &str) {
            self.search_failures
                .lock()
                .unwrap()
                .insert(identifier.to_string(), message.to_string());
        }

        /// Make `request_item` for one identifier fail with a remote service error.
        pub fn fail_request_for(&self, identifier: &str, message: &str) {
            self.request_failures
                .lock()
                .unwrap()
                .insert(identifier.to_string(), message.to_string());
        }

        /// All `(operation, identifier)` pairs seen so far, in call order.
        pub fn calls(&self) -> Vec<(String, String)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, operation: &str, identifier: &str) {
            self.calls
                .lock()
                .unwrap()
                .push((operation.to_string(), identifier.to_string()));
        }
    }

    impl Default for MockCatalogClient {
        fn default() -> Self {
            Self::new()
        }
    }

    /// The record the default search responder returns.
    pub fn available_search_result(identifier: &str) -> SearchResult {
        SearchResult {
            identifier: identifier.to_string(),
            authorization_id: "mock-authorization-id-000001".to_string(),
            available: true,
            pickup_locations: vec![PickupLocation {
                code: "A".to_string(),
                description: Some("Main Library".to_string()),
            }],
            search_term: format!("isbn={identifier}"),
            request_link: None,
            number_of_records: Some(1),
        }
    }

    /// The record the default request responder returns.
    pub fn placed_request_result(identifier: &str) -> RequestResult {
        RequestResult {
            identifier: identifier.to_string(),
            request_number: Some(format!("MOCK-{identifier}")),
            problem: None,
        }
    }

    #[async_trait]
    impl CatalogClient for MockCatalogClient {
        async fn run_auth_nz(
            &self,
            _patron_barcode: &str,
        ) -> Result<AuthNzOutcome, BorrowDirectError> {
            self.record("auth_nz", "");
            Ok(AuthNzOutcome {
                valid: *self.auth_valid.lock().unwrap(),
                authorization_id: "mock-authorization-id-000001".to_string(),
            })
        }

        async fn search(
            &self,
            _patron_barcode: &str,
            _identifier_type: IdentifierType,
            identifier: &str,
        ) -> Result<SearchResult, BorrowDirectError> {
            self.record("search", identifier);
            if let Some(message) = self.search_failures.lock().unwrap().get(identifier) {
                return Err(BorrowDirectError::RemoteService {
                    status: 500,
                    message: message.clone(),
                });
            }
            match self.search_responder.lock().unwrap().as_ref() {
                Some(responder) => responder(identifier),
                None => Ok(available_search_result(identifier)),
            }
        }

        async fn request_item(
            &self,
            _patron_barcode: &str,
            _identifier_type: IdentifierType,
            identifier: &str,
        ) -> Result<RequestResult, BorrowDirectError> {
            self.record("request", identifier);
            if let Some(message) = self.request_failures.lock().unwrap().get(identifier) {
                return Err(BorrowDirectError::RemoteService {
                    status: 500,
                    message: message.clone(),
                });
            }
            match self.request_responder.lock().unwrap().as_ref() {
                Some(responder) => responder(identifier),
                None => Ok(placed_request_result(identifier)),
            }
        }
    }
}
