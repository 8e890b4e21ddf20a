//! HTTP mock server helpers for testing outbound API calls.
//!
//! A thin wrapper around `wiremock` for declarative HTTP stubbing.
//!
//! # Quick Start
//!
//! ```ignore
//! let server = MockHttpServer::start().await;
//!
//! server
//!     .expect_post("/portal-service/user/authentication")
//!     .respond_with_json(json!({"AuthorizationId": "..."}))
//!     .mount()
//!     .await;
//! ```
//!
//! # Patterns
//!
//! - **Success response**: `.respond_with_json(value)`
//! - **Error response**: `.respond_with_status(403)` plus `.with_json_response(value)`
//! - **Timeout simulation**: `.respond_with_delay(Duration::from_secs(30))`
//! - **Request verification**: `.expect_times(1)` then `server.verify().await`

use std::time::Duration;

use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::HANDLE;

pub struct MockHttpServer {
    server: MockServer,
}

impl MockHttpServer {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self) -> String {
        self.server.uri()
    }

    pub const fn inner(&self) -> &MockServer {
        &self.server
    }

    pub fn expect_get(&self, route: &str) -> StubBuilder<'_> {
        StubBuilder::new(&self.server, "GET", route)
    }

    pub fn expect_post(&self, route: &str) -> StubBuilder<'_> {
        StubBuilder::new(&self.server, "POST", route)
    }

    /// Verify all `expect_times` expectations were met.
    pub async fn verify(&self) {
        self.server.verify().await;
    }

    /// Stub a successful authenticate + authorize round issuing `HANDLE`.
    pub async fn mount_valid_session(&self) {
        self.expect_post("/portal-service/user/authentication")
            .respond_with_json(json!({
                "AuthorizationId": HANDLE,
                "LoggedIn": true,
                "FirstName": "Test",
                "LastName": "Patron"
            }))
            .mount()
            .await;

        self.expect_get("/portal-service/user/authz/isAuthorized")
            .with_query("aid", HANDLE)
            .respond_with_json(json!({
                "AuthorizationState": {"AuthorizationId": HANDLE, "State": true}
            }))
            .mount()
            .await;
    }
}

pub struct StubBuilder<'a> {
    server: &'a MockServer,
    method: &'static str,
    route: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    status: u16,
    response: Option<Value>,
    delay: Option<Duration>,
    times: Option<u64>,
}

impl<'a> StubBuilder<'a> {
    fn new(server: &'a MockServer, method: &'static str, route: &str) -> Self {
        Self {
            server,
            method,
            route: route.to_string(),
            query: Vec::new(),
            body: None,
            status: 200,
            response: None,
            delay: None,
            times: None,
        }
    }

    pub fn with_query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Require the request body to contain `value` (partial match).
    pub fn with_body(mut self, value: Value) -> Self {
        self.body = Some(value);
        self
    }

    pub fn respond_with_json(mut self, value: Value) -> Self {
        self.response = Some(value);
        self
    }

    pub fn respond_with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_json_response(self, value: Value) -> Self {
        self.respond_with_json(value)
    }

    pub fn respond_with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn expect_times(mut self, times: u64) -> Self {
        self.times = Some(times);
        self
    }

    pub async fn mount(self) {
        let mut template = ResponseTemplate::new(self.status);
        if let Some(value) = self.response {
            template = template.set_body_json(value);
        }
        if let Some(delay) = self.delay {
            template = template.set_delay(delay);
        }

        let mut mock = Mock::given(method(self.method)).and(path(self.route.as_str()));
        for (key, value) in &self.query {
            mock = mock.and(query_param(key.as_str(), value.as_str()));
        }
        if let Some(body) = self.body {
            mock = mock.and(body_partial_json(body));
        }

        let mut mock = mock.respond_with(template);
        if let Some(times) = self.times {
            mock = mock.expect(times);
        }
        mock.mount(self.server).await;
    }
}
