//! BorrowDirect interlending API client.
//!
//! # Architecture
//!
//! - [`SessionAuthenticator`] - the two-step authenticate/authorize exchange
//! - [`CatalogClient`] - trait for search and request operations
//! - [`HttpCatalogClient`] - real HTTP implementation using reqwest
//! - [`mock::MockCatalogClient`] - mock for unit tests (behind `test-utils` feature)
//!
//! # Example
//!
//! ```ignore
//! use bd_client::{CatalogClient, ClientSettings, HttpCatalogClient, IdentifierType};
//!
//! let settings = ClientSettings::new()
//!     .with_api_url_root("https://bd.example.edu")
//!     .with_university_code("BROWN")
//!     .with_partnership_id("BD");
//! let client = HttpCatalogClient::new(settings);
//! let result = client.search("2222222222", IdentifierType::Isbn, "9780688002305").await?;
//! println!("available: {}", result.available);
//! ```

#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod auth;
mod client;
mod error;
mod settings;
mod types;

pub use auth::{
    Authorization, AuthenticationHandle, ConfirmedHandle, SessionAuthenticator,
    EXPECTED_HANDLE_LEN,
};
pub use client::{CatalogClient, HttpCatalogClient};
pub use error::BorrowDirectError;
pub use settings::ClientSettings;
pub use types::{
    AuthNzOutcome, IdentifierType, PickupLocation, RemoteProblem, RequestResult, SearchResult,
};

#[cfg(any(test, feature = "test-utils"))]
pub use client::mock;
