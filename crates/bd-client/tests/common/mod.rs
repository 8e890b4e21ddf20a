//! Common test utilities for client integration tests.
//!
//! - [`http_mock::MockHttpServer`] - declarative stubbing of the BorrowDirect endpoints
//! - [`settings_for`] - client settings pointing at a mock server

#![allow(dead_code)]

pub mod http_mock;

use bd_client::ClientSettings;

pub const PATRON: &str = "22222222222222";
pub const UNIVERSITY: &str = "BROWN";
pub const HANDLE: &str = "Y7iQkLRThu8Zbe5EYP4gLs1eVVo";

/// Settings with every field populated and the root pointing at `url`.
pub fn settings_for(url: &str) -> ClientSettings {
    ClientSettings::new()
        .with_api_url_root(url)
        .with_university_code(UNIVERSITY)
        .with_partnership_id("BD")
        .with_pickup_location("A")
}
