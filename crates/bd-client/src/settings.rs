//! Per-instance client settings.

use serde::{Deserialize, Serialize};

use crate::error::BorrowDirectError;

/// Settings a client instance is built from.
///
/// Every field is optional. An empty settings value is valid and yields a
/// client whose operations fail with [`BorrowDirectError::MissingSetting`]
/// once they reach a setting they need.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Library symbol of the patron's home institution (e.g. "BROWN").
    #[serde(default)]
    pub university_code: Option<String>,

    /// Base URL of the API, without a trailing slash.
    #[serde(default)]
    pub api_url_root: Option<String>,

    /// Partnership the requests are made under (e.g. "BD").
    #[serde(default)]
    pub partnership_id: Option<String>,

    /// Pickup location code used when placing requests.
    #[serde(default)]
    pub pickup_location: Option<String>,
}

impl ClientSettings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_university_code(mut self, code: impl Into<String>) -> Self {
        self.university_code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_api_url_root(mut self, root: impl Into<String>) -> Self {
        self.api_url_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_partnership_id(mut self, id: impl Into<String>) -> Self {
        self.partnership_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_pickup_location(mut self, location: impl Into<String>) -> Self {
        self.pickup_location = Some(location.into());
        self
    }

    /// API root with any trailing slash removed.
    ///
    /// # Errors
    ///
    /// Returns [`BorrowDirectError::MissingSetting`] if no root is configured.
    pub fn require_api_root(&self) -> Result<&str, BorrowDirectError> {
        self.api_url_root
            .as_deref()
            .map(|root| root.trim_end_matches('/'))
            .ok_or(BorrowDirectError::MissingSetting("api_url_root"))
    }

    /// # Errors
    ///
    /// Returns [`BorrowDirectError::MissingSetting`] if no university code is configured.
    pub fn require_university_code(&self) -> Result<&str, BorrowDirectError> {
        self.university_code
            .as_deref()
            .ok_or(BorrowDirectError::MissingSetting("university_code"))
    }

    /// # Errors
    ///
    /// Returns [`BorrowDirectError::MissingSetting`] if no pickup location is configured.
    pub fn require_pickup_location(&self) -> Result<&str, BorrowDirectError> {
        self.pickup_location
            .as_deref()
            .ok_or(BorrowDirectError::MissingSetting("pickup_location"))
    }
}
