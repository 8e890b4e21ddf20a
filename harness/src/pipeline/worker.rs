//! Runs the search and request phases for one identifier.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bd_client::{CatalogClient, IdentifierType};
use chrono::Utc;
use tracing::{info, instrument, warn};

use super::entry::{PhaseRecord, StoredEntry};
use crate::error::{HarnessError, Phase};
use crate::store::ResultStore;

/// Executes one test job: search, record, request, merge.
///
/// The two phases are not atomic. If a request result arrives for an
/// identifier whose stored entry has no search result the job fails with
/// `DataIntegrity`.
pub struct TestJobWorker {
    client: Arc<dyn CatalogClient>,
    store: Arc<dyn ResultStore>,
    namespace: String,
    patron_barcode: String,
    identifier_type: IdentifierType,
    settle_delay: Duration,
}

impl TestJobWorker {
    pub fn new(
        client: Arc<dyn CatalogClient>,
        store: Arc<dyn ResultStore>,
        namespace: impl Into<String>,
        patron_barcode: impl Into<String>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            namespace: namespace.into(),
            patron_barcode: patron_barcode.into(),
            identifier_type: IdentifierType::Isbn,
            settle_delay,
        }
    }

    #[must_use]
    pub const fn with_identifier_type(mut self, identifier_type: IdentifierType) -> Self {
        self.identifier_type = identifier_type;
        self
    }

    /// Run both phases for `identifier`.
    ///
    /// # Errors
    /// The first client, store or integrity error. A failed search skips the
    /// request phase.
    #[instrument(skip(self), fields(namespace = %self.namespace))]
    pub async fn perform(&self, identifier: &str) -> Result<(), HarnessError> {
        self.settle().await;
        self.search_phase(identifier).await?;
        self.settle().await;
        self.request_phase(identifier).await?;
        Ok(())
    }

    /// Search and record the result. Any request result already stored for
    /// the identifier is kept.
    ///
    /// # Errors
    /// `Client` if the search fails, or a store error.
    pub async fn search_phase(&self, identifier: &str) -> Result<(), HarnessError> {
        let started = Instant::now();
        let result = self
            .client
            .search(&self.patron_barcode, self.identifier_type, identifier)
            .await
            .map_err(|e| HarnessError::client(identifier, Phase::Search, e))?;
        let record = PhaseRecord::new(result, elapsed_ms(started), Utc::now());

        let existing = match self.store.get_field(&self.namespace, identifier).await? {
            Some(raw) => StoredEntry::parse(&raw).unwrap_or_else(|e| {
                warn!(identifier, error = %e, "discarding unreadable stored entry");
                StoredEntry::default()
            }),
            None => StoredEntry::default(),
        };

        let available = record.result.available;
        let elapsed = record.elapsed_ms;
        let entry = existing.with_search(record);
        self.store
            .set_field(&self.namespace, identifier, &entry.to_json()?)
            .await?;

        info!(identifier, phase = %Phase::Search, available, elapsed_ms = elapsed, "phase recorded");
        Ok(())
    }

    /// Request the item and merge the outcome into the stored entry.
    ///
    /// # Errors
    /// `Client` if the request call fails, `DataIntegrity` if no entry with a
    /// search result is stored for the identifier, `CorruptEntry` if the
    /// stored entry cannot be parsed, or a store error.
    pub async fn request_phase(&self, identifier: &str) -> Result<(), HarnessError> {
        let started = Instant::now();
        let result = self
            .client
            .request_item(&self.patron_barcode, self.identifier_type, identifier)
            .await
            .map_err(|e| HarnessError::client(identifier, Phase::Request, e))?;
        let record = PhaseRecord::new(result, elapsed_ms(started), Utc::now());

        let Some(raw) = self.store.get_field(&self.namespace, identifier).await? else {
            return Err(HarnessError::DataIntegrity {
                identifier: identifier.to_string(),
            });
        };
        let existing = StoredEntry::parse(&raw).map_err(|source| HarnessError::CorruptEntry {
            identifier: identifier.to_string(),
            source,
        })?;
        if existing.search_result.is_none() {
            return Err(HarnessError::DataIntegrity {
                identifier: identifier.to_string(),
            });
        }

        let placed = record.result.is_placed();
        let elapsed = record.elapsed_ms;
        let entry = existing.with_request(record);
        self.store
            .set_field(&self.namespace, identifier, &entry.to_json()?)
            .await?;

        info!(identifier, phase = %Phase::Request, placed, elapsed_ms = elapsed, "phase recorded");
        Ok(())
    }

    async fn settle(&self) {
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
