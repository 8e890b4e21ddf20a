//! Collects a batch namespace into a report.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, instrument};

use super::entry::StoredEntry;
use crate::error::HarnessError;
use crate::store::ResultStore;

/// Identifier to entry, in identifier order.
pub type Report = BTreeMap<String, StoredEntry>;

/// Reads every entry of a namespace. Never writes to the store.
pub struct ResultAggregator {
    store: Arc<dyn ResultStore>,
    namespace: String,
}

impl ResultAggregator {
    pub fn new(store: Arc<dyn ResultStore>, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// # Errors
    /// `CorruptEntry` for the first entry that does not parse, or a store error.
    pub async fn aggregate(&self) -> Result<Report, HarnessError> {
        self.store
            .list_fields(&self.namespace)
            .await?
            .into_iter()
            .map(|(identifier, raw)| match StoredEntry::parse(&raw) {
                Ok(entry) => Ok((identifier, entry)),
                Err(source) => Err(HarnessError::CorruptEntry { identifier, source }),
            })
            .collect()
    }

    /// Aggregate and write the report to `path` as pretty JSON.
    ///
    /// # Errors
    /// Any aggregation error, or an I/O error writing the file.
    #[instrument(skip(self), fields(namespace = %self.namespace, path = %path.display()))]
    pub async fn write_report(&self, path: &Path) -> Result<Report, HarnessError> {
        let report = self.aggregate().await?;
        let json = serde_json::to_string_pretty(&report)?;
        tokio::fs::write(path, json).await?;

        let requested = report.values().filter(|e| e.request_result.is_some()).count();
        info!(entries = report.len(), requested, "report written");
        Ok(report)
    }
}
