//! Turns an identifier list into queued test jobs.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument};

use super::PERFORM_TASK;
use crate::error::HarnessError;
use crate::queue::JobQueue;
use crate::store::ResultStore;

/// Read a JSON array of identifiers, returning them trimmed, sorted and unique.
///
/// # Errors
/// Returns `Io` if the file cannot be read and `Input` if it is not a JSON
/// array of strings.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn load_identifiers(path: &Path) -> Result<Vec<String>, HarnessError> {
    let raw = tokio::fs::read_to_string(path).await?;
    let listed: Vec<String> = serde_json::from_str(&raw).map_err(|source| HarnessError::Input {
        path: path.display().to_string(),
        source,
    })?;

    let unique = dedupe(&listed);
    info!(raw_count = listed.len(), unique_count = unique.len(), "loaded identifiers");
    Ok(unique)
}

/// Trim, drop blanks, sort and remove duplicates.
pub fn dedupe<S: AsRef<str>>(identifiers: &[S]) -> Vec<String> {
    identifiers
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .map(ToString::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Enqueues one `isbn_test.perform` job per identifier for a batch namespace.
pub struct TestJobDispatcher {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ResultStore>,
    queue_name: String,
    namespace: String,
    job_timeout: Duration,
}

impl TestJobDispatcher {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ResultStore>,
        queue_name: impl Into<String>,
        namespace: impl Into<String>,
        job_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            queue_name: queue_name.into(),
            namespace: namespace.into(),
            job_timeout,
        }
    }

    /// Fail unless the namespace holds neither a plain value nor any field.
    ///
    /// # Errors
    /// Returns `Setup` when leftovers from another run are present.
    pub async fn ensure_namespace_unused(&self) -> Result<(), HarnessError> {
        if self.store.get(&self.namespace).await?.is_some() {
            return Err(HarnessError::Setup(format!(
                "namespace {} already holds a value",
                self.namespace
            )));
        }
        let fields = self.store.list_fields(&self.namespace).await?;
        if !fields.is_empty() {
            return Err(HarnessError::Setup(format!(
                "namespace {} already holds {} entries; clear it or pick another namespace",
                self.namespace,
                fields.len()
            )));
        }
        Ok(())
    }

    /// Enqueue one job per distinct identifier, in sorted order.
    ///
    /// Nothing is enqueued if the namespace is already in use.
    ///
    /// # Errors
    /// Returns `Setup` for a used namespace, or the first queue error.
    #[instrument(skip_all, fields(queue = %self.queue_name, namespace = %self.namespace))]
    pub async fn enqueue_all<S: AsRef<str> + Sync>(
        &self,
        identifiers: &[S],
    ) -> Result<Vec<String>, HarnessError> {
        self.ensure_namespace_unused().await?;

        let identifiers = dedupe(identifiers);
        for identifier in &identifiers {
            self.queue
                .enqueue(
                    &self.queue_name,
                    PERFORM_TASK,
                    json!({ "isbn": identifier }),
                    self.job_timeout,
                )
                .await?;
        }

        info!(count = identifiers.len(), "enqueued test jobs");
        Ok(identifiers)
    }

    /// Load identifiers from `path` and enqueue them.
    ///
    /// # Errors
    /// Any error from [`load_identifiers`] or [`Self::enqueue_all`].
    pub async fn dispatch(&self, path: &Path) -> Result<Vec<String>, HarnessError> {
        let identifiers = load_identifiers(path).await?;
        self.enqueue_all(&identifiers).await
    }
}
