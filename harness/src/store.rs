//! Shared key/value store the batch accumulates results in.
//!
//! A namespace can hold one plain value and any number of fields. Batch
//! entries live in fields keyed by identifier; the plain value exists so a
//! namespace already claimed by something else can be detected.

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::PgPool;

/// Errors from store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Store operations the harness depends on.
///
/// Implementations must give read-your-writes: a `get_field` issued after a
/// completed `set_field` on the same key observes that write.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Plain value stored directly under a namespace.
    async fn get(&self, namespace: &str) -> Result<Option<String>, StoreError>;

    /// Write one field, replacing any previous value.
    async fn set_field(&self, namespace: &str, field: &str, value: &str)
        -> Result<(), StoreError>;

    async fn get_field(&self, namespace: &str, field: &str) -> Result<Option<String>, StoreError>;

    /// Every field of a namespace, sorted by field name.
    async fn list_fields(&self, namespace: &str) -> Result<BTreeMap<String, String>, StoreError>;
}

/// `PostgreSQL` implementation of [`ResultStore`].
pub struct PgResultStore {
    pool: PgPool,
}

impl PgResultStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResultStore for PgResultStore {
    async fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM store_values WHERE namespace = $1",
        )
        .bind(namespace)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn set_field(
        &self,
        namespace: &str,
        field: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO store_fields (namespace, field, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (namespace, field)
            DO UPDATE SET value = EXCLUDED.value, updated_at = now()
            ",
        )
        .bind(namespace)
        .bind(field)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_field(&self, namespace: &str, field: &str) -> Result<Option<String>, StoreError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM store_fields WHERE namespace = $1 AND field = $2",
        )
        .bind(namespace)
        .bind(field)
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn list_fields(&self, namespace: &str) -> Result<BTreeMap<String, String>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT field, value FROM store_fields WHERE namespace = $1 ORDER BY field",
        )
        .bind(namespace)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[allow(clippy::unwrap_used, clippy::missing_panics_doc)]
pub mod mock {
    //! In-memory store for unit testing.

    use super::{async_trait, BTreeMap, ResultStore, StoreError};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryResultStore {
        values: Mutex<BTreeMap<String, String>>,
        fields: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    }

    impl MemoryResultStore {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Put a plain value under a namespace.
        pub fn set(&self, namespace: &str, value: &str) {
            self.values
                .lock()
                .unwrap()
                .insert(namespace.to_string(), value.to_string());
        }
    }

    #[async_trait]
    impl ResultStore for MemoryResultStore {
        async fn get(&self, namespace: &str) -> Result<Option<String>, StoreError> {
            Ok(self.values.lock().unwrap().get(namespace).cloned())
        }

        async fn set_field(
            &self,
            namespace: &str,
            field: &str,
            value: &str,
        ) -> Result<(), StoreError> {
            self.fields
                .lock()
                .unwrap()
                .entry(namespace.to_string())
                .or_default()
                .insert(field.to_string(), value.to_string());
            Ok(())
        }

        async fn get_field(
            &self,
            namespace: &str,
            field: &str,
        ) -> Result<Option<String>, StoreError> {
            Ok(self
                .fields
                .lock()
                .unwrap()
                .get(namespace)
                .and_then(|fields| fields.get(field).cloned()))
        }

        async fn list_fields(
            &self,
            namespace: &str,
        ) -> Result<BTreeMap<String, String>, StoreError> {
            Ok(self
                .fields
                .lock()
                .unwrap()
                .get(namespace)
                .cloned()
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MemoryResultStore;
    use super::ResultStore;

    #[tokio::test]
    async fn fields_overwrite_and_list_sorted() {
        let store = MemoryResultStore::new();
        store.set_field("ns", "b", "1").await.unwrap();
        store.set_field("ns", "a", "2").await.unwrap();
        store.set_field("ns", "b", "3").await.unwrap();
        store.set_field("other", "c", "4").await.unwrap();

        let fields = store.list_fields("ns").await.unwrap();
        assert_eq!(
            fields.into_iter().collect::<Vec<_>>(),
            vec![("a".to_string(), "2".to_string()), ("b".to_string(), "3".to_string())]
        );
        assert_eq!(store.get_field("ns", "c").await.unwrap(), None);
    }

    #[tokio::test]
    async fn plain_values_are_separate_from_fields() {
        let store = MemoryResultStore::new();
        assert_eq!(store.get("ns").await.unwrap(), None);
        store.set("ns", "claimed");
        assert_eq!(store.get("ns").await.unwrap().as_deref(), Some("claimed"));
        assert!(store.list_fields("ns").await.unwrap().is_empty());
    }
}
