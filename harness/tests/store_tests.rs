//! `PgResultStore` against a real Postgres container.

mod common;

use bd_harness::store::{PgResultStore, ResultStore};
use bd_test_macros::shared_runtime_test;
use common::test_db::{get_test_db, unique_name};

#[shared_runtime_test]
async fn set_field_upserts() {
    let db = get_test_db().await;
    let store = PgResultStore::new(db.pool().clone());
    let ns = unique_name("store");

    store.set_field(&ns, "9780688002305", "first").await.unwrap();
    store.set_field(&ns, "9780688002305", "second").await.unwrap();

    assert_eq!(
        store.get_field(&ns, "9780688002305").await.unwrap().as_deref(),
        Some("second")
    );
    assert_eq!(store.get_field(&ns, "0307269706").await.unwrap(), None);
}

#[shared_runtime_test]
async fn list_fields_is_scoped_and_sorted() {
    let db = get_test_db().await;
    let store = PgResultStore::new(db.pool().clone());
    let ns = unique_name("store");
    let other = unique_name("store");

    store.set_field(&ns, "b", "2").await.unwrap();
    store.set_field(&ns, "a", "1").await.unwrap();
    store.set_field(&other, "c", "3").await.unwrap();

    let fields = store.list_fields(&ns).await.unwrap();
    assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert!(store.list_fields(&unique_name("store")).await.unwrap().is_empty());
}

#[shared_runtime_test]
async fn plain_value_lookup() {
    let db = get_test_db().await;
    let store = PgResultStore::new(db.pool().clone());
    let ns = unique_name("store");

    assert_eq!(store.get(&ns).await.unwrap(), None);

    sqlx::query("INSERT INTO store_values (namespace, value) VALUES ($1, $2)")
        .bind(&ns)
        .bind("claimed")
        .execute(db.pool())
        .await
        .unwrap();

    assert_eq!(store.get(&ns).await.unwrap().as_deref(), Some("claimed"));
}
