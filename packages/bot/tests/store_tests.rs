//! Postgres dedup store against a real database.

mod common;

use bot_core::domains::storage::{DocumentStore, ProcessedRecord};
use common::{document, TestHarness};
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn marking_is_idempotent(ctx: &mut TestHarness) {
    let store = ctx.store().await;
    let doc = document("Doc 1 - Entry List", 0);

    assert!(!store.is_processed(&doc).await);

    store.mark_processed(&ProcessedRecord::from(&doc)).await.unwrap();
    store.mark_processed(&ProcessedRecord::from(&doc)).await.unwrap();

    assert!(store.is_processed(&doc).await);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM processed_documents")
        .fetch_one(&ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn record_keeps_the_document_timestamp(ctx: &mut TestHarness) {
    let store = ctx.store().await;
    let doc = document("Doc 2 - Summons", 30);

    store.mark_processed(&ProcessedRecord::from(&doc)).await.unwrap();

    let record = store.find(&doc.title, &doc.url).await.unwrap().unwrap();
    assert_eq!(record.timestamp, doc.published);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn same_url_with_a_new_title_is_a_new_document(ctx: &mut TestHarness) {
    let store = ctx.store().await;
    let original = document("Doc 3 - Decision", 5);
    let mut corrected = original.clone();
    corrected.title = "Doc 3 - Decision (corrected)".to_string();

    store.mark_processed(&ProcessedRecord::from(&original)).await.unwrap();

    assert!(!store.is_processed(&corrected).await);
    store.mark_processed(&ProcessedRecord::from(&corrected)).await.unwrap();
    assert!(store.is_processed(&corrected).await);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn legacy_url_constraint_is_migrated(ctx: &mut TestHarness) {
    sqlx::query(
        "CREATE TABLE processed_documents (
            id SERIAL PRIMARY KEY,
            title TEXT NOT NULL,
            url TEXT NOT NULL UNIQUE,
            timestamp TIMESTAMP NOT NULL
        )",
    )
    .execute(&ctx.db_pool)
    .await
    .unwrap();

    let store = ctx.store().await;
    // Running the bootstrap again must be harmless
    store.ensure_schema().await.unwrap();

    let constraints: Vec<String> = sqlx::query_scalar(
        "SELECT conname::text FROM pg_constraint
         WHERE conrelid = 'processed_documents'::regclass AND contype = 'u'
         ORDER BY conname",
    )
    .fetch_all(&ctx.db_pool)
    .await
    .unwrap();
    assert_eq!(constraints, vec!["processed_documents_title_url_key"]);

    let first = document("Doc 4 - Decision", 10);
    let mut second = first.clone();
    second.title = "Doc 4 - Decision (v2)".to_string();
    store.mark_processed(&ProcessedRecord::from(&first)).await.unwrap();
    store.mark_processed(&ProcessedRecord::from(&second)).await.unwrap();
    assert!(store.is_processed(&second).await);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn reconnect_swaps_in_a_working_pool(ctx: &mut TestHarness) {
    let store = ctx.store().await;

    store.check_connection().await.unwrap();
    store.reconnect().await.unwrap();
    store.reconnect().await.unwrap();
    store.check_connection().await.unwrap();

    let doc = document("Doc 5 - Offence", 15);
    store.mark_processed(&ProcessedRecord::from(&doc)).await.unwrap();
    assert!(store.is_processed(&doc).await);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn lookups_fail_open_once_closed(ctx: &mut TestHarness) {
    let store = ctx.store().await;
    let doc = document("Doc 6 - Reprimand", 20);
    store.mark_processed(&ProcessedRecord::from(&doc)).await.unwrap();

    store.close().await;

    assert!(!store.is_processed(&doc).await);
    assert!(store.check_connection().await.is_err());
}
