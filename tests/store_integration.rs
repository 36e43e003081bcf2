//! Library-level tests over a temporary SQLite database.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;

use threadvec::embedding::HashEmbedder;
use threadvec::pipeline::{IndexOptions, IndexingPipeline};
use threadvec::sink::IndexSink;
use threadvec::sqlite_store::SqliteStore;
use threadvec_core::models::{Document, Item, SourceType};
use threadvec_core::store::{SearchFilters, StoreError, VectorStore};

async fn open_store(dims: usize) -> (TempDir, SqliteStore) {
    let tmp = TempDir::new().unwrap();
    let store = SqliteStore::open(&tmp.path().join("data").join("tv.sqlite"), dims)
        .await
        .unwrap();
    (tmp, store)
}

fn doc(thread: &str, source: &str) -> Document {
    let ts = Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap();
    Document {
        id: 0,
        source_id: format!("{}-1", thread),
        thread_id: thread.into(),
        title: format!("Thread {}", thread),
        content: format!("content of {}", thread),
        source_type: SourceType::Email,
        source_name: source.into(),
        message_count: 1,
        metadata: json!({"participants": ["a@x.com"]}),
        created_at: ts,
        updated_at: ts,
        indexed_at: ts,
    }
}

fn item(id: &str, thread: &str, tag: &str, body: &str) -> Item {
    Item {
        id: id.into(),
        title: format!("About {}", thread),
        body: body.into(),
        created_at: Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap(),
        tags: vec![tag.into()],
        metadata: json!({"thread_id": thread}).as_object().cloned().unwrap(),
    }
}

#[tokio::test]
async fn test_nearest_thread_ranks_first() {
    let (_tmp, store) = open_store(3).await;
    let a = store.upsert_document(&doc("A", "gmail"), &[0.1, 0.2, 0.3]).await.unwrap();
    let b = store.upsert_document(&doc("B", "gmail"), &[0.9, 0.8, 0.7]).await.unwrap();

    let hits = store
        .search(&[0.15, 0.25, 0.35], 10, &SearchFilters::default())
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].document.id, a);
    assert_eq!(hits[1].document.id, b);
    assert!(hits[0].score > hits[1].score);
    for hit in &hits {
        assert!(hit.score > 0.0 && hit.score <= 1.0);
        assert!((hit.score - 1.0 / (1.0 + hit.distance)).abs() < 1e-12);
    }
}

#[tokio::test]
async fn test_short_vector_rejected_without_write() {
    let (_tmp, store) = open_store(3).await;
    let err = store
        .upsert_document(&doc("A", "gmail"), &[0.1, 0.2])
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::DimensionMismatch { expected: 3, actual: 2 })
    ));
    assert_eq!(store.document_count().await.unwrap(), 0);

    let err = store
        .search(&[1.0, 2.0, 3.0, 4.0], 5, &SearchFilters::default())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<StoreError>().is_some());
}

#[tokio::test]
async fn test_upsert_is_stable_and_replaces_vector() {
    let (_tmp, store) = open_store(2).await;
    let first = store.upsert_document(&doc("T1", "gmail"), &[0.0, 0.0]).await.unwrap();

    let mut updated = doc("T1", "gmail");
    updated.content = "rewritten".into();
    updated.message_count = 3;
    let second = store.upsert_document(&updated, &[5.0, 5.0]).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.document_count().await.unwrap(), 1);
    let vectors: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document_vectors")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(vectors, 1);

    let stored = store.get_document(first).await.unwrap().unwrap();
    assert_eq!(stored.content, "rewritten");
    assert_eq!(stored.message_count, 3);

    let hits = store.search(&[5.0, 5.0], 1, &SearchFilters::default()).await.unwrap();
    assert!(hits[0].distance < 1e-9);
}

#[tokio::test]
async fn test_same_thread_two_sources() {
    let (_tmp, store) = open_store(1).await;
    let work = store.upsert_document(&doc("T1", "work"), &[1.0]).await.unwrap();
    let home = store.upsert_document(&doc("T1", "home"), &[2.0]).await.unwrap();
    assert_ne!(work, home);

    assert!(store.is_indexed("T1", "work").await.unwrap());
    assert!(store.is_indexed("T1", "home").await.unwrap());
    assert!(!store.is_indexed("T1", "other").await.unwrap());

    let filters = SearchFilters {
        source_name: Some("home".into()),
        ..Default::default()
    };
    let hits = store.search(&[1.0], 10, &filters).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.id, home);
}

#[tokio::test]
async fn test_stats_over_sqlite() {
    let (_tmp, store) = open_store(1).await;
    let mut cal = doc("E1", "gcal");
    cal.source_type = SourceType::Calendar;
    cal.message_count = 3;
    cal.created_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    store.upsert_document(&doc("T1", "gmail"), &[1.0]).await.unwrap();
    store.upsert_document(&doc("T1", "imap"), &[1.0]).await.unwrap();
    store.upsert_document(&cal, &[1.0]).await.unwrap();

    let stats = store.stats().await.unwrap();
    assert_eq!(stats.total_documents, 3);
    assert_eq!(stats.total_threads, 2);
    assert_eq!(stats.documents_by_type["email"], 2);
    assert_eq!(stats.documents_by_type["calendar"], 1);
    assert_eq!(stats.documents_by_source["gcal"], 1);
    assert_eq!(stats.oldest, Some(cal.created_at));
    assert!((stats.average_message_count - 5.0 / 3.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_pipeline_over_sqlite_is_idempotent() {
    let (_tmp, store) = open_store(64).await;
    let embedder = HashEmbedder::new(64).unwrap();
    let pipeline = IndexingPipeline::new(&store, &embedder);
    let items = vec![
        item("m1", "T1", "gmail:inbox", "first"),
        item("m2", "T1", "gmail:inbox", "second"),
        item("m3", "T2", "gmail:inbox", "third"),
    ];

    let first = pipeline.index("gmail", &items, &IndexOptions::default()).await.unwrap();
    assert_eq!((first.indexed, first.skipped, first.failed), (2, 0, 0));
    let second = pipeline.index("gmail", &items, &IndexOptions::default()).await.unwrap();
    assert_eq!((second.indexed, second.skipped, second.failed), (0, 2, 0));
    assert_eq!(store.document_count().await.unwrap(), 2);

    let ids = store.get_indexed_thread_ids("gmail").await.unwrap();
    assert!(ids.contains("T1") && ids.contains("T2"));
}

#[tokio::test]
async fn test_sink_splits_sources_over_sqlite() {
    let (_tmp, store) = open_store(32).await;
    let embedder = HashEmbedder::new(32).unwrap();
    let sink = IndexSink::new(&store, &embedder, IndexOptions::default());
    let items = vec![
        item("m1", "T1", "gmail:inbox", "hello"),
        item("m2", "T1", "drive:shared", "hello"),
    ];

    let reports = sink.write(&items).await.unwrap();
    let names: Vec<&str> = reports.iter().map(|r| r.source_name.as_str()).collect();
    assert_eq!(names, vec!["drive", "gmail"]);
    assert_eq!(store.document_count().await.unwrap(), 2);

    let filters = SearchFilters {
        source_type: Some(SourceType::Document),
        ..Default::default()
    };
    let hits = store
        .search(&embedder.embed_text("hello"), 10, &filters)
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].document.source_name, "drive");
}

#[tokio::test]
async fn test_failed_vector_write_rolls_back_document() {
    let (_tmp, store) = open_store(2).await;
    let id = store.upsert_document(&doc("T1", "gmail"), &[1.0, 1.0]).await.unwrap();

    sqlx::query(
        "CREATE TRIGGER refuse_vectors BEFORE INSERT ON document_vectors \
         BEGIN SELECT RAISE(ABORT, 'vector write refused'); END",
    )
    .execute(store.pool())
    .await
    .unwrap();

    let mut updated = doc("T1", "gmail");
    updated.content = "should not land".into();
    updated.message_count = 9;
    let err = store.upsert_document(&updated, &[2.0, 2.0]).await.unwrap_err();
    assert!(format!("{:#}", err).contains("vector write refused"));

    let stored = store.get_document(id).await.unwrap().unwrap();
    assert_eq!(stored.content, "content of T1");
    assert_eq!(stored.message_count, 1);

    // The old vector survived the aborted delete-and-insert.
    let hits = store.search(&[1.0, 1.0], 1, &SearchFilters::default()).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].distance < 1e-9);

    // A brand-new thread leaves no orphan document row either.
    assert!(store.upsert_document(&doc("T2", "gmail"), &[0.0, 0.0]).await.is_err());
    assert!(!store.is_indexed("T2", "gmail").await.unwrap());
    assert_eq!(store.document_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_nan_vector_rejected_by_sqlite() {
    let (_tmp, store) = open_store(2).await;
    let err = store
        .upsert_document(&doc("bad", "gmail"), &[f32::NAN, 0.0])
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::NonFinite { index: 0 })
    ));
    assert_eq!(store.document_count().await.unwrap(), 0);

    store.upsert_document(&doc("T1", "gmail"), &[0.0, 0.0]).await.unwrap();
    let err = store
        .search(&[f32::NAN, 0.0], 5, &SearchFilters::default())
        .await
        .unwrap_err();
    assert!(err.downcast_ref::<StoreError>().is_some());
}
