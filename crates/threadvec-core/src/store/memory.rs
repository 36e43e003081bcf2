//! In-memory [`VectorStore`] implementation for tests and embedding-free setups.
//!
//! Documents and vectors live in ordered maps behind one `std::sync::RwLock`,
//! so an upsert is atomic with respect to readers. Search is a brute-force
//! L2 scan over the filtered documents.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::models::Document;

use super::{rank_candidates, validate_vector, SearchFilters, SearchHit, StoreStats, VectorStore};

#[derive(Default)]
struct State {
    next_id: i64,
    docs: BTreeMap<i64, Document>,
    vectors: HashMap<i64, Vec<f32>>,
    keys: HashMap<(String, String), i64>,
}

/// In-memory store with a fixed dimensionality.
pub struct InMemoryStore {
    dimensions: usize,
    state: RwLock<State>,
}

impl InMemoryStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            state: RwLock::new(State::default()),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.docs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state.read().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state.write().map_err(|_| anyhow!("in-memory store lock poisoned"))
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert_document(&self, doc: &Document, embedding: &[f32]) -> Result<i64> {
        validate_vector(self.dimensions, embedding)?;

        let mut state = self.write()?;
        let key = (doc.thread_id.clone(), doc.source_name.clone());
        let id = match state.keys.get(&key) {
            Some(&id) => id,
            None => {
                state.next_id += 1;
                let id = state.next_id;
                state.keys.insert(key, id);
                id
            }
        };

        let mut stored = doc.clone();
        stored.id = id;
        stored.indexed_at = Utc::now();
        state.docs.insert(id, stored);
        state.vectors.remove(&id);
        state.vectors.insert(id, embedding.to_vec());
        Ok(id)
    }

    async fn is_indexed(&self, thread_id: &str, source_name: &str) -> Result<bool> {
        let state = self.read()?;
        Ok(state
            .keys
            .contains_key(&(thread_id.to_string(), source_name.to_string())))
    }

    async fn get_indexed_thread_ids(&self, source_name: &str) -> Result<HashSet<String>> {
        let state = self.read()?;
        Ok(state
            .keys
            .keys()
            .filter(|(_, source)| source == source_name)
            .map(|(thread, _)| thread.clone())
            .collect())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        validate_vector(self.dimensions, query)?;

        let state = self.read()?;
        let candidates = state
            .docs
            .values()
            .filter(|d| {
                filters
                    .source_type
                    .as_ref()
                    .map_or(true, |t| &d.source_type == t)
            })
            .filter(|d| {
                filters
                    .source_name
                    .as_deref()
                    .map_or(true, |s| d.source_name == s)
            })
            .filter_map(|d| state.vectors.get(&d.id).map(|v| (d.clone(), v.clone())));

        Ok(rank_candidates(query, candidates, limit, filters.min_score))
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        Ok(self.read()?.docs.get(&id).cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.read()?;
        let mut stats = StoreStats::default();
        let mut threads = HashSet::new();
        let mut members = 0i64;

        for doc in state.docs.values() {
            stats.total_documents += 1;
            threads.insert(doc.thread_id.as_str());
            members += doc.message_count;
            *stats
                .documents_by_source
                .entry(doc.source_name.clone())
                .or_default() += 1;
            *stats
                .documents_by_type
                .entry(doc.source_type.to_string())
                .or_default() += 1;
            stats.oldest = Some(stats.oldest.map_or(doc.created_at, |o| o.min(doc.created_at)));
            stats.newest = Some(stats.newest.map_or(doc.updated_at, |n| n.max(doc.updated_at)));
        }

        stats.total_threads = threads.len() as i64;
        if stats.total_documents > 0 {
            stats.average_message_count = members as f64 / stats.total_documents as f64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceType;
    use crate::store::StoreError;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn doc(thread: &str, source: &str, content: &str) -> Document {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        Document {
            id: 0,
            source_id: format!("{}-first", thread),
            thread_id: thread.into(),
            title: thread.into(),
            content: content.into(),
            source_type: SourceType::Email,
            source_name: source.into(),
            message_count: 2,
            metadata: json!({}),
            created_at: ts,
            updated_at: ts,
            indexed_at: ts,
        }
    }

    #[tokio::test]
    async fn upsert_keeps_id_and_replaces_content() {
        let store = InMemoryStore::new(3);
        let id1 = store
            .upsert_document(&doc("T1", "gmail", "old"), &[0.1, 0.2, 0.3])
            .await
            .unwrap();
        let id2 = store
            .upsert_document(&doc("T1", "gmail", "new"), &[0.9, 0.8, 0.7])
            .await
            .unwrap();
        assert_eq!(id1, id2);
        assert_eq!(store.len(), 1);

        let stored = store.get_document(id1).await.unwrap().unwrap();
        assert_eq!(stored.content, "new");

        let hits = store
            .search(&[0.9, 0.8, 0.7], 10, &SearchFilters::default())
            .await
            .unwrap();
        assert!(hits[0].distance < 1e-9);
    }

    #[tokio::test]
    async fn dimension_mismatch_leaves_state_untouched() {
        let store = InMemoryStore::new(3);
        let err = store
            .upsert_document(&doc("T1", "gmail", "x"), &[0.1, 0.2])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::DimensionMismatch { expected: 3, actual: 2 })
        ));
        assert!(store.is_empty());
        assert!(!store.is_indexed("T1", "gmail").await.unwrap());

        let err = store
            .search(&[0.1], 5, &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(err.downcast_ref::<StoreError>().is_some());
    }

    #[tokio::test]
    async fn non_finite_vectors_rejected() {
        let store = InMemoryStore::new(2);
        let err = store
            .upsert_document(&doc("nan", "gmail", "x"), &[f32::NAN, 0.0])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NonFinite { index: 0 })
        ));
        assert!(store.is_empty());

        store
            .upsert_document(&doc("T1", "gmail", "x"), &[1.0, 0.0])
            .await
            .unwrap();
        let err = store
            .search(&[0.0, f32::INFINITY], 5, &SearchFilters::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::NonFinite { index: 1 })
        ));
    }

    #[tokio::test]
    async fn nearest_first_with_scores() {
        let store = InMemoryStore::new(3);
        let a = store
            .upsert_document(&doc("A", "gmail", "a"), &[0.1, 0.2, 0.3])
            .await
            .unwrap();
        let b = store
            .upsert_document(&doc("B", "gmail", "b"), &[0.9, 0.8, 0.7])
            .await
            .unwrap();

        let hits = store
            .search(&[0.15, 0.25, 0.35], 10, &SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.id, a);
        assert_eq!(hits[1].document.id, b);
        assert!(hits[0].score > hits[1].score);
        assert!(hits[0].score <= 1.0 && hits[1].score > 0.0);
    }

    #[tokio::test]
    async fn filters_and_min_score() {
        let store = InMemoryStore::new(2);
        store
            .upsert_document(&doc("T", "gmail", "a"), &[0.0, 0.0])
            .await
            .unwrap();
        let mut cal = doc("T", "calendar", "b");
        cal.source_type = SourceType::Calendar;
        store.upsert_document(&cal, &[3.0, 4.0]).await.unwrap();

        let by_source = SearchFilters {
            source_name: Some("calendar".into()),
            ..Default::default()
        };
        let hits = store.search(&[0.0, 0.0], 10, &by_source).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.source_name, "calendar");

        let by_type = SearchFilters {
            source_type: Some(SourceType::Email),
            ..Default::default()
        };
        let hits = store.search(&[3.0, 4.0], 10, &by_type).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.source_name, "gmail");

        // distance 5 → score 1/6
        let strict = SearchFilters {
            min_score: Some(0.5),
            ..Default::default()
        };
        let hits = store.search(&[0.0, 0.0], 10, &strict).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.source_name, "gmail");
    }

    #[tokio::test]
    async fn limit_bounds_results() {
        let store = InMemoryStore::new(1);
        for i in 0..5 {
            store
                .upsert_document(&doc(&format!("T{}", i), "s", "x"), &[i as f32])
                .await
                .unwrap();
        }
        let hits = store.search(&[0.0], 2, &SearchFilters::default()).await.unwrap();
        let threads: Vec<&str> = hits.iter().map(|h| h.document.thread_id.as_str()).collect();
        assert_eq!(threads, vec!["T0", "T1"]);
    }

    #[tokio::test]
    async fn indexed_ids_scoped_by_source() {
        let store = InMemoryStore::new(1);
        store.upsert_document(&doc("T1", "work", "a"), &[1.0]).await.unwrap();
        store.upsert_document(&doc("T1", "home", "b"), &[1.0]).await.unwrap();
        store.upsert_document(&doc("T2", "home", "c"), &[1.0]).await.unwrap();

        assert_eq!(store.len(), 3);
        let work = store.get_indexed_thread_ids("work").await.unwrap();
        assert_eq!(work, HashSet::from(["T1".to_string()]));
        let home = store.get_indexed_thread_ids("home").await.unwrap();
        assert_eq!(home.len(), 2);
    }

    #[tokio::test]
    async fn stats_aggregate() {
        let store = InMemoryStore::new(1);
        let empty = store.stats().await.unwrap();
        assert_eq!(empty.total_documents, 0);
        assert_eq!(empty.oldest, None);

        let mut early = doc("T1", "work", "a");
        early.created_at = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        early.message_count = 4;
        let mut late = doc("T1", "home", "b");
        late.updated_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        late.source_type = SourceType::Document;
        store.upsert_document(&early, &[1.0]).await.unwrap();
        store.upsert_document(&late, &[1.0]).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.total_threads, 1);
        assert_eq!(stats.documents_by_source["work"], 1);
        assert_eq!(stats.documents_by_type["document"], 1);
        assert_eq!(stats.oldest, Some(early.created_at));
        assert_eq!(stats.newest, Some(late.updated_at));
        assert!((stats.average_message_count - 3.0).abs() < 1e-9);
    }
}
