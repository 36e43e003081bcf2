//! Storage abstraction for threadvec.
//!
//! The [`VectorStore`] trait covers everything the indexing pipeline and the
//! query path need from persistence: the dedup/upsert protocol, the
//! already-indexed lookup, nearest-neighbor search, and corpus stats.
//! Backends: SQLite in the app crate, [`memory::InMemoryStore`] here.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use std::collections::{BTreeMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::embedding::{distance_to_score, l2_distance};
use crate::models::{Document, SourceType};

/// Typed store failures that callers may want to tell apart.
///
/// These travel inside `anyhow::Error`; use `err.downcast_ref::<StoreError>()`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The vector length differs from the store's configured dimensionality.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Persisted metadata is not valid JSON.
    #[error("malformed metadata for document {id}: {source}")]
    Metadata {
        id: i64,
        #[source]
        source: serde_json::Error,
    },

    /// A vector component is NaN or infinite.
    #[error("embedding component {index} is not finite")]
    NonFinite { index: usize },

    /// A persisted timestamp is not valid RFC 3339.
    #[error("malformed timestamp {value:?} for document {id}")]
    Timestamp { id: i64, value: String },
}

/// Reject vectors whose length differs from `expected`.
pub fn validate_dimensions(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    if vector.len() != expected {
        return Err(StoreError::DimensionMismatch {
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Reject vectors of the wrong length or with NaN/infinite components.
///
/// Both stores call this on every upsert and every query.
pub fn validate_vector(expected: usize, vector: &[f32]) -> Result<(), StoreError> {
    validate_dimensions(expected, vector)?;
    match vector.iter().position(|v| !v.is_finite()) {
        Some(index) => Err(StoreError::NonFinite { index }),
        None => Ok(()),
    }
}

/// Optional narrowing applied to a search.
#[derive(Debug, Clone, Default)]
pub struct SearchFilters {
    /// Equality filter on source type, applied before ranking.
    pub source_type: Option<SourceType>,
    /// Equality filter on source name, applied before ranking.
    pub source_name: Option<String>,
    /// Drop hits scoring below this, applied after ranking.
    pub min_score: Option<f64>,
}

/// One ranked search result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub document: Document,
    /// L2 distance to the query; lower is closer.
    pub distance: f64,
    /// `1 / (1 + distance)`, in `(0, 1]`.
    pub score: f64,
}

/// Corpus-wide statistics.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct StoreStats {
    pub total_documents: i64,
    pub total_threads: i64,
    pub documents_by_source: BTreeMap<String, i64>,
    pub documents_by_type: BTreeMap<String, i64>,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub average_message_count: f64,
}

/// Abstract storage backend for documents and their embeddings.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](VectorStore::upsert_document) | Insert or replace a document and its vector atomically |
/// | [`is_indexed`](VectorStore::is_indexed) | Existence check on `(thread_id, source_name)` |
/// | [`get_indexed_thread_ids`](VectorStore::get_indexed_thread_ids) | All thread ids stored for a source |
/// | [`search`](VectorStore::search) | Nearest-neighbor query with filters |
/// | [`get_document`](VectorStore::get_document) | Fetch by internal id |
/// | [`stats`](VectorStore::stats) | Corpus statistics |
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Fixed vector length accepted by this store.
    fn dimensions(&self) -> usize;

    /// Insert or replace the document keyed by `(thread_id, source_name)`.
    ///
    /// The vector length is validated before anything is written. On
    /// conflict the existing row keeps its internal id; its vector is
    /// deleted and re-inserted in the same transaction. Returns the
    /// internal id.
    async fn upsert_document(&self, doc: &Document, embedding: &[f32]) -> Result<i64>;

    async fn is_indexed(&self, thread_id: &str, source_name: &str) -> Result<bool>;

    async fn get_indexed_thread_ids(&self, source_name: &str) -> Result<HashSet<String>>;

    /// Return up to `limit` documents closest to `query`, ascending by distance.
    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>>;

    async fn get_document(&self, id: i64) -> Result<Option<Document>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Rank pre-filtered candidates by distance to `query`.
///
/// Shared by the linear-scan backends: sorts ascending by distance (ties by
/// internal id), keeps the `limit` closest, then applies `min_score`.
pub fn rank_candidates<I>(query: &[f32], candidates: I, limit: usize, min_score: Option<f64>) -> Vec<SearchHit>
where
    I: IntoIterator<Item = (Document, Vec<f32>)>,
{
    let mut hits: Vec<SearchHit> = candidates
        .into_iter()
        .map(|(document, vector)| {
            // Rows written before finiteness was enforced must not outrank real matches.
            let distance = match l2_distance(query, &vector) {
                d if d.is_finite() => d,
                _ => f64::INFINITY,
            };
            SearchHit {
                document,
                distance,
                score: distance_to_score(distance),
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        a.distance
            .total_cmp(&b.distance)
            .then_with(|| a.document.id.cmp(&b.document.id))
    });
    hits.truncate(limit);

    if let Some(min) = min_score {
        hits.retain(|h| h.score >= min);
    }
    hits
}
