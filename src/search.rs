//! Semantic search over indexed thread documents.
//!
//! The query is embedded with the configured provider, then ranked by L2
//! distance inside the store. Source filters narrow candidates before
//! ranking; `min_score` drops weak hits afterwards.

use anyhow::{bail, Result};
use serde::Serialize;

use threadvec_core::models::SourceType;
use threadvec_core::store::{SearchFilters, SearchHit, VectorStore};

use crate::config::Config;
use crate::embedding::{create_embedder, Embedder};
use crate::sqlite_store::SqliteStore;

/// Caller-supplied search options; unset fields fall back to `[retrieval]`.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub source_type: Option<String>,
    pub source_name: Option<String>,
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
}

/// Flattened search result, shaped for JSON output.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub id: i64,
    pub thread_id: String,
    pub title: String,
    pub source_name: String,
    pub source_type: SourceType,
    pub message_count: i64,
    pub score: f64,
    pub distance: f64,
    pub updated_at: String,
    pub snippet: String,
}

impl From<&SearchHit> for SearchResultItem {
    fn from(hit: &SearchHit) -> Self {
        let doc = &hit.document;
        Self {
            id: doc.id,
            thread_id: doc.thread_id.clone(),
            title: doc.title.clone(),
            source_name: doc.source_name.clone(),
            source_type: doc.source_type.clone(),
            message_count: doc.message_count,
            score: hit.score,
            distance: hit.distance,
            updated_at: doc.updated_at.format("%Y-%m-%d").to_string(),
            snippet: snippet(&doc.content, 240),
        }
    }
}

/// Embed `query` and search any [`VectorStore`].
pub async fn search_store(
    store: &dyn VectorStore,
    embedder: &dyn Embedder,
    query: &str,
    limit: usize,
    filters: &SearchFilters,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() {
        return Ok(Vec::new());
    }
    let vector = embedder.embed(query).await?;
    store.search(&vector, limit, filters).await
}

/// Core search function returning structured data.
pub async fn search_documents(
    config: &Config,
    query: &str,
    request: &SearchRequest,
) -> Result<Vec<SearchResultItem>> {
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let limit = request.limit.unwrap_or(config.retrieval.final_limit);
    if limit < 1 {
        bail!("limit must be >= 1");
    }
    let min_score = request.min_score.unwrap_or(config.retrieval.min_score);
    let filters = SearchFilters {
        source_type: request.source_type.as_deref().map(SourceType::parse),
        source_name: request.source_name.clone(),
        min_score: (min_score > 0.0).then_some(min_score),
    };

    let embedder = create_embedder(&config.embedding)?;
    let store = SqliteStore::open(&config.db.path, embedder.dims()).await?;

    let hits = search_store(&store, embedder.as_ref(), query, limit, &filters).await;
    store.close().await;
    embedder.close().await?;

    Ok(hits?.iter().map(SearchResultItem::from).collect())
}

/// CLI entry point: prints ranked results or JSON.
pub async fn run_search(config: &Config, query: &str, request: &SearchRequest, json: bool) -> Result<()> {
    let results = search_documents(config, query, request).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        let title = if result.title.is_empty() {
            "(no subject)"
        } else {
            result.title.as_str()
        };
        println!("{}. [{:.3}] {} / {}", i + 1, result.score, result.source_name, title);
        println!("    updated: {}", result.updated_at);
        println!("    type: {}  messages: {}", result.source_type, result.message_count);
        println!("    excerpt: \"{}\"", result.snippet);
        println!("    id: {}", result.id);
        println!();
    }

    Ok(())
}

/// First `max` characters of `content` on one line.
fn snippet(content: &str, max: usize) -> String {
    let flat = content.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max {
        return flat;
    }
    let mut cut: String = flat.chars().take(max).collect();
    cut.push_str("...");
    cut
}
