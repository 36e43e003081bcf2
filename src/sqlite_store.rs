//! SQLite-backed [`VectorStore`] implementation.
//!
//! Documents live in `documents` (unique on `thread_id, source_name`) and
//! their vectors in `document_vectors` as little-endian f32 BLOBs. SQLite has
//! no vector update primitive, so replacing a vector is a delete followed by
//! an insert inside the same transaction as the document upsert.
//!
//! Nearest-neighbor search is a linear scan over the rows that pass the
//! equality filters; the filters run in SQL before any distance is computed.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use threadvec_core::embedding::{blob_to_vec, vec_to_blob};
use threadvec_core::models::{Document, SourceType};
use threadvec_core::store::{
    rank_candidates, validate_vector, SearchFilters, SearchHit, StoreError, StoreStats,
    VectorStore,
};

use crate::db;
use crate::migrate;

const DOCUMENT_COLUMNS: &str = "d.id, d.source_id, d.thread_id, d.title, d.content, d.source_type, \
     d.source_name, d.message_count, d.metadata_json, d.created_at, d.updated_at, d.indexed_at";

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    dimensions: usize,
}

impl SqliteStore {
    /// Wrap an existing pool whose schema is already migrated.
    pub fn new(pool: SqlitePool, dimensions: usize) -> Self {
        Self { pool, dimensions }
    }

    /// Connect to `path`, creating and migrating the database as needed.
    pub async fn open(path: &Path, dimensions: usize) -> Result<Self> {
        let pool = db::connect_path(path).await?;
        migrate::migrate_pool(&pool).await?;
        Ok(Self::new(pool, dimensions))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn document_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(id: i64, value: String) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::Timestamp { id, value })
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let id: i64 = row.try_get("id")?;
    let metadata_json: String = row.try_get("metadata_json")?;
    let metadata = serde_json::from_str(&metadata_json)
        .map_err(|source| StoreError::Metadata { id, source })?;
    let source_type: String = row.try_get("source_type")?;

    Ok(Document {
        id,
        source_id: row.try_get("source_id")?,
        thread_id: row.try_get("thread_id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        source_type: SourceType::parse(&source_type),
        source_name: row.try_get("source_name")?,
        message_count: row.try_get("message_count")?,
        metadata,
        created_at: parse_ts(id, row.try_get("created_at")?)?,
        updated_at: parse_ts(id, row.try_get("updated_at")?)?,
        indexed_at: parse_ts(id, row.try_get("indexed_at")?)?,
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn upsert_document(&self, doc: &Document, embedding: &[f32]) -> Result<i64> {
        validate_vector(self.dimensions, embedding)?;

        let metadata_json = serde_json::to_string(&doc.metadata)?;
        let indexed_at = format_ts(&Utc::now());
        let blob = vec_to_blob(embedding);

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO documents (source_id, thread_id, title, content, source_type,
                                   source_name, message_count, metadata_json,
                                   created_at, updated_at, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(thread_id, source_name) DO UPDATE SET
                source_id = excluded.source_id,
                title = excluded.title,
                content = excluded.content,
                source_type = excluded.source_type,
                message_count = excluded.message_count,
                metadata_json = excluded.metadata_json,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at,
                indexed_at = excluded.indexed_at
            RETURNING id
            "#,
        )
        .bind(&doc.source_id)
        .bind(&doc.thread_id)
        .bind(&doc.title)
        .bind(&doc.content)
        .bind(doc.source_type.as_str())
        .bind(&doc.source_name)
        .bind(doc.message_count)
        .bind(&metadata_json)
        .bind(format_ts(&doc.created_at))
        .bind(format_ts(&doc.updated_at))
        .bind(&indexed_at)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM document_vectors WHERE document_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO document_vectors (document_id, dims, embedding) VALUES (?, ?, ?)")
            .bind(id)
            .bind(embedding.len() as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    async fn is_indexed(&self, thread_id: &str, source_name: &str) -> Result<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM documents WHERE thread_id = ? AND source_name = ?",
        )
        .bind(thread_id)
        .bind(source_name)
        .fetch_one(&self.pool)
        .await?;
        Ok(count > 0)
    }

    async fn get_indexed_thread_ids(&self, source_name: &str) -> Result<HashSet<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT thread_id FROM documents WHERE source_name = ?")
                .bind(source_name)
                .fetch_all(&self.pool)
                .await?;
        Ok(ids.into_iter().collect())
    }

    async fn search(
        &self,
        query: &[f32],
        limit: usize,
        filters: &SearchFilters,
    ) -> Result<Vec<SearchHit>> {
        validate_vector(self.dimensions, query)?;

        let mut sql = format!(
            "SELECT {}, v.embedding FROM documents d \
             JOIN document_vectors v ON v.document_id = d.id \
             WHERE v.dims = ?",
            DOCUMENT_COLUMNS
        );
        if filters.source_type.is_some() {
            sql.push_str(" AND d.source_type = ?");
        }
        if filters.source_name.is_some() {
            sql.push_str(" AND d.source_name = ?");
        }

        let mut q = sqlx::query(&sql).bind(self.dimensions as i64);
        if let Some(source_type) = &filters.source_type {
            q = q.bind(source_type.as_str());
        }
        if let Some(source_name) = &filters.source_name {
            q = q.bind(source_name.as_str());
        }

        let rows = q.fetch_all(&self.pool).await?;
        let mut candidates = Vec::with_capacity(rows.len());
        for row in &rows {
            let blob: Vec<u8> = row.try_get("embedding")?;
            candidates.push((row_to_document(row)?, blob_to_vec(&blob)));
        }

        Ok(rank_candidates(query, candidates, limit, filters.min_score))
    }

    async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        let sql = format!("SELECT {} FROM documents d WHERE d.id = ?", DOCUMENT_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(row_to_document).transpose()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let totals = sqlx::query(
            r#"
            SELECT COUNT(*) AS total_documents,
                   COUNT(DISTINCT thread_id) AS total_threads,
                   MIN(created_at) AS oldest,
                   MAX(updated_at) AS newest,
                   AVG(message_count) AS average_message_count
            FROM documents
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let oldest: Option<String> = totals.try_get("oldest")?;
        let newest: Option<String> = totals.try_get("newest")?;
        let average: Option<f64> = totals.try_get("average_message_count")?;

        Ok(StoreStats {
            total_documents: totals.try_get("total_documents")?,
            total_threads: totals.try_get("total_threads")?,
            documents_by_source: self.count_by("source_name").await?,
            documents_by_type: self.count_by("source_type").await?,
            oldest: oldest.map(|v| parse_ts(0, v)).transpose()?,
            newest: newest.map(|v| parse_ts(0, v)).transpose()?,
            average_message_count: average.unwrap_or(0.0),
        })
    }
}

impl SqliteStore {
    async fn count_by(&self, column: &'static str) -> Result<BTreeMap<String, i64>> {
        let sql = format!(
            "SELECT {col} AS k, COUNT(*) AS n FROM documents GROUP BY {col}",
            col = column
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        let mut out = BTreeMap::new();
        for row in &rows {
            out.insert(row.try_get::<String, _>("k")?, row.try_get::<i64, _>("n")?);
        }
        Ok(out)
    }
}
