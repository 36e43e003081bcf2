//! Document retrieval by id.

use anyhow::{anyhow, Result};

use threadvec_core::models::Document;
use threadvec_core::store::VectorStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Fetch one stored document, failing when the id is unknown.
pub async fn get_document(config: &Config, id: i64) -> Result<Document> {
    let store = SqliteStore::open(&config.db.path, config.embedding.dims.unwrap_or(0)).await?;
    let doc = store.get_document(id).await;
    store.close().await;
    doc?.ok_or_else(|| anyhow!("document not found: {}", id))
}

/// CLI entry point: prints the document header, metadata, and content.
pub async fn run_get(config: &Config, id: i64, json: bool) -> Result<()> {
    let doc = get_document(config, id).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("--- Document ---");
    println!("id:            {}", doc.id);
    println!("title:         {}", doc.title);
    println!("thread_id:     {}", doc.thread_id);
    println!("source:        {} ({})", doc.source_name, doc.source_type);
    println!("source_id:     {}", doc.source_id);
    println!("messages:      {}", doc.message_count);
    println!("created_at:    {}", doc.created_at.to_rfc3339());
    println!("updated_at:    {}", doc.updated_at.to_rfc3339());
    println!("indexed_at:    {}", doc.indexed_at.to_rfc3339());
    println!("metadata:      {}", doc.metadata);
    println!();
    println!("--- Content ---");
    println!("{}", doc.content);

    Ok(())
}
