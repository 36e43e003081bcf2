//! Index statistics overview.
//!
//! Summarizes what is indexed: document and thread counts, per-source and
//! per-type breakdowns, the covered time span, and the average thread size.
//! Used by `threadvec stats` to confirm indexing runs are landing.

use anyhow::Result;
use chrono::{DateTime, Utc};

use threadvec_core::store::{StoreStats, VectorStore};

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Open the configured database and collect its stats.
pub async fn collect_stats(config: &Config) -> Result<StoreStats> {
    let store = SqliteStore::open(&config.db.path, config.embedding.dims.unwrap_or(0)).await?;
    let stats = store.stats().await;
    store.close().await;
    stats
}

/// Run the stats command: query the database and print a summary.
pub async fn run_stats(config: &Config, json: bool) -> Result<()> {
    let stats = collect_stats(config).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("threadvec index stats");
    println!("=====================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", stats.total_documents);
    println!("  Threads:     {}", stats.total_threads);
    println!("  Avg size:    {:.1} messages", stats.average_message_count);
    println!("  Oldest:      {}", format_date(stats.oldest));
    println!("  Newest:      {}", format_date(stats.newest));

    if !stats.documents_by_source.is_empty() {
        println!();
        println!("  By source:");
        println!("  {:<24} {:>6}", "SOURCE", "DOCS");
        println!("  {}", "-".repeat(31));
        for (source, count) in &stats.documents_by_source {
            println!("  {:<24} {:>6}", source, count);
        }
    }

    if !stats.documents_by_type.is_empty() {
        println!();
        println!("  By type:");
        for (source_type, count) in &stats.documents_by_type {
            println!("  {:<24} {:>6}", source_type, count);
        }
    }

    println!();
    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

fn format_date(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}
