//! Indexing pipeline orchestration.
//!
//! Coordinates the flow for one source: items → thread groups → synthesized
//! content → embedding → vector store. Re-runs are incremental: groups whose
//! thread id is already stored for the source are skipped unless `reindex`
//! is set.
//!
//! Failures are sorted by blast radius:
//! - embedding or upsert errors for one group are logged, counted as
//!   `failed`, and the run moves on;
//! - failing to read the already-indexed set aborts the run with the source
//!   name attached.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

use threadvec_core::embedding::Embedder;
use threadvec_core::grouping::{group_items, sorted_groups};
use threadvec_core::models::{Document, Group, Item};
use threadvec_core::store::VectorStore;
use threadvec_core::synth::synthesize;

use crate::config::IndexingConfig;
use crate::progress::{IndexProgressEvent, NoProgress, ProgressReporter};

/// Appended to content cut at `max_content_length`.
pub const TRUNCATION_MARKER: &str = "\n\n[... content truncated]";

/// Cooperative cancellation, checked between groups.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run knobs.
#[derive(Clone)]
pub struct IndexOptions {
    /// Re-embed groups even when their thread id is already stored.
    pub reindex: bool,
    /// Pause before each embedding call after the first successful one.
    pub inter_embed_delay: Duration,
    /// Character cap on synthesized content; `0` disables truncation.
    pub max_content_length: usize,
    pub cancel: Option<CancelFlag>,
    pub progress: Arc<dyn ProgressReporter>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            reindex: false,
            inter_embed_delay: Duration::ZERO,
            max_content_length: 0,
            cancel: None,
            progress: Arc::new(NoProgress),
        }
    }
}

impl IndexOptions {
    pub fn from_config(config: &IndexingConfig) -> Self {
        Self {
            inter_embed_delay: config.inter_embed_delay(),
            max_content_length: config.max_content_length,
            ..Default::default()
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Outcome of one `index` call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub source_name: String,
    pub groups: usize,
    pub indexed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: bool,
}

impl fmt::Display for IndexReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "index {}: {} groups, {} indexed, {} skipped, {} failed",
            self.source_name, self.groups, self.indexed, self.skipped, self.failed
        )?;
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}

/// Drives grouping, synthesis, embedding, and storage for one source at a time.
pub struct IndexingPipeline<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
}

impl<'a> IndexingPipeline<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder) -> Self {
        Self { store, embedder }
    }

    /// Index every item under `source_name`.
    ///
    /// Returns an error only for source-level failures; per-group failures
    /// show up in [`IndexReport::failed`].
    pub async fn index(
        &self,
        source_name: &str,
        items: &[Item],
        opts: &IndexOptions,
    ) -> Result<IndexReport> {
        let groups = sorted_groups(group_items(items, source_name));
        let total = groups.len();
        let mut report = IndexReport {
            source_name: source_name.to_string(),
            groups: total,
            ..Default::default()
        };

        opts.progress.report(IndexProgressEvent::Grouped {
            source: source_name.to_string(),
            groups: total as u64,
        });
        tracing::info!(source = source_name, items = items.len(), groups = total, "grouped items");

        let already_indexed = if opts.reindex {
            Default::default()
        } else {
            self.store
                .get_indexed_thread_ids(source_name)
                .await
                .with_context(|| format!("index source '{}'", source_name))?
        };

        let mut embedded_once = false;

        for (n, group) in groups.iter().enumerate() {
            if opts.is_cancelled() {
                report.cancelled = true;
                tracing::warn!(source = source_name, processed = n, total, "indexing cancelled");
                break;
            }

            if already_indexed.contains(&group.key) {
                report.skipped += 1;
            } else {
                if embedded_once && !opts.inter_embed_delay.is_zero() {
                    tokio::time::sleep(opts.inter_embed_delay).await;
                }
                match self.index_group(group, opts.max_content_length).await {
                    Ok(id) => {
                        embedded_once = true;
                        report.indexed += 1;
                        tracing::debug!(source = source_name, thread = %group.key, id, "indexed group");
                    }
                    Err(GroupFailure::Embed(e)) => {
                        report.failed += 1;
                        tracing::warn!(source = source_name, thread = %group.key, error = %e, "embedding failed");
                    }
                    Err(GroupFailure::Store(e)) => {
                        // The embedding itself succeeded, so the delay still applies.
                        embedded_once = true;
                        report.failed += 1;
                        tracing::warn!(source = source_name, thread = %group.key, error = %e, "upsert failed");
                    }
                }
            }

            opts.progress.report(IndexProgressEvent::Indexing {
                source: source_name.to_string(),
                n: (n + 1) as u64,
                total: total as u64,
            });
        }

        tracing::info!(
            source = source_name,
            indexed = report.indexed,
            skipped = report.skipped,
            failed = report.failed,
            cancelled = report.cancelled,
            "indexing finished"
        );
        Ok(report)
    }

    async fn index_group(&self, group: &Group, max_content_length: usize) -> Result<i64, GroupFailure> {
        let synthesized = synthesize(group);
        let mut metadata = synthesized.metadata;
        let content = match truncate_content(&synthesized.content, max_content_length) {
            Some((truncated, original_length)) => {
                tracing::info!(
                    thread = %group.key,
                    original_length,
                    max_content_length,
                    "truncated synthesized content"
                );
                if let Value::Object(map) = &mut metadata {
                    map.insert("original_length".into(), original_length.into());
                }
                truncated
            }
            None => synthesized.content,
        };

        let vector = self
            .embedder
            .embed(&content)
            .await
            .map_err(GroupFailure::Embed)?;

        let doc = Document::from_group(group, content, metadata);
        self.store
            .upsert_document(&doc, &vector)
            .await
            .map_err(GroupFailure::Store)
    }
}

enum GroupFailure {
    Embed(anyhow::Error),
    Store(anyhow::Error),
}

/// Cut `content` to `max` characters plus [`TRUNCATION_MARKER`].
///
/// Returns `None` when no cut is needed, else the new text and the original
/// character count.
pub fn truncate_content(content: &str, max: usize) -> Option<(String, usize)> {
    if max == 0 {
        return None;
    }
    let length = content.chars().count();
    if length <= max {
        return None;
    }
    let mut truncated: String = content.chars().take(max).collect();
    truncated.push_str(TRUNCATION_MARKER);
    Some((truncated, length))
}
