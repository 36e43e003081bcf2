//! Write boundary for fetched items.
//!
//! [`IndexSink`] accepts a mixed batch, partitions it by each item's
//! resolved source name, and runs the [`IndexingPipeline`] once per source
//! in name order.

use std::collections::BTreeMap;

use anyhow::Result;

use threadvec_core::embedding::Embedder;
use threadvec_core::models::Item;
use threadvec_core::store::VectorStore;

use crate::pipeline::{IndexOptions, IndexReport, IndexingPipeline};

/// A source-level failure part way through [`IndexSink::write`].
///
/// Travels inside `anyhow::Error`; use `err.downcast_ref::<PartialWriteError>()`
/// to recover the reports of the sources that completed.
#[derive(Debug, thiserror::Error)]
#[error("indexing stopped at source '{failed_source}' ({} earlier source(s) completed)", .completed.len())]
pub struct PartialWriteError {
    pub completed: Vec<IndexReport>,
    pub failed_source: String,
    #[source]
    pub error: anyhow::Error,
}

pub struct IndexSink<'a> {
    pipeline: IndexingPipeline<'a>,
    options: IndexOptions,
}

impl<'a> IndexSink<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder, options: IndexOptions) -> Self {
        Self {
            pipeline: IndexingPipeline::new(store, embedder),
            options,
        }
    }

    /// Index `items`, one pipeline run per source.
    ///
    /// A source-level failure aborts the whole write with a
    /// [`PartialWriteError`] that still carries the reports of the sources
    /// finished before it; their documents stay indexed.
    pub async fn write(&self, items: &[Item]) -> Result<Vec<IndexReport>> {
        let mut reports = Vec::new();

        for (source_name, batch) in partition_by_source(items) {
            if self
                .options
                .cancel
                .as_ref()
                .is_some_and(|c| c.is_cancelled())
            {
                break;
            }
            match self.pipeline.index(&source_name, &batch, &self.options).await {
                Ok(report) => reports.push(report),
                Err(error) => {
                    return Err(PartialWriteError {
                        completed: reports,
                        failed_source: source_name,
                        error,
                    }
                    .into())
                }
            }
        }

        Ok(reports)
    }
}

/// Split a batch by [`Item::source_name`], keeping input order within a source.
pub fn partition_by_source(items: &[Item]) -> BTreeMap<String, Vec<Item>> {
    let mut by_source: BTreeMap<String, Vec<Item>> = BTreeMap::new();
    for item in items {
        by_source.entry(item.source_name()).or_default().push(item.clone());
    }
    by_source
}
