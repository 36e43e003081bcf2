//! # threadvec CLI
//!
//! ## Usage
//!
//! ```bash
//! threadvec --config ./config/threadvec.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `threadvec init` | Create the SQLite database and run schema migrations |
//! | `threadvec index <file>` | Group, embed, and store items from a JSON/JSONL file |
//! | `threadvec search "<query>"` | Semantic search over indexed threads |
//! | `threadvec stats` | Summarize the index |
//! | `threadvec get <id>` | Print one stored document |

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use threadvec::config::{self, Config};
use threadvec::embedding::{create_embedder, Embedder};
use threadvec::items::load_items;
use threadvec::pipeline::{CancelFlag, IndexOptions, IndexReport, IndexingPipeline};
use threadvec::progress::ProgressMode;
use threadvec::search::SearchRequest;
use threadvec::sink::{IndexSink, PartialWriteError};
use threadvec::sqlite_store::SqliteStore;
use threadvec::{get, logging, migrate, search, stats};

/// threadvec: thread-aware semantic indexing for mail, calendar, and documents.
#[derive(Parser)]
#[command(name = "threadvec", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/threadvec.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema. Idempotent.
    Init,

    /// Index items from a JSON array or JSON Lines file.
    ///
    /// Items are grouped into threads per source; threads already stored
    /// for a source are skipped unless `--reindex` is given.
    Index {
        /// Items file (JSON array or JSONL).
        file: PathBuf,

        /// Index every item under this source name instead of the name
        /// resolved from each item's metadata or tags.
        #[arg(long)]
        source: Option<String>,

        /// Re-embed threads that are already stored.
        #[arg(long)]
        reindex: bool,

        /// Milliseconds to wait between embedding calls (overrides config).
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Character cap on synthesized content, 0 to disable (overrides config).
        #[arg(long)]
        max_content: Option<usize>,

        /// Progress output on stderr: off, human, or json. Defaults to human on a TTY.
        #[arg(long)]
        progress: Option<String>,
    },

    /// Search indexed threads.
    Search {
        query: String,

        /// Only threads of this source type (email, calendar, document, ...).
        #[arg(long = "type")]
        source_type: Option<String>,

        /// Only threads from this source name.
        #[arg(long)]
        source: Option<String>,

        /// Drop results scoring below this (0..=1).
        #[arg(long)]
        min_score: Option<f64>,

        /// Maximum number of results.
        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Show index statistics.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Print one stored document by id.
    Get {
        id: i64,

        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();
    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized at {}", cfg.db.path.display());
        }
        Commands::Index {
            file,
            source,
            reindex,
            delay_ms,
            max_content,
            progress,
        } => {
            let mode = match progress.as_deref() {
                Some(value) => match ProgressMode::parse(value) {
                    Some(mode) => mode,
                    None => bail!("Unknown progress mode: '{}'. Use off, human, or json.", value),
                },
                None => ProgressMode::default_for_tty(),
            };

            let mut opts = IndexOptions::from_config(&cfg.indexing);
            opts.reindex = reindex;
            if let Some(ms) = delay_ms {
                opts.inter_embed_delay = std::time::Duration::from_millis(ms);
            }
            if let Some(max) = max_content {
                opts.max_content_length = max;
            }
            opts.progress = mode.reporter();
            opts.cancel = Some(cancel_on_ctrl_c());

            run_index(&cfg, &file, source.as_deref(), opts).await?;
        }
        Commands::Search {
            query,
            source_type,
            source,
            min_score,
            limit,
            json,
        } => {
            let request = SearchRequest {
                source_type,
                source_name: source,
                min_score,
                limit,
            };
            search::run_search(&cfg, &query, &request, json).await?;
        }
        Commands::Stats { json } => {
            stats::run_stats(&cfg, json).await?;
        }
        Commands::Get { id, json } => {
            get::run_get(&cfg, id, json).await?;
        }
    }

    Ok(())
}

async fn run_index(
    cfg: &Config,
    file: &std::path::Path,
    source: Option<&str>,
    opts: IndexOptions,
) -> Result<()> {
    if !cfg.embedding.is_enabled() {
        bail!("Indexing requires embeddings. Set [embedding] provider in config.");
    }

    let items = load_items(file)?;
    let embedder = create_embedder(&cfg.embedding)?;
    let store = SqliteStore::open(&cfg.db.path, embedder.dims()).await?;

    let result: Result<Vec<IndexReport>> = match source {
        Some(name) => IndexingPipeline::new(&store, embedder.as_ref())
            .index(name, &items, &opts)
            .await
            .map(|report| vec![report]),
        None => IndexSink::new(&store, embedder.as_ref(), opts).write(&items).await,
    };

    store.close().await;
    embedder.close().await?;

    let reports = match result {
        Ok(reports) => reports,
        Err(err) => {
            if let Some(partial) = err.downcast_ref::<PartialWriteError>() {
                for report in &partial.completed {
                    println!("{}", report);
                }
            }
            return Err(err);
        }
    };
    if reports.is_empty() {
        println!("No items to index.");
    }
    for report in &reports {
        println!("{}", report);
    }
    Ok(())
}

/// First Ctrl-C requests a cooperative stop between groups.
fn cancel_on_ctrl_c() -> CancelFlag {
    let flag = CancelFlag::new();
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, stopping after the current group");
            handle.cancel();
        }
    });
    flag
}
