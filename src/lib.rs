//! # threadvec
//!
//! Thread-aware semantic indexing and retrieval for personal records.
//!
//! Fetched items (mail, calendar events, documents) are grouped into
//! threads, each thread is rendered into one text document, embedded, and
//! stored in SQLite next to its vector. Search embeds the query and ranks
//! stored threads by distance.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────────────────┐   ┌──────────────┐
//! │ Items file  │──▶│ Pipeline                 │──▶│   SQLite     │
//! │ JSON/JSONL  │   │ Group → Synthesize→Embed │   │ docs + BLOBs │
//! └─────────────┘   └──────────────────────────┘   └──────┬───────┘
//!                                                         │
//!                                                         ▼
//!                                                  ┌─────────────┐
//!                                                  │ CLI search  │
//!                                                  │ stats / get │
//!                                                  └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! threadvec init
//! threadvec index ./items.jsonl
//! threadvec search "budget review" --type email
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite vector store |
//! | [`embedding`] | Embedding providers |
//! | [`pipeline`] | Per-source indexing |
//! | [`sink`] | Multi-source write boundary |
//! | [`items`] | Item file loading |
//! | [`search`] | Semantic search |
//! | [`stats`] | Index statistics |
//! | [`get`] | Document lookup |
//! | [`progress`] | Progress reporting |
//! | [`logging`] | Diagnostic log setup |
//!
//! Grouping, synthesis, and the storage trait live in `threadvec-core`.

pub mod config;
pub mod db;
pub mod embedding;
pub mod get;
pub mod items;
pub mod logging;
pub mod migrate;
pub mod pipeline;
pub mod progress;
pub mod search;
pub mod sink;
pub mod sqlite_store;
pub mod stats;
