//! # threadvec core
//!
//! Pure logic shared by every threadvec frontend: item and document models,
//! thread grouping, content synthesis, the embedding trait, and the vector
//! store abstraction with an in-memory backend.
//!
//! This crate contains no tokio, sqlx, or filesystem I/O.

pub mod embedding;
pub mod grouping;
pub mod models;
pub mod store;
pub mod synth;
