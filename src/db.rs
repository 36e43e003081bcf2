//! SQLite database connection management.
//!
//! Provides a connection pool with WAL mode enabled, so concurrent pipeline
//! invocations and searches can read while a single writer commits. The
//! database file and its parent directories are created if missing.
//!
//! # Connection Pool
//!
//! Uses `sqlx::SqlitePool` with up to 5 connections. Each pipeline
//! invocation acquires its own connection per statement or transaction.

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::config::Config;

/// Create a connection pool to the configured SQLite database.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    connect_path(&config.db.path).await
}

/// Create a connection pool for an explicit database path.
///
/// - Creates the database file and parent directories if they don't exist.
/// - Enables WAL journal mode and foreign keys.
/// - Waits up to 5 seconds on a locked database instead of failing.
pub async fn connect_path(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
