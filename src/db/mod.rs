//! Database connection and repositories

pub mod queue;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

pub use queue::{QueueRepository, queue_table_name};

/// Database wrapper providing connection pool access
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (and create if missing) the SQLite file at `url`.
    ///
    /// Accepts either a plain path (`./data/upgradarr.db`) or a `sqlite:` URL.
    /// The pool always holds at least one connection.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let url = if url.starts_with("sqlite:") {
            url.to_string()
        } else {
            if let Some(parent) = std::path::Path::new(url).parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
            format!("sqlite://{}", url)
        };

        let options = SqliteConnectOptions::from_str(&url)
            .with_context(|| format!("Invalid database URL {}", url))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", url))?;

        debug!(url = %url, "Database connected");
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection keeps every query on
    /// the same memory store.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;

        Ok(Self { pool })
    }

    /// Get the upgrade queue for a provider, creating its table if needed
    pub async fn queue(&self, provider: &str) -> Result<QueueRepository, sqlx::Error> {
        QueueRepository::open(self.pool.clone(), provider).await
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
