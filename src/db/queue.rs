//! Per-provider upgrade queue
//!
//! Each provider gets its own table with a single `item_id` primary key. The
//! table is the source of truth for the backlog: entries survive restarts and
//! are only removed once a dispatch for them has been acknowledged.
//!
//! Every mutating call (and the batch read that precedes a dispatch) runs in
//! its own transaction. Nothing spans repopulation and drain, so a crash in
//! between leaves either an empty or a populated-but-undrained queue.

use sqlx::SqlitePool;
use tracing::debug;

use crate::providers::ItemId;

/// Table name for a provider's queue. Anything outside `[a-z0-9_]` becomes `_`.
pub fn queue_table_name(provider: &str) -> String {
    let suffix: String = provider
        .trim()
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' }
        })
        .collect();
    format!("upgrade_queue_{}", suffix)
}

/// Queue repository for one provider
#[derive(Clone)]
pub struct QueueRepository {
    pool: SqlitePool,
    table: String,
}

impl QueueRepository {
    /// Open the queue for `provider`, creating its table if it does not exist
    pub async fn open(pool: SqlitePool, provider: &str) -> Result<Self, sqlx::Error> {
        let table = queue_table_name(provider);

        sqlx::query(&format!(
            "CREATE TABLE IF NOT EXISTS {} (item_id INTEGER PRIMARY KEY NOT NULL)",
            table
        ))
        .execute(&pool)
        .await?;

        Ok(Self { pool, table })
    }

    /// Number of queued items
    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    /// Enqueue items; ids already queued are ignored.
    /// Returns how many rows were actually inserted.
    pub async fn insert_many(&self, ids: &[ItemId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("INSERT OR IGNORE INTO {} (item_id) VALUES (?)", self.table);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for id in ids {
            inserted += sqlx::query(&sql)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        debug!(table = %self.table, requested = ids.len(), inserted, "Queue insert");
        Ok(inserted)
    }

    /// Up to `limit` queued ids in primary key order
    pub async fn select_batch(&self, limit: usize) -> Result<Vec<ItemId>, sqlx::Error> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut tx = self.pool.begin().await?;

        let ids: Vec<ItemId> = sqlx::query_scalar(&format!(
            "SELECT item_id FROM {} ORDER BY item_id LIMIT ?",
            self.table
        ))
        .bind(limit)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(ids)
    }

    /// Remove items from the queue. Returns how many rows were deleted.
    pub async fn delete_many(&self, ids: &[ItemId]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM {} WHERE item_id = ?", self.table);
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for id in ids {
            deleted += sqlx::query(&sql)
                .bind(id)
                .execute(&mut *tx)
                .await?
                .rows_affected();
        }

        tx.commit().await?;

        debug!(table = %self.table, requested = ids.len(), deleted, "Queue delete");
        Ok(deleted)
    }
}
