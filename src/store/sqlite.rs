//! SQLite-backed [`NoveltyBackend`].
//!
//! A single `novelty_records` table keyed by item id — the durable
//! key-value rendering of the store, with the same entry cap and
//! oldest-by-`last_seen` eviction as the file backend. Timestamps are
//! stored as unix milliseconds.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use sqlx::{Row, SqlitePool};

use crate::db;
use crate::error::{RadarError, Result};
use crate::models::NoveltyRecord;

use super::NoveltyBackend;

/// SQLite binds are limited to 999 variables; chunk id lists well under it.
const LOAD_CHUNK: usize = 500;

pub struct SqliteBackend {
    pool: SqlitePool,
    max_entries: usize,
}

impl SqliteBackend {
    /// Open (creating if missing) the database at `path` and ensure the
    /// schema exists. Idempotent.
    pub async fn connect(path: &Path, max_entries: usize) -> Result<Self> {
        let pool = db::connect(path).await.map_err(RadarError::persistence)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS novelty_records (
                item_id TEXT PRIMARY KEY,
                first_seen INTEGER NOT NULL,
                last_seen INTEGER NOT NULL,
                seen_count INTEGER NOT NULL,
                metadata_json TEXT NOT NULL DEFAULT '{}'
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(RadarError::persistence)?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_novelty_last_seen ON novelty_records(last_seen)",
        )
        .execute(&pool)
        .await
        .map_err(RadarError::persistence)?;

        Ok(Self {
            pool,
            max_entries: max_entries.max(1),
        })
    }

    /// Number of stored records. Used by the maintenance CLI.
    pub async fn count(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM novelty_records")
            .fetch_one(&self.pool)
            .await
            .map_err(RadarError::persistence)?;
        Ok(count as usize)
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<NoveltyRecord> {
    let item_id: String = row.get("item_id");
    let first_seen: i64 = row.get("first_seen");
    let last_seen: i64 = row.get("last_seen");
    let seen_count: i64 = row.get("seen_count");
    let metadata_json: String = row.get("metadata_json");

    let first_seen = DateTime::from_timestamp_millis(first_seen)
        .ok_or_else(|| RadarError::Persistence(format!("bad first_seen for {}", item_id)))?;
    let last_seen = DateTime::from_timestamp_millis(last_seen)
        .ok_or_else(|| RadarError::Persistence(format!("bad last_seen for {}", item_id)))?;
    let metadata = serde_json::from_str(&metadata_json).unwrap_or_default();

    Ok(NoveltyRecord {
        item_id,
        first_seen,
        last_seen,
        seen_count: seen_count.max(0) as u32,
        metadata,
    })
}

#[async_trait]
impl NoveltyBackend for SqliteBackend {
    async fn load(&self, ids: &[String]) -> Result<HashMap<String, NoveltyRecord>> {
        let mut records = HashMap::new();

        for chunk in ids.chunks(LOAD_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(",");
            let sql = format!(
                "SELECT item_id, first_seen, last_seen, seen_count, metadata_json \
                 FROM novelty_records WHERE item_id IN ({})",
                placeholders
            );

            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(id);
            }

            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(RadarError::persistence)?;
            for row in &rows {
                let record = row_to_record(row)?;
                records.insert(record.item_id.clone(), record);
            }
        }

        Ok(records)
    }

    async fn save(&self, records: &[NoveltyRecord]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(RadarError::persistence)?;

        for record in records {
            let metadata_json =
                serde_json::to_string(&record.metadata).map_err(RadarError::persistence)?;
            sqlx::query(
                r#"
                INSERT INTO novelty_records (item_id, first_seen, last_seen, seen_count, metadata_json)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(item_id) DO UPDATE SET
                    last_seen = excluded.last_seen,
                    seen_count = excluded.seen_count,
                    metadata_json = excluded.metadata_json
                "#,
            )
            .bind(&record.item_id)
            .bind(record.first_seen.timestamp_millis())
            .bind(record.last_seen.timestamp_millis())
            .bind(record.seen_count as i64)
            .bind(&metadata_json)
            .execute(&mut *tx)
            .await
            .map_err(RadarError::persistence)?;
        }

        // Enforce the cap: keep the newest rows by last_seen.
        sqlx::query(
            r#"
            DELETE FROM novelty_records WHERE item_id NOT IN (
                SELECT item_id FROM novelty_records ORDER BY last_seen DESC LIMIT ?
            )
            "#,
        )
        .bind(self.max_entries as i64)
        .execute(&mut *tx)
        .await
        .map_err(RadarError::persistence)?;

        tx.commit().await.map_err(RadarError::persistence)
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM novelty_records")
            .execute(&self.pool)
            .await
            .map_err(RadarError::persistence)?;
        Ok(())
    }
}
