//! Persistence port for novelty records.
//!
//! The [`NoveltyBackend`] trait is the narrow seam between the decay logic
//! and durable storage: bulk load by id list and bulk save, plus an
//! optional `clear`. Backends must be `Send + Sync` to work with async
//! runtimes; in-memory implementations return immediately-ready futures.
//!
//! | Backend | Module | Durability |
//! |---------|--------|------------|
//! | Process memory | [`memory`] | none (default) |
//! | Single JSON file | [`file`] | capped, oldest-by-`last_seen` eviction |
//! | Local SQLite | [`sqlite`] | capped, same eviction |
//!
//! Custom backends (e.g. a remote cache with TTL) plug in by implementing
//! the same two operations; the decay logic never changes.

pub mod file;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::NoveltyRecord;

/// Abstract storage backend for novelty records.
#[async_trait]
pub trait NoveltyBackend: Send + Sync {
    /// Bulk load records for the given ids. Unknown ids are simply absent
    /// from the returned map.
    async fn load(&self, ids: &[String]) -> Result<HashMap<String, NoveltyRecord>>;

    /// Persist the given records, overwriting any stored versions of the
    /// same ids. Each save is a full, idempotent overwrite of the affected
    /// keys.
    async fn save(&self, records: &[NoveltyRecord]) -> Result<()>;

    /// Remove all stored records. Optional; the default is a no-op.
    async fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Keep the newest `max_entries` records by `last_seen`, dropping the rest.
/// Shared eviction policy for the capped durable backends.
pub(crate) fn evict_oldest(records: &mut HashMap<String, NoveltyRecord>, max_entries: usize) {
    if records.len() <= max_entries {
        return;
    }
    let mut by_age: Vec<(String, chrono::DateTime<chrono::Utc>)> = records
        .iter()
        .map(|(id, r)| (id.clone(), r.last_seen))
        .collect();
    by_age.sort_by_key(|(_, last_seen)| *last_seen);
    let excess = records.len() - max_entries;
    for (id, _) in by_age.into_iter().take(excess) {
        records.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn evict_oldest_drops_by_last_seen() {
        let now = Utc::now();
        let mut records = HashMap::new();
        for i in 0..5i64 {
            let mut record = NoveltyRecord::new(&format!("item-{}", i), now);
            record.last_seen = now - Duration::days(i);
            records.insert(record.item_id.clone(), record);
        }

        evict_oldest(&mut records, 3);
        assert_eq!(records.len(), 3);
        // Oldest two (largest day offsets) are gone.
        assert!(records.contains_key("item-0"));
        assert!(records.contains_key("item-1"));
        assert!(records.contains_key("item-2"));
        assert!(!records.contains_key("item-4"));
    }

    #[test]
    fn evict_noop_under_cap() {
        let mut records = HashMap::new();
        records.insert(
            "only".to_string(),
            NoveltyRecord::new("only", Utc::now()),
        );
        evict_oldest(&mut records, 10);
        assert_eq!(records.len(), 1);
    }
}
