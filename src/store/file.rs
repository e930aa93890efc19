//! Single-file JSON [`NoveltyBackend`].
//!
//! The whole store is one JSON object mapping item id → record. Saves
//! read-merge-write the full file and land through a temp-file rename, so
//! a crash mid-save leaves the previous state intact. An entry cap evicts
//! oldest-by-`last_seen` records when exceeded.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{RadarError, Result};
use crate::models::NoveltyRecord;

use super::{evict_oldest, NoveltyBackend};

pub struct JsonFileBackend {
    path: PathBuf,
    max_entries: usize,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries: max_entries.max(1),
        }
    }

    /// Number of stored records. Used by the maintenance CLI.
    pub async fn count(&self) -> Result<usize> {
        Ok(read_map(&self.path).await?.len())
    }
}

async fn read_map(path: &Path) -> Result<HashMap<String, NoveltyRecord>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(RadarError::persistence),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(e) => Err(RadarError::persistence(e)),
    }
}

async fn write_map(path: &Path, records: &HashMap<String, NoveltyRecord>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(RadarError::persistence)?;
        }
    }

    let bytes = serde_json::to_vec(records).map_err(RadarError::persistence)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(RadarError::persistence)?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(RadarError::persistence)?;
    Ok(())
}

#[async_trait]
impl NoveltyBackend for JsonFileBackend {
    async fn load(&self, ids: &[String]) -> Result<HashMap<String, NoveltyRecord>> {
        let stored = read_map(&self.path).await?;
        Ok(ids
            .iter()
            .filter_map(|id| stored.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn save(&self, records: &[NoveltyRecord]) -> Result<()> {
        let mut stored = read_map(&self.path).await?;
        for record in records {
            stored.insert(record.item_id.clone(), record.clone());
        }
        evict_oldest(&mut stored, self.max_entries);
        write_map(&self.path, &stored).await
    }

    async fn clear(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RadarError::persistence(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tempfile::TempDir;

    fn backend(dir: &TempDir, cap: usize) -> JsonFileBackend {
        JsonFileBackend::new(dir.path().join("novelty.json"), cap)
    }

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir, 100);

        let now = Utc::now();
        let mut record = NoveltyRecord::new("abc", now);
        record.seen_count = 3;
        store.save(&[record]).await.unwrap();

        let loaded = store.load(&["abc".to_string()]).await.unwrap();
        assert_eq!(loaded["abc"].seen_count, 3);
        assert_eq!(loaded["abc"].first_seen, now);
    }

    #[tokio::test]
    async fn load_missing_file_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir, 100);
        let loaded = store.load(&["nothing".to_string()]).await.unwrap();
        assert!(loaded.is_empty());
    }

    #[tokio::test]
    async fn save_merges_with_existing_entries() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir, 100);
        let now = Utc::now();

        store.save(&[NoveltyRecord::new("a", now)]).await.unwrap();
        store.save(&[NoveltyRecord::new("b", now)]).await.unwrap();

        let loaded = store
            .load(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 2);
    }

    #[tokio::test]
    async fn cap_evicts_oldest_by_last_seen() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir, 2);
        let now = Utc::now();

        let mut old = NoveltyRecord::new("old", now - Duration::days(10));
        old.last_seen = now - Duration::days(10);
        let mut mid = NoveltyRecord::new("mid", now - Duration::days(5));
        mid.last_seen = now - Duration::days(5);
        let fresh = NoveltyRecord::new("fresh", now);

        store.save(&[old, mid, fresh]).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);

        let loaded = store
            .load(&["old".to_string(), "mid".to_string(), "fresh".to_string()])
            .await
            .unwrap();
        assert!(!loaded.contains_key("old"));
        assert!(loaded.contains_key("mid"));
        assert!(loaded.contains_key("fresh"));
    }

    #[tokio::test]
    async fn clear_removes_file() {
        let dir = TempDir::new().unwrap();
        let store = backend(&dir, 100);
        store
            .save(&[NoveltyRecord::new("a", Utc::now())])
            .await
            .unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        // Clearing twice is fine.
        store.clear().await.unwrap();
    }
}
