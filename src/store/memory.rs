//! In-memory [`NoveltyBackend`] for tests and single-shot runs.
//!
//! Non-durable: state lives behind a `std::sync::RwLock` and dies with the
//! process. This is the default backend when nothing is configured.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::NoveltyRecord;

use super::NoveltyBackend;

#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<HashMap<String, NoveltyRecord>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record directly, bypassing the save path. Test helper.
    pub fn insert(&self, record: NoveltyRecord) {
        self.records
            .write()
            .expect("novelty memory lock poisoned")
            .insert(record.item_id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .expect("novelty memory lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NoveltyBackend for InMemoryBackend {
    async fn load(&self, ids: &[String]) -> Result<HashMap<String, NoveltyRecord>> {
        let records = self.records.read().expect("novelty memory lock poisoned");
        Ok(ids
            .iter()
            .filter_map(|id| records.get(id).map(|r| (id.clone(), r.clone())))
            .collect())
    }

    async fn save(&self, records: &[NoveltyRecord]) -> Result<()> {
        let mut stored = self.records.write().expect("novelty memory lock poisoned");
        for record in records {
            stored.insert(record.item_id.clone(), record.clone());
        }
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.records
            .write()
            .expect("novelty memory lock poisoned")
            .clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn save_then_load_roundtrip() {
        let backend = InMemoryBackend::new();
        let record = NoveltyRecord::new("a", Utc::now());
        backend.save(&[record]).await.unwrap();

        let loaded = backend
            .load(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded["a"].seen_count, 1);
    }

    #[tokio::test]
    async fn clear_empties_store() {
        let backend = InMemoryBackend::new();
        backend
            .save(&[NoveltyRecord::new("a", Utc::now())])
            .await
            .unwrap();
        backend.clear().await.unwrap();
        assert!(backend.is_empty());
    }
}
