//! Decay-based novelty tracking.
//!
//! Novelty is a 0–1 measure of how long ago an item was **first** seen,
//! not simple seen/unseen. The clock is anchored to the first sighting on
//! purpose: an item that keeps resurfacing is "perpetually trending", not
//! new, and re-appearing must not reset its decay.
//!
//! Writes are buffered in memory; durable storage is only touched by an
//! explicit [`flush`](NoveltyStore::flush), which persists exactly the
//! records touched since the last flush. A crash before flush loses those
//! buffered updates and nothing else.

use std::collections::{HashMap, HashSet};
use std::f64::consts::LN_2;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::NoveltyConfig;
use crate::error::Result;
use crate::models::NoveltyRecord;
use crate::store::file::JsonFileBackend;
use crate::store::memory::InMemoryBackend;
use crate::store::sqlite::SqliteBackend;
use crate::store::NoveltyBackend;

const SECONDS_PER_DAY: f64 = 86_400.0;

pub struct NoveltyStore {
    backend: Box<dyn NoveltyBackend>,
    half_life_days: f64,
    min_score: f64,
    cache: HashMap<String, NoveltyRecord>,
    /// Ids touched since the last flush.
    pending: HashSet<String>,
}

impl NoveltyStore {
    pub fn new(backend: Box<dyn NoveltyBackend>, half_life_days: f64, min_score: f64) -> Self {
        Self {
            backend,
            half_life_days: half_life_days.max(f64::EPSILON),
            min_score: min_score.clamp(0.0, 1.0),
            cache: HashMap::new(),
            pending: HashSet::new(),
        }
    }

    /// Build a store from configuration: `memory`, `file`, or `sqlite`.
    pub async fn from_config(config: &NoveltyConfig) -> Result<Self> {
        let backend: Box<dyn NoveltyBackend> = match config.backend.as_str() {
            "memory" => Box::new(InMemoryBackend::new()),
            "file" => Box::new(JsonFileBackend::new(&config.path, config.max_entries)),
            "sqlite" => {
                Box::new(SqliteBackend::connect(&config.path, config.max_entries).await?)
            }
            other => {
                return Err(crate::error::RadarError::Persistence(format!(
                    "unknown novelty backend: {}",
                    other
                )))
            }
        };
        Ok(Self::new(backend, config.half_life_days, config.min_score))
    }

    /// Pre-warm the cache from durable storage for the given ids.
    /// Unknown ids are a no-op; already-cached ids are not reloaded.
    pub async fn load_batch(&mut self, ids: &[String]) -> Result<()> {
        let missing: Vec<String> = ids
            .iter()
            .filter(|id| !self.cache.contains_key(*id))
            .cloned()
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let loaded = self.backend.load(&missing).await?;
        debug!(requested = missing.len(), found = loaded.len(), "novelty load");
        self.cache.extend(loaded);
        Ok(())
    }

    /// Novelty in `[min_score, 1.0]` as of now.
    pub fn novelty_score(&self, id: &str) -> f64 {
        self.score_at(id, Utc::now())
    }

    /// Novelty as of `now`: 1.0 when never seen, otherwise half-life decay
    /// from the first sighting, floored at `min_score`.
    pub fn score_at(&self, id: &str, now: DateTime<Utc>) -> f64 {
        let Some(record) = self.cache.get(id) else {
            return 1.0;
        };
        let days = (now - record.first_seen).num_milliseconds() as f64 / (SECONDS_PER_DAY * 1e3);
        if days <= 0.0 {
            return 1.0;
        }
        let decayed = (-LN_2 / self.half_life_days * days).exp();
        decayed.max(self.min_score)
    }

    /// Record a sighting now. See [`mark_seen_at`](Self::mark_seen_at).
    pub fn mark_seen(&mut self, id: &str, metadata: serde_json::Map<String, serde_json::Value>) {
        self.mark_seen_at(id, metadata, Utc::now());
    }

    /// Record a sighting at `now`: creates the record on first sight,
    /// otherwise refreshes `last_seen` and increments `seen_count`.
    /// `first_seen` is never rewritten. The write is buffered until
    /// [`flush`](Self::flush).
    pub fn mark_seen_at(
        &mut self,
        id: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        match self.cache.get_mut(id) {
            Some(record) => {
                record.last_seen = now;
                record.seen_count = record.seen_count.saturating_add(1);
                for (key, value) in metadata {
                    record.metadata.insert(key, value);
                }
            }
            None => {
                let mut record = NoveltyRecord::new(id, now);
                record.metadata = metadata;
                self.cache.insert(id.to_string(), record);
            }
        }
        self.pending.insert(id.to_string());
    }

    /// Whether the id has a cached record (seen before or in this run).
    pub fn is_known(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    pub fn seen_count(&self, id: &str) -> u32 {
        self.cache.get(id).map(|r| r.seen_count).unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Persist every record touched since the last flush, then clear the
    /// pending set. Flushing an empty pending set never calls the backend.
    pub async fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let records: Vec<NoveltyRecord> = self
            .pending
            .iter()
            .filter_map(|id| self.cache.get(id).cloned())
            .collect();
        self.backend.save(&records).await?;
        debug!(flushed = records.len(), "novelty flush");
        self.pending.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap as StdHashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    /// Backend that counts save calls, for flush semantics tests.
    #[derive(Default)]
    struct CountingBackend {
        saves: Arc<AtomicUsize>,
        saved_records: Arc<std::sync::Mutex<Vec<NoveltyRecord>>>,
    }

    #[async_trait]
    impl NoveltyBackend for CountingBackend {
        async fn load(&self, _ids: &[String]) -> Result<StdHashMap<String, NoveltyRecord>> {
            Ok(StdHashMap::new())
        }
        async fn save(&self, records: &[NoveltyRecord]) -> Result<()> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.saved_records
                .lock()
                .unwrap()
                .extend(records.iter().cloned());
            Ok(())
        }
    }

    fn store(half_life_days: f64, min_score: f64) -> NoveltyStore {
        NoveltyStore::new(Box::new(InMemoryBackend::new()), half_life_days, min_score)
    }

    #[test]
    fn unseen_scores_one() {
        let s = store(7.0, 0.05);
        assert_eq!(s.novelty_score("never"), 1.0);
    }

    #[test]
    fn fresh_sighting_scores_one() {
        let mut s = store(7.0, 0.05);
        let now = Utc::now();
        s.mark_seen_at("a", serde_json::Map::new(), now);
        assert_eq!(s.score_at("a", now), 1.0);
    }

    #[test]
    fn decays_by_half_life() {
        let mut s = store(1.0, 0.0);
        let now = Utc::now();
        s.mark_seen_at("a", serde_json::Map::new(), now);

        let one = s.score_at("a", now + Duration::days(1));
        let two = s.score_at("a", now + Duration::days(2));
        assert!((one - 0.5).abs() < 1e-9);
        assert!((two - 0.25).abs() < 1e-9);
    }

    #[test]
    fn decay_is_strictly_monotonic() {
        let mut s = store(3.0, 0.0);
        let now = Utc::now();
        s.mark_seen_at("a", serde_json::Map::new(), now);

        let mut previous = s.score_at("a", now);
        for hours in (6..96).step_by(6) {
            let score = s.score_at("a", now + Duration::hours(hours));
            assert!(score < previous, "score not decreasing at {}h", hours);
            previous = score;
        }
    }

    #[test]
    fn score_never_falls_below_floor() {
        let mut s = store(1.0, 0.2);
        let now = Utc::now();
        s.mark_seen_at("a", serde_json::Map::new(), now);
        assert_eq!(s.score_at("a", now + Duration::days(365)), 0.2);
    }

    #[test]
    fn resighting_preserves_first_seen_and_counts() {
        let mut s = store(7.0, 0.05);
        let now = Utc::now();
        s.mark_seen_at("a", serde_json::Map::new(), now);
        s.mark_seen_at("a", serde_json::Map::new(), now + Duration::days(3));

        let record = s.cache.get("a").unwrap();
        assert_eq!(record.first_seen, now);
        assert_eq!(record.last_seen, now + Duration::days(3));
        assert_eq!(record.seen_count, 2);
        // The decay clock did not reset.
        assert!(s.score_at("a", now + Duration::days(3)) < 1.0);
    }

    #[tokio::test]
    async fn empty_flush_skips_backend() {
        let backend = CountingBackend::default();
        let saves = backend.saves.clone();
        let mut s = NoveltyStore::new(Box::new(backend), 7.0, 0.05);

        s.flush().await.unwrap();
        assert_eq!(saves.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn flush_persists_pending_once() {
        let backend = CountingBackend::default();
        let saves = backend.saves.clone();
        let saved = backend.saved_records.clone();
        let mut s = NoveltyStore::new(Box::new(backend), 7.0, 0.05);

        s.mark_seen("a", serde_json::Map::new());
        s.mark_seen("b", serde_json::Map::new());
        assert_eq!(s.pending_count(), 2);

        s.flush().await.unwrap();
        assert_eq!(saves.load(Ordering::SeqCst), 1);
        assert_eq!(saved.lock().unwrap().len(), 2);
        assert_eq!(s.pending_count(), 0);

        // Nothing new touched: the backend stays untouched.
        s.flush().await.unwrap();
        assert_eq!(saves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn load_batch_prewarms_cache() {
        let backend = InMemoryBackend::new();
        let past = Utc::now() - Duration::days(2);
        backend.insert(NoveltyRecord::new("old", past));
        let mut s = NoveltyStore::new(Box::new(backend), 1.0, 0.0);

        s.load_batch(&["old".to_string(), "new".to_string()])
            .await
            .unwrap();
        assert!(s.is_known("old"));
        assert!(!s.is_known("new"));
        // Two days at a one-day half-life.
        let score = s.novelty_score("old");
        assert!((score - 0.25).abs() < 0.01);
    }
}
