//! Vector cache and similarity engine.
//!
//! Wraps an [`EmbeddingProvider`] with a bounded content-addressed LRU
//! cache, long-text chunking, and cosine similarity against a baseline
//! vector derived from the user's context document.
//!
//! An engine instance is scoped to one filtering run (or one explicitly
//! long-lived engine serving many runs against the same context). Baseline
//! and cache state are never shared across engines, so concurrent runs
//! backed by different contexts cannot contaminate each other. The
//! underlying provider handle is stateless and may be shared freely.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

use futures::future;
use lru::LruCache;
use tracing::{debug, warn};

use crate::chunk::split_text;
use crate::config::SimilarityConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RadarError, Result};
use crate::models::Item;
use crate::progress::ModelProgressReporter;

/// Context-point matches below this cosine score are not worth explaining.
const CONTEXT_POINT_FLOOR: f32 = 0.3;

/// Similarity engine with a request-scoped vector cache.
pub struct SimilarityEngine {
    provider: Arc<dyn EmbeddingProvider>,
    config: SimilarityConfig,
    baseline: Option<Vec<f32>>,
    /// Context points embedded alongside the baseline, for fine-grained
    /// match explanations.
    points: Vec<(String, Vec<f32>)>,
    cache: Mutex<LruCache<u64, Vec<f32>>>,
}

impl SimilarityEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: SimilarityConfig) -> Self {
        let capacity = NonZeroUsize::new(config.cache_capacity.max(1))
            .expect("cache capacity is at least 1");
        Self {
            provider,
            config,
            baseline: None,
            points: Vec::new(),
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Initialize the underlying provider (may download model weights).
    pub async fn init(&self, progress: &dyn ModelProgressReporter) -> Result<()> {
        self.provider.init(progress).await
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Embed the context document and set it as the comparison baseline.
    ///
    /// A baseline failure aborts the run — without it no similarity can
    /// be computed, so this propagates instead of degrading.
    pub async fn set_baseline(&mut self, text: &str) -> Result<()> {
        let vector = self.embed_cached(text).await?;
        self.baseline = Some(vector);
        Ok(())
    }

    /// Embed each context point for later per-item match explanations.
    ///
    /// Points are explanatory only: a failed embedding drops that point
    /// with a warning rather than failing the run.
    pub async fn set_context_points(&mut self, points: &[String]) -> Result<()> {
        let mut embedded = Vec::with_capacity(points.len());
        for point in points {
            match self.embed_cached(point).await {
                Ok(vector) => embedded.push((point.clone(), vector)),
                Err(e) => warn!(point = %point, error = %e, "skipping context point"),
            }
        }
        self.points = embedded;
        Ok(())
    }

    /// Similarity of `text` against the baseline, in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// [`RadarError::Precondition`] if no baseline is set;
    /// [`RadarError::Provider`] if the embedding call fails.
    pub async fn similarity(&self, text: &str) -> Result<f32> {
        let baseline = self
            .baseline
            .as_ref()
            .ok_or(RadarError::Precondition("baseline not set"))?;
        let vector = self.embed_cached(text).await?;
        Ok(cosine_similarity(baseline, &vector).clamp(0.0, 1.0))
    }

    /// Similarity for a batch of items, computed in fixed-size concurrent
    /// groups of `concurrency` to bound pressure on the provider.
    ///
    /// A failed embedding for one item degrades that item to 0.0 rather
    /// than aborting the batch: one bad item must not cancel a run.
    pub async fn batch_similarity(
        &self,
        items: &[Item],
        concurrency: usize,
    ) -> Result<HashMap<String, f32>> {
        if self.baseline.is_none() {
            return Err(RadarError::Precondition("baseline not set"));
        }

        let width = concurrency.max(1);
        let mut scores = HashMap::with_capacity(items.len());

        for group in items.chunks(width) {
            let futures = group.iter().map(|item| async move {
                let score = match self.similarity(&item.embed_text()).await {
                    Ok(score) => score,
                    Err(e) => {
                        warn!(item = %item.id, error = %e, "similarity failed, scoring 0");
                        0.0
                    }
                };
                (item.id.clone(), score)
            });

            for (id, score) in future::join_all(futures).await {
                scores.insert(id, score);
            }
            debug!(scored = scores.len(), total = items.len(), "similarity progress");
        }

        Ok(scores)
    }

    /// The context point closest to `text`, if any clears the floor.
    pub async fn best_context_point(&self, text: &str) -> Option<(String, f32)> {
        if self.points.is_empty() {
            return None;
        }
        let vector = match self.embed_cached(text).await {
            Ok(vector) => vector,
            Err(_) => return None,
        };
        self.points
            .iter()
            .map(|(point, pv)| (point.clone(), cosine_similarity(pv, &vector)))
            .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
            .filter(|(_, score)| *score >= CONTEXT_POINT_FLOOR)
    }

    /// Embed `text`, consulting the cache first.
    ///
    /// Long texts are split into overlapping chunks, each chunk embedded,
    /// and the results combined by geometrically decaying weights (earlier
    /// chunks carry more of the document's framing), re-normalized to unit
    /// length.
    async fn embed_cached(&self, text: &str) -> Result<Vec<f32>> {
        let key = content_key(text);
        if let Some(vector) = self
            .cache
            .lock()
            .expect("vector cache lock poisoned")
            .get(&key)
        {
            return Ok(vector.clone());
        }

        let chunks = split_text(text, self.config.chunk_chars, self.config.chunk_overlap);
        let vectors = self.provider.embed(&chunks).await?;
        if vectors.len() != chunks.len() {
            return Err(RadarError::Provider(format!(
                "provider returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }

        let combined = if vectors.len() == 1 {
            normalized(&vectors[0])
        } else {
            weighted_combine(&vectors, self.config.chunk_decay)
        };

        self.cache
            .lock()
            .expect("vector cache lock poisoned")
            .put(key, combined.clone());
        Ok(combined)
    }
}

/// Cheap content-addressed cache key. Not cryptographic; collisions are
/// tolerable at this cache's scale.
fn content_key(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    hasher.finish()
}

fn normalized(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}

/// Weighted average of chunk vectors with geometric position decay,
/// re-normalized to unit length.
fn weighted_combine(vectors: &[Vec<f32>], decay: f32) -> Vec<f32> {
    let dims = vectors[0].len();
    let mut combined = vec![0.0f32; dims];
    let mut weight = 1.0f32;

    for vector in vectors {
        let unit = normalized(vector);
        for (acc, x) in combined.iter_mut().zip(unit.iter()) {
            *acc += weight * x;
        }
        weight *= decay;
    }

    normalized(&combined)
}

/// Compute cosine similarity between two vectors, clamped to `[-1, 1]`.
///
/// Returns `0.0` for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    (dot / denom).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic provider: returns a fixed vector per known text,
    /// a constant otherwise, and counts texts embedded.
    struct StubProvider {
        map: HashMap<String, Vec<f32>>,
        fail_on: Option<String>,
        embedded: AtomicUsize,
    }

    impl StubProvider {
        fn new() -> Self {
            Self {
                map: HashMap::new(),
                fail_on: None,
                embedded: AtomicUsize::new(0),
            }
        }

        fn with(mut self, text: &str, vector: Vec<f32>) -> Self {
            self.map.insert(text.to_string(), vector);
            self
        }
    }

    #[async_trait]
    impl EmbeddingProvider for StubProvider {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
            texts
                .iter()
                .map(|t| {
                    if self.fail_on.as_deref() == Some(t.as_str()) {
                        Err(RadarError::Provider("stub failure".to_string()))
                    } else {
                        Ok(self.map.get(t).cloned().unwrap_or_else(|| vec![1.0, 0.0]))
                    }
                })
                .collect()
        }
    }

    fn engine_with(provider: StubProvider) -> SimilarityEngine {
        SimilarityEngine::new(Arc::new(provider), SimilarityConfig::default())
    }

    fn item(id: &str, title: &str) -> Item {
        Item {
            id: id.to_string(),
            source: "test".to_string(),
            title: title.to_string(),
            description: String::new(),
            url: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn similarity_requires_baseline() {
        let engine = engine_with(StubProvider::new());
        let err = engine.similarity("anything").await.unwrap_err();
        assert!(matches!(err, RadarError::Precondition(_)));
    }

    #[tokio::test]
    async fn batch_requires_baseline() {
        let engine = engine_with(StubProvider::new());
        let err = engine
            .batch_similarity(&[item("a", "x")], 10)
            .await
            .unwrap_err();
        assert!(matches!(err, RadarError::Precondition(_)));
    }

    #[tokio::test]
    async fn cache_dedupes_provider_calls() {
        let provider = Arc::new(StubProvider::new());
        let mut engine =
            SimilarityEngine::new(provider.clone(), SimilarityConfig::default());
        engine.set_baseline("context").await.unwrap();
        engine.similarity("repeated").await.unwrap();
        engine.similarity("repeated").await.unwrap();
        engine.similarity("repeated").await.unwrap();
        // baseline + one distinct text = 2 embedded texts total
        assert_eq!(provider.embedded.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn similarity_matches_expected_cosine() {
        let provider = StubProvider::new()
            .with("context", vec![1.0, 0.0])
            .with("item", vec![0.8, 0.6]);
        let mut engine = engine_with(provider);
        engine.set_baseline("context").await.unwrap();
        let score = engine.similarity("item").await.unwrap();
        assert!((score - 0.8).abs() < 1e-5);
    }

    #[tokio::test]
    async fn negative_cosine_clamps_to_zero() {
        let provider = StubProvider::new()
            .with("context", vec![1.0, 0.0])
            .with("item", vec![-1.0, 0.0]);
        let mut engine = engine_with(provider);
        engine.set_baseline("context").await.unwrap();
        assert_eq!(engine.similarity("item").await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn failed_item_scores_zero_without_aborting() {
        let mut provider = StubProvider::new().with("context", vec![1.0, 0.0]);
        provider.fail_on = Some("bad".to_string());
        let mut engine = engine_with(provider);
        engine.set_baseline("context").await.unwrap();

        let items = vec![item("good", "fine"), item("broken", "bad")];
        let scores = engine.batch_similarity(&items, 10).await.unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores["broken"], 0.0);
        assert!(scores["good"] > 0.9);
    }

    #[tokio::test]
    async fn long_text_is_chunk_combined_and_unit_length() {
        let provider = Arc::new(StubProvider::new());
        let config = SimilarityConfig {
            chunk_chars: 40,
            chunk_overlap: 8,
            ..Default::default()
        };
        let mut engine = SimilarityEngine::new(provider.clone(), config);
        engine.set_baseline("context").await.unwrap();

        let long_text = "signal detection over content feeds ".repeat(10);
        let score = engine.similarity(&long_text).await.unwrap();
        // Every stub vector is [1, 0]; the weighted combination stays on
        // the unit circle, so similarity against [1, 0] is exactly 1.
        assert!((score - 1.0).abs() < 1e-5);
        // Multiple chunks were actually embedded.
        assert!(provider.embedded.load(Ordering::SeqCst) > 2);
    }

    #[tokio::test]
    async fn best_context_point_picks_closest() {
        let provider = StubProvider::new()
            .with("context", vec![1.0, 0.0])
            .with("near point", vec![0.9, 0.435889894])
            .with("far point", vec![0.0, 1.0])
            .with("item", vec![1.0, 0.0]);
        let mut engine = engine_with(provider);
        engine.set_baseline("context").await.unwrap();
        engine
            .set_context_points(&["near point".to_string(), "far point".to_string()])
            .await
            .unwrap();

        let (point, score) = engine.best_context_point("item").await.unwrap();
        assert_eq!(point, "near point");
        assert!(score > 0.8);
    }

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }
}
