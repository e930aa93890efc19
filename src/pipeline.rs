//! Filtering pipeline orchestration.
//!
//! Coordinates one run end to end: input validation → context binding →
//! relevance scoring (bounded concurrency) → novelty gating → keyword
//! classification → composite scoring → ranked output plus per-source
//! pass-rate statistics.
//!
//! Threshold order follows the data flow: the relevance gate runs first,
//! so items that are off-topic never touch the novelty store, and items
//! failing either gate never pay for classification.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classify::Classifier;
use crate::config::Config;
use crate::context::{extract_context_points, parse_context};
use crate::embedding::create_provider;
use crate::error::{RadarError, Result};
use crate::models::{FilterStats, Item, SignalResult, SourcePassRate};
use crate::novelty::NoveltyStore;
use crate::score::{sort_signals, Scorer, SortKey};
use crate::similarity::SimilarityEngine;

/// Phases of one filtering run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Init,
    ContextBound,
    Scoring,
    Classifying,
    Scored,
    Done,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Init => "init",
            RunPhase::ContextBound => "context-bound",
            RunPhase::Scoring => "scoring",
            RunPhase::Classifying => "classifying",
            RunPhase::Scored => "scored",
            RunPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Per-run options for the pipeline entry point.
#[derive(Debug, Clone)]
pub struct FilterOptions {
    /// Minimum similarity to keep an item (default 0.30).
    pub relevance_threshold: f32,
    /// Minimum novelty to keep an item (default 0.5).
    pub novelty_threshold: f64,
    /// Width of the concurrent similarity groups (default 10).
    pub concurrency: usize,
    /// Global watch keywords; any hit forces `is_watched`.
    pub watch_keywords: Vec<String>,
    /// Per-category keyword overrides, keyed by category name.
    pub keyword_overrides: HashMap<String, Vec<String>>,
    pub sort: SortKey,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            relevance_threshold: 0.30,
            novelty_threshold: 0.5,
            concurrency: 10,
            watch_keywords: Vec::new(),
            keyword_overrides: HashMap::new(),
            sort: SortKey::Composite,
        }
    }
}

impl FilterOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            relevance_threshold: config.filter.relevance_threshold,
            novelty_threshold: config.filter.novelty_threshold,
            concurrency: config.filter.concurrency,
            watch_keywords: config.watch.keywords.clone(),
            keyword_overrides: config.keywords.clone(),
            sort: SortKey::Composite,
        }
    }
}

/// Everything one run produces.
#[derive(Debug)]
pub struct FilterOutcome {
    /// Ranked signals, ordered by the configured sort key.
    pub signals: Vec<SignalResult>,
    pub stats: FilterStats,
}

pub struct FilterPipeline {
    engine: SimilarityEngine,
    novelty: Option<NoveltyStore>,
    scorer: Scorer,
    options: FilterOptions,
}

impl FilterPipeline {
    /// Assemble a pipeline from parts. Pass a pre-initialized engine to
    /// reuse a warmed provider across runs; pass `None` for `novelty` to
    /// fall back to a binary seen-in-this-run check.
    pub fn new(
        engine: SimilarityEngine,
        novelty: Option<NoveltyStore>,
        scorer: Scorer,
        options: FilterOptions,
    ) -> Self {
        Self {
            engine,
            novelty,
            scorer,
            options,
        }
    }

    /// Build the whole pipeline (provider, engine, novelty store, scorer)
    /// from configuration.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let provider = create_provider(&config.embedding)?;
        let engine = SimilarityEngine::new(provider, config.similarity.clone());
        let novelty = if config.novelty.backend == "none" {
            None
        } else {
            Some(NoveltyStore::from_config(&config.novelty).await?)
        };
        let scorer = Scorer::new(config.scoring.clone());
        Ok(Self::new(
            engine,
            novelty,
            scorer,
            FilterOptions::from_config(config),
        ))
    }

    pub fn engine(&self) -> &SimilarityEngine {
        &self.engine
    }

    /// Replace the run options (CLI flag overrides, per-run thresholds).
    pub fn set_options(&mut self, options: FilterOptions) {
        self.options = options;
    }

    /// Run the full pipeline over `items` against `context_text`.
    ///
    /// # Errors
    ///
    /// - [`RadarError::InvalidInput`] — blank context or empty item list.
    /// - [`RadarError::Provider`] — the baseline embedding failed.
    /// - [`RadarError::Persistence`] — novelty load or flush failed.
    ///
    /// Individual defective items (missing id, failed embedding) degrade
    /// per item and never fail the run.
    pub async fn run(&mut self, items: Vec<Item>, context_text: &str) -> Result<FilterOutcome> {
        let run_id = Uuid::new_v4().to_string();

        // Init: validate input.
        debug!(run = %run_id, phase = %RunPhase::Init, items = items.len(), "run start");
        let context = context_text.trim();
        if context.is_empty() {
            return Err(RadarError::InvalidInput(
                "context document is empty".to_string(),
            ));
        }
        if items.is_empty() {
            return Err(RadarError::InvalidInput("no items to filter".to_string()));
        }

        let total_items = items.len() as u64;
        let mut dropped_invalid = 0u64;
        let valid: Vec<Item> = items
            .into_iter()
            .filter(|item| {
                if item.id.trim().is_empty() {
                    warn!(title = %item.title, source = %item.source, "dropping item without id");
                    dropped_invalid += 1;
                    false
                } else {
                    true
                }
            })
            .collect();

        let mut stats = FilterStats {
            run_id: run_id.clone(),
            total_items,
            dropped_invalid,
            below_relevance: 0,
            below_novelty: 0,
            signals: 0,
            per_source: HashMap::new(),
        };

        if valid.is_empty() {
            return Ok(FilterOutcome {
                signals: Vec::new(),
                stats,
            });
        }

        // ContextBound: baseline vector and keyword sets, once per run.
        debug!(run = %run_id, phase = %RunPhase::ContextBound, "binding context");
        self.engine.set_baseline(context).await?;
        self.engine
            .set_context_points(&extract_context_points(context))
            .await?;
        let keywords = parse_context(context);
        let classifier = Classifier::new(
            &keywords,
            &self.options.watch_keywords,
            &self.options.keyword_overrides,
        );

        // Scoring: relevance in bounded-concurrency groups, then novelty
        // in input order so duplicate ids see increasing seen counts.
        debug!(run = %run_id, phase = %RunPhase::Scoring, "scoring relevance");
        let relevance_scores = self
            .engine
            .batch_similarity(&valid, self.options.concurrency)
            .await?;

        if let Some(store) = &mut self.novelty {
            let ids: Vec<String> = valid.iter().map(|i| i.id.clone()).collect();
            store.load_batch(&ids).await?;
        }

        let now = Utc::now();
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut survivors: Vec<(Item, f32, f64)> = Vec::new();

        for item in &valid {
            let source_stats = stats
                .per_source
                .entry(item.source.clone())
                .or_insert_with(SourcePassRate::default);
            source_stats.considered += 1;

            let relevance = relevance_scores.get(&item.id).copied().unwrap_or(0.0);
            if relevance < self.options.relevance_threshold {
                stats.below_relevance += 1;
                continue;
            }

            let novelty = match &mut self.novelty {
                Some(store) => {
                    let score = store.score_at(&item.id, now);
                    store.mark_seen_at(&item.id, novelty_metadata(item), now);
                    score
                }
                // No store: binary seen-at-all-in-this-run check.
                None => {
                    if seen_this_run.insert(item.id.clone()) {
                        1.0
                    } else {
                        0.0
                    }
                }
            };
            if novelty < self.options.novelty_threshold {
                stats.below_novelty += 1;
                continue;
            }

            stats
                .per_source
                .get_mut(&item.source)
                .expect("source entry exists")
                .passed += 1;
            survivors.push((item.clone(), relevance, novelty));
        }

        // Classifying and Scored: only survivors pay for these.
        debug!(run = %run_id, phase = %RunPhase::Classifying, survivors = survivors.len(), "classifying");
        let mut signals = Vec::with_capacity(survivors.len());
        for (item, relevance, novelty) in survivors {
            let signal = classifier.classify(&item);
            let reason = classifier.reason(signal.signal_type, &item);
            let matched_context_point = self
                .engine
                .best_context_point(&item.embed_text())
                .await
                .map(|(point, _)| point);

            let (composite, breakdown) =
                self.scorer
                    .score(&item, Some(relevance), signal.confidence, now);

            signals.push(SignalResult {
                relevance_score: (relevance as f64 * 100.0).round().clamp(0.0, 100.0) as u8,
                novelty_score: (novelty * 100.0).round().clamp(0.0, 100.0) as u8,
                composite_score: composite,
                score_breakdown: breakdown,
                signal_type: signal.signal_type,
                confidence: signal.confidence,
                matched_keyword: signal.matched_keyword,
                is_watched: signal.is_watched,
                reason,
                matched_context_point,
                item,
            });
        }

        debug!(run = %run_id, phase = %RunPhase::Scored, "sorting");
        sort_signals(&mut signals, self.options.sort);
        stats.signals = signals.len() as u64;

        // Done: persist novelty updates.
        if let Some(store) = &mut self.novelty {
            store.flush().await?;
        }
        info!(
            run = %run_id,
            phase = %RunPhase::Done,
            total = stats.total_items,
            signals = stats.signals,
            below_relevance = stats.below_relevance,
            below_novelty = stats.below_novelty,
            "run complete"
        );

        Ok(FilterOutcome { signals, stats })
    }
}

/// Caller metadata stored on novelty records: enough to identify the item
/// when inspecting the store later.
fn novelty_metadata(item: &Item) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    map.insert("source".to_string(), serde_json::json!(item.source));
    if !item.title.is_empty() {
        map.insert("title".to_string(), serde_json::json!(item.title));
    }
    map
}
