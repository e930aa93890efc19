//! Core data models used throughout Signal Radar.
//!
//! These types represent the items, novelty records, and signal results
//! that flow through the filtering and ranking pipeline.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Normalized content item produced by a feed source.
///
/// Immutable once ingested; the pipeline only derives per-run fields
/// ([`SignalResult`]) and never mutates the item itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    /// Caller-supplied unique id (unique within one run).
    pub id: String,
    /// Source name (e.g. `"github"`, `"hackernews"`, `"reddit"`).
    pub source: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub url: String,
    /// Open key→value map carrying source-specific fields
    /// (timestamps, stars, points, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Item {
    /// Text fed to the similarity engine: title and description.
    /// URL and metadata carry no semantic content worth embedding.
    pub fn embed_text(&self) -> String {
        let title = self.title.trim();
        let desc = self.description.trim();
        if desc.is_empty() {
            title.to_string()
        } else if title.is_empty() {
            desc.to_string()
        } else {
            format!("{}\n\n{}", title, desc)
        }
    }

    /// Lowercased searchable text used for keyword classification.
    pub fn search_text(&self) -> String {
        format!("{} {}", self.title, self.description).to_lowercase()
    }
}

/// Why an item matters. Exactly one category is always assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalType {
    Competitive,
    ThesisChallenging,
    Opportunity,
    Technical,
    Trend,
}

impl SignalType {
    /// All five categories in matching priority order.
    pub const ALL: [SignalType; 5] = [
        SignalType::Competitive,
        SignalType::ThesisChallenging,
        SignalType::Opportunity,
        SignalType::Technical,
        SignalType::Trend,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::Competitive => "competitive",
            SignalType::ThesisChallenging => "thesis-challenging",
            SignalType::Opportunity => "opportunity",
            SignalType::Technical => "technical",
            SignalType::Trend => "trend",
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How certain the classifier is about the assigned category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

/// Classification outcome for a single item.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub signal_type: SignalType,
    pub confidence: Confidence,
    pub matched_keyword: Option<String>,
    pub is_watched: bool,
}

/// Per-item novelty state owned by the novelty store.
///
/// `first_seen` never changes after creation; `last_seen` and `seen_count`
/// refresh on every later sighting. Survives process restarts when a
/// durable backend is configured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoveltyRecord {
    pub item_id: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub seen_count: u32,
    /// Caller metadata stored alongside the record (source, title, ...).
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl NoveltyRecord {
    pub fn new(item_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            item_id: item_id.to_string(),
            first_seen: now,
            last_seen: now,
            seen_count: 1,
            metadata: serde_json::Map::new(),
        }
    }
}

/// Weighted sub-scores behind a composite score. Each is 0–100.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub recency: f64,
    pub engagement: f64,
}

/// A ranked signal: the item plus everything derived for it in this run.
/// Never persisted; recomputed per run.
#[derive(Debug, Clone, Serialize)]
pub struct SignalResult {
    pub item: Item,
    pub signal_type: SignalType,
    pub confidence: Confidence,
    pub matched_keyword: Option<String>,
    pub is_watched: bool,
    /// Templated one-line explanation of why this item surfaced.
    pub reason: String,
    /// Closest context point from the user's context document, if any.
    pub matched_context_point: Option<String>,
    /// Relevance scaled to 0–100.
    pub relevance_score: u8,
    /// Novelty scaled to 0–100.
    pub novelty_score: u8,
    /// Final 0–100 ranking value.
    pub composite_score: u8,
    pub score_breakdown: ScoreBreakdown,
}

/// Pass-rate counters for one source within a run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SourcePassRate {
    /// Items from this source that entered the scoring phase.
    pub considered: u64,
    /// Items from this source that survived both threshold gates.
    pub passed: u64,
}

/// Aggregate statistics for one filtering run.
#[derive(Debug, Clone, Serialize)]
pub struct FilterStats {
    /// Run id for log correlation.
    pub run_id: String,
    pub total_items: u64,
    pub dropped_invalid: u64,
    pub below_relevance: u64,
    pub below_novelty: u64,
    pub signals: u64,
    pub per_source: HashMap<String, SourcePassRate>,
}
