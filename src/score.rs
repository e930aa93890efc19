//! Composite scoring and ordering.
//!
//! Blends three 0–100 components — relevance, recency, engagement — into
//! one integer composite per item. Engagement normalization is a lookup
//! table keyed by source name so adding a source is one entry, not another
//! arm of a conditional chain.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use crate::config::ScoringConfig;
use crate::models::{Confidence, Item, ScoreBreakdown, SignalResult};

/// Neutral engagement/recency value when nothing applies.
const NEUTRAL: f64 = 50.0;

/// Ordering key for the final ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Composite,
    Relevance,
    Recency,
    Engagement,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "composite" => Ok(SortKey::Composite),
            "relevance" => Ok(SortKey::Relevance),
            "recency" => Ok(SortKey::Recency),
            "engagement" => Ok(SortKey::Engagement),
            other => Err(format!(
                "unknown sort key: {}. Use composite, relevance, recency, or engagement.",
                other
            )),
        }
    }
}

pub struct Scorer {
    config: ScoringConfig,
}

impl Scorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score one item. `relevance` is the similarity in `[0, 1]` when the
    /// engine produced one; otherwise the confidence band stands in.
    pub fn score(
        &self,
        item: &Item,
        relevance: Option<f32>,
        confidence: Confidence,
        now: DateTime<Utc>,
    ) -> (u8, ScoreBreakdown) {
        let relevance = match relevance {
            Some(value) => (value as f64 * 100.0).clamp(0.0, 100.0),
            None => confidence_band(confidence),
        };
        let recency = self.recency_component(item, now);
        let engagement = engagement_component(item);

        let breakdown = ScoreBreakdown {
            relevance,
            recency,
            engagement,
        };
        let composite = self.config.relevance_weight * relevance
            + self.config.recency_weight * recency
            + self.config.engagement_weight * engagement;
        let composite = composite.round().clamp(0.0, 100.0) as u8;

        (composite, breakdown)
    }

    /// Exponential half-life decay from the item's resolved timestamp,
    /// scaled to 0–100. Items with no resolvable timestamp sit at the
    /// neutral midpoint instead of being punished as ancient.
    fn recency_component(&self, item: &Item, now: DateTime<Utc>) -> f64 {
        let Some(ts) = resolve_timestamp(item) else {
            return NEUTRAL;
        };
        let age_days = (now - ts).num_milliseconds() as f64 / 86_400_000.0;
        if age_days <= 0.0 {
            return 100.0;
        }
        let half_life = self.config.recency_half_life_days.max(f64::EPSILON);
        (0.5f64.powf(age_days / half_life) * 100.0).clamp(0.0, 100.0)
    }
}

fn confidence_band(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 100.0,
        Confidence::Medium => 70.0,
        Confidence::Low => 40.0,
    }
}

/// Resolve the most relevant timestamp for an item, per source.
///
/// Accepts RFC 3339 strings and unix epoch numbers (seconds or millis).
fn resolve_timestamp(item: &Item) -> Option<DateTime<Utc>> {
    let fields: &[&str] = match item.source.as_str() {
        "github" => &["pushed_at", "updated_at", "created_at"],
        "hackernews" => &["time", "created_at"],
        "reddit" => &["created_utc", "created_at"],
        _ => &["timestamp", "published_at", "created_at", "updated_at", "date"],
    };

    fields
        .iter()
        .find_map(|field| item.metadata.get(*field).and_then(parse_timestamp))
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    match value {
        serde_json::Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        serde_json::Value::Number(n) => {
            let n = n.as_f64()?;
            // Heuristic: values past ~2001 in millis are millis.
            if n.abs() >= 1e12 {
                DateTime::from_timestamp_millis(n as i64)
            } else {
                DateTime::from_timestamp(n as i64, 0)
            }
        }
        _ => None,
    }
}

type EngagementFn = fn(&serde_json::Map<String, serde_json::Value>) -> f64;

/// Per-source engagement normalizers. Each sub-metric is scaled against a
/// source baseline and capped at 100 before weighting.
static ENGAGEMENT_TABLE: Lazy<HashMap<&'static str, EngagementFn>> = Lazy::new(|| {
    let mut table: HashMap<&'static str, EngagementFn> = HashMap::new();
    table.insert("github", github_engagement);
    table.insert("hackernews", hackernews_engagement);
    table.insert("reddit", reddit_engagement);
    table
});

fn engagement_component(item: &Item) -> f64 {
    match ENGAGEMENT_TABLE.get(item.source.as_str()) {
        Some(normalize) => normalize(&item.metadata),
        None => generic_engagement(&item.metadata),
    }
}

fn metric(map: &serde_json::Map<String, serde_json::Value>, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| {
        map.get(*key).and_then(|v| match v {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        })
    })
}

fn scaled(value: f64, baseline: f64) -> f64 {
    (value / baseline * 100.0).clamp(0.0, 100.0)
}

fn github_engagement(map: &serde_json::Map<String, serde_json::Value>) -> f64 {
    let stars = metric(map, &["stars", "stargazers_count"]).unwrap_or(0.0);
    let forks = metric(map, &["forks", "forks_count"]).unwrap_or(0.0);
    scaled(stars, 500.0) * 0.7 + scaled(forks, 100.0) * 0.3
}

fn hackernews_engagement(map: &serde_json::Map<String, serde_json::Value>) -> f64 {
    let points = metric(map, &["points", "score"]).unwrap_or(0.0);
    let comments = metric(map, &["comments", "descendants"]).unwrap_or(0.0);
    scaled(points, 200.0) * 0.6 + scaled(comments, 100.0) * 0.4
}

fn reddit_engagement(map: &serde_json::Map<String, serde_json::Value>) -> f64 {
    let upvotes = metric(map, &["upvotes", "ups", "score"]).unwrap_or(0.0);
    let comments = metric(map, &["comments", "num_comments"]).unwrap_or(0.0);
    scaled(upvotes, 500.0) * 0.6 + scaled(comments, 200.0) * 0.4
}

/// Unknown source: any likes-like field over 10, else the neutral midpoint.
fn generic_engagement(map: &serde_json::Map<String, serde_json::Value>) -> f64 {
    match metric(map, &["likes", "points", "upvotes", "stars", "score", "reactions"]) {
        Some(value) => (value / 10.0).clamp(0.0, 100.0),
        None => NEUTRAL,
    }
}

/// Stable descending sort of ranked results by the given key.
pub fn sort_signals(signals: &mut [SignalResult], key: SortKey) {
    signals.sort_by(|a, b| {
        sort_value(b, key)
            .partial_cmp(&sort_value(a, key))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

fn sort_value(signal: &SignalResult, key: SortKey) -> f64 {
    match key {
        SortKey::Composite => signal.composite_score as f64,
        SortKey::Relevance => signal.relevance_score as f64,
        SortKey::Recency => signal.score_breakdown.recency,
        SortKey::Engagement => signal.score_breakdown.engagement,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalType, SourcePassRate};
    use chrono::Duration;

    fn item(source: &str, metadata: serde_json::Value) -> Item {
        Item {
            id: "x".to_string(),
            source: source.to_string(),
            title: "t".to_string(),
            description: String::new(),
            url: String::new(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    fn scorer() -> Scorer {
        Scorer::new(ScoringConfig::default())
    }

    #[test]
    fn composite_is_weighted_sum_within_rounding() {
        let now = Utc::now();
        let it = item(
            "hackernews",
            serde_json::json!({"points": 100, "comments": 50, "time": now.timestamp()}),
        );
        let (composite, breakdown) = scorer().score(&it, Some(0.8), Confidence::High, now);

        let expected =
            0.45 * breakdown.relevance + 0.35 * breakdown.recency + 0.20 * breakdown.engagement;
        assert!((composite as f64 - expected).abs() <= 0.5);
        assert!(composite <= 100);
    }

    #[test]
    fn relevance_scales_similarity() {
        let now = Utc::now();
        let (_, breakdown) = scorer().score(&item("x", serde_json::json!({})), Some(0.8), Confidence::Low, now);
        assert!((breakdown.relevance - 80.0).abs() < 1e-9);
    }

    #[test]
    fn confidence_bands_stand_in_for_missing_similarity() {
        let now = Utc::now();
        let it = item("x", serde_json::json!({}));
        let (_, high) = scorer().score(&it, None, Confidence::High, now);
        let (_, medium) = scorer().score(&it, None, Confidence::Medium, now);
        let (_, low) = scorer().score(&it, None, Confidence::Low, now);
        assert_eq!(high.relevance, 100.0);
        assert_eq!(medium.relevance, 70.0);
        assert_eq!(low.relevance, 40.0);
    }

    #[test]
    fn recency_halves_per_half_life() {
        let now = Utc::now();
        let week_ago = now - Duration::days(7);
        let it = item(
            "github",
            serde_json::json!({"pushed_at": week_ago.to_rfc3339()}),
        );
        let (_, breakdown) = scorer().score(&it, Some(0.5), Confidence::Low, now);
        assert!((breakdown.recency - 50.0).abs() < 0.5);
    }

    #[test]
    fn fresh_items_score_full_recency() {
        let now = Utc::now();
        let it = item("hackernews", serde_json::json!({"time": now.timestamp()}));
        let (_, breakdown) = scorer().score(&it, Some(0.5), Confidence::Low, now);
        assert!(breakdown.recency > 99.0);
    }

    #[test]
    fn missing_timestamp_is_neutral() {
        let now = Utc::now();
        let (_, breakdown) =
            scorer().score(&item("rss", serde_json::json!({})), Some(0.5), Confidence::Low, now);
        assert_eq!(breakdown.recency, NEUTRAL);
    }

    #[test]
    fn github_engagement_uses_star_and_fork_baselines() {
        let map = serde_json::json!({"stars": 500, "forks": 100});
        let score = github_engagement(map.as_object().unwrap());
        assert!((score - 100.0).abs() < 1e-9);

        let modest = serde_json::json!({"stars": 250, "forks": 0});
        let score = github_engagement(modest.as_object().unwrap());
        assert!((score - 35.0).abs() < 1e-9);
    }

    #[test]
    fn engagement_submetrics_cap_before_weighting() {
        // A million stars cannot push the stars term past its 70 share.
        let map = serde_json::json!({"stars": 1_000_000, "forks": 0});
        let score = github_engagement(map.as_object().unwrap());
        assert!((score - 70.0).abs() < 1e-9);
    }

    #[test]
    fn unknown_source_uses_likes_heuristic() {
        let map = serde_json::json!({"likes": 120});
        assert!((generic_engagement(map.as_object().unwrap()) - 12.0).abs() < 1e-9);

        let empty = serde_json::json!({});
        assert_eq!(generic_engagement(empty.as_object().unwrap()), NEUTRAL);
    }

    fn signal(id: &str, composite: u8, recency: f64) -> SignalResult {
        let mut it = item("x", serde_json::json!({}));
        it.id = id.to_string();
        SignalResult {
            item: it,
            signal_type: SignalType::Technical,
            confidence: Confidence::Low,
            matched_keyword: None,
            is_watched: false,
            reason: String::new(),
            matched_context_point: None,
            relevance_score: composite,
            novelty_score: 100,
            composite_score: composite,
            score_breakdown: ScoreBreakdown {
                relevance: composite as f64,
                recency,
                engagement: 0.0,
            },
        }
    }

    #[test]
    fn sorts_descending_by_composite_by_default() {
        let mut signals = vec![signal("a", 10, 0.0), signal("b", 90, 0.0), signal("c", 50, 0.0)];
        sort_signals(&mut signals, SortKey::Composite);
        let ids: Vec<&str> = signals.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn sort_is_stable_for_ties() {
        let mut signals = vec![signal("first", 50, 0.0), signal("second", 50, 0.0)];
        sort_signals(&mut signals, SortKey::Composite);
        let ids: Vec<&str> = signals.iter().map(|s| s.item.id.as_str()).collect();
        assert_eq!(ids, ["first", "second"]);
    }

    #[test]
    fn alternate_sort_keys_apply() {
        let mut signals = vec![signal("a", 90, 10.0), signal("b", 10, 80.0)];
        sort_signals(&mut signals, SortKey::Recency);
        assert_eq!(signals[0].item.id, "b");
    }

    #[test]
    fn source_pass_rate_default_is_zeroed() {
        let rate = SourcePassRate::default();
        assert_eq!(rate.considered, 0);
        assert_eq!(rate.passed, 0);
    }
}
