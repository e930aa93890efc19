use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub similarity: SimilarityConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub novelty: NoveltyConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub watch: WatchConfig,
    /// Per-category keyword overrides, keyed by category name
    /// (`competitive`, `thesis-challenging`, ...).
    #[serde(default)]
    pub keywords: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FilterConfig {
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f32,
    #[serde(default = "default_novelty_threshold")]
    pub novelty_threshold: f64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default)]
    pub verbose: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            relevance_threshold: default_relevance_threshold(),
            novelty_threshold: default_novelty_threshold(),
            concurrency: default_concurrency(),
            verbose: false,
        }
    }
}

fn default_relevance_threshold() -> f32 {
    0.30
}
fn default_novelty_threshold() -> f64 {
    0.5
}
fn default_concurrency() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct SimilarityConfig {
    /// Texts at or under this many characters are embedded whole.
    #[serde(default = "default_chunk_chars")]
    pub chunk_chars: usize,
    /// Overlap between adjacent chunks, preserving context across cuts.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Geometric weight decay per chunk position (earlier chunks heavier).
    #[serde(default = "default_chunk_decay")]
    pub chunk_decay: f32,
    /// Bounded capacity of the per-run vector cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            chunk_chars: default_chunk_chars(),
            chunk_overlap: default_chunk_overlap(),
            chunk_decay: default_chunk_decay(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_chunk_chars() -> usize {
    1800
}
fn default_chunk_overlap() -> usize {
    200
}
fn default_chunk_decay() -> f32 {
    0.8
}
fn default_cache_capacity() -> usize {
    512
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            url: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NoveltyConfig {
    /// Backend: `memory`, `file`, `sqlite`, or `none` (disables decay
    /// tracking entirely — items fall back to a binary seen-in-run check).
    #[serde(default = "default_novelty_backend")]
    pub backend: String,
    /// Path for the file or sqlite backend.
    #[serde(default = "default_novelty_path")]
    pub path: PathBuf,
    #[serde(default = "default_half_life_days")]
    pub half_life_days: f64,
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Durable backends evict oldest-by-last-seen past this cap.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            backend: default_novelty_backend(),
            path: default_novelty_path(),
            half_life_days: default_half_life_days(),
            min_score: default_min_score(),
            max_entries: default_max_entries(),
        }
    }
}

fn default_novelty_backend() -> String {
    "memory".to_string()
}
fn default_novelty_path() -> PathBuf {
    PathBuf::from("./data/novelty.json")
}
fn default_half_life_days() -> f64 {
    7.0
}
fn default_min_score() -> f64 {
    0.05
}
fn default_max_entries() -> usize {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScoringConfig {
    #[serde(default = "default_relevance_weight")]
    pub relevance_weight: f64,
    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,
    #[serde(default = "default_engagement_weight")]
    pub engagement_weight: f64,
    /// Half-life of the recency decay, in days.
    #[serde(default = "default_recency_half_life_days")]
    pub recency_half_life_days: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            relevance_weight: default_relevance_weight(),
            recency_weight: default_recency_weight(),
            engagement_weight: default_engagement_weight(),
            recency_half_life_days: default_recency_half_life_days(),
        }
    }
}

fn default_relevance_weight() -> f64 {
    0.45
}
fn default_recency_weight() -> f64 {
    0.35
}
fn default_engagement_weight() -> f64 {
    0.20
}
fn default_recency_half_life_days() -> f64 {
    7.0
}

/// User-declared global keywords. Any match forces `is_watched`.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct WatchConfig {
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Configured feed sources, keyed by source name.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    /// JSON item dumps on disk: `[sources.json.<name>] path = "..."`.
    #[serde(default)]
    pub json: HashMap<String, JsonSourceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JsonSourceConfig {
    pub path: PathBuf,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}

/// Load the config at `path`, falling back to defaults when the file does
/// not exist. An unreadable or malformed file is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        Ok(Config::default())
    }
}
