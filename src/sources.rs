//! Feed source seam.
//!
//! Fetching items from real feeds (GitHub, forums, RSS) lives outside the
//! core: adapters are simple paginated HTTP clients that output the
//! uniform [`Item`] shape. The [`FeedSource`] trait is the boundary they
//! implement; the pipeline itself only ever consumes `Vec<Item>`.
//!
//! One adapter ships built in: [`JsonFileSource`], which reads a
//! normalized item dump from disk. It backs the CLI's `--items` flag and
//! the `[sources.json]` config table, and doubles as the fixture loader
//! in tests.

use std::path::PathBuf;

use anyhow::{Context, Result};
use async_trait::async_trait;

use crate::config::Config;
use crate::models::Item;

/// A data source that produces normalized items for filtering.
///
/// Implementations own their transport and rate limiting entirely; the
/// pipeline never sees either.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Returns the source instance name (e.g. `"github"`, `"frontpage"`).
    fn name(&self) -> &str;

    /// Returns a one-line description of what this source reads.
    fn description(&self) -> &str;

    /// Fetch all currently available items.
    async fn fetch(&self) -> Result<Vec<Item>>;
}

/// Reads items from a JSON file: either a bare array of items or an
/// object with an `items` array.
pub struct JsonFileSource {
    name: String,
    path: PathBuf,
}

impl JsonFileSource {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }
}

#[async_trait]
impl FeedSource for JsonFileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "Normalized item dump from a JSON file"
    }

    async fn fetch(&self) -> Result<Vec<Item>> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read items file: {}", self.path.display()))?;

        let value: serde_json::Value = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse items file: {}", self.path.display()))?;

        let array = match value {
            serde_json::Value::Array(array) => array,
            serde_json::Value::Object(mut object) => match object.remove("items") {
                Some(serde_json::Value::Array(array)) => array,
                _ => anyhow::bail!(
                    "items file {} must be an array or an object with an `items` array",
                    self.path.display()
                ),
            },
            _ => anyhow::bail!(
                "items file {} must be an array or an object with an `items` array",
                self.path.display()
            ),
        };

        array
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(Into::into))
            .collect()
    }
}

/// Registry of configured feed sources.
pub struct SourceRegistry {
    sources: Vec<Box<dyn FeedSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    /// Registry pre-loaded with every source named in the config.
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        for (name, cfg) in &config.sources.json {
            registry.register(Box::new(JsonFileSource::new(name.clone(), cfg.path.clone())));
        }
        registry
    }

    pub fn register(&mut self, source: Box<dyn FeedSource>) {
        self.sources.push(source);
    }

    pub fn sources(&self) -> &[Box<dyn FeedSource>] {
        &self.sources
    }

    pub fn find(&self, name: &str) -> Option<&dyn FeedSource> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
