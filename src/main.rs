//! # Signal Radar CLI (`radar`)
//!
//! The `radar` binary is the primary interface for Signal Radar. It runs
//! the filtering pipeline over normalized item dumps, lists configured
//! feed sources, and maintains the durable novelty store.
//!
//! ## Usage
//!
//! ```bash
//! radar --config ./config/radar.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `radar filter` | Rank items against a context document |
//! | `radar sources` | List configured feed sources |
//! | `radar novelty stats` | Show durable novelty store size |
//! | `radar novelty clear` | Delete all stored novelty records |
//!
//! ## Examples
//!
//! ```bash
//! # Rank a JSON dump of items against your context document
//! radar filter --items items.json --context context.md
//!
//! # Same, as machine-readable JSON with a different ordering
//! radar filter --items items.json --context context.md --sort recency --json
//!
//! # Pull items from a configured source instead of a file
//! radar filter --source frontpage --context context.md
//! ```

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use signal_radar::config::{load_config_or_default, Config};
use signal_radar::models::Item;
use signal_radar::pipeline::{FilterOptions, FilterPipeline};
use signal_radar::progress::ProgressMode;
use signal_radar::score::SortKey;
use signal_radar::sources::{FeedSource, JsonFileSource, SourceRegistry};
use signal_radar::store::file::JsonFileBackend;
use signal_radar::store::sqlite::SqliteBackend;
use signal_radar::store::NoveltyBackend;

/// Signal Radar CLI — context-aware signal detection and ranking for
/// content feeds.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing files fall back to built-in defaults.
#[derive(Parser)]
#[command(
    name = "radar",
    about = "Signal Radar — context-aware signal detection and ranking for content feeds",
    version,
    long_about = "Signal Radar ranks a stream of content items against a user-supplied context \
    document, suppressing items that are off-topic or already seen, and produces an explainable, \
    score-ordered signal list."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/radar.toml")]
    config: PathBuf,

    /// Raise log verbosity to debug.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Rank items against a context document.
    ///
    /// Items come from a JSON file (`--items`) or a configured source
    /// (`--source`). The context document is free-form text; labeled
    /// sections ("## Competitors", "Pain points:", ...) drive the
    /// classification keywords.
    Filter {
        /// Path to a JSON file of normalized items.
        #[arg(long)]
        items: Option<PathBuf>,

        /// Name of a configured feed source to pull items from.
        #[arg(long)]
        source: Option<String>,

        /// Path to the context document.
        #[arg(long)]
        context: PathBuf,

        /// Sort key: composite, relevance, recency, or engagement.
        #[arg(long, default_value = "composite")]
        sort: String,

        /// Keep at most this many signals.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum similarity in [0, 1] to keep an item.
        #[arg(long)]
        relevance_threshold: Option<f32>,

        /// Minimum novelty in [0, 1] to keep an item.
        #[arg(long)]
        novelty_threshold: Option<f64>,

        /// Emit machine-readable JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Model load progress: auto, off, human, or json.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// List configured feed sources.
    Sources,

    /// Inspect or reset the durable novelty store.
    Novelty {
        #[command(subcommand)]
        action: NoveltyAction,
    },
}

/// Novelty store maintenance subcommands.
#[derive(Subcommand)]
enum NoveltyAction {
    /// Show how many records the configured backend holds.
    Stats,
    /// Delete all stored novelty records.
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config_or_default(&cli.config)?;

    let default_level = if cli.verbose || config.filter.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Filter {
            items,
            source,
            context,
            sort,
            limit,
            relevance_threshold,
            novelty_threshold,
            json,
            progress,
        } => {
            run_filter(
                &config,
                items,
                source,
                context,
                &sort,
                limit,
                relevance_threshold,
                novelty_threshold,
                json,
                &progress,
            )
            .await
        }
        Commands::Sources => run_sources(&config),
        Commands::Novelty { action } => run_novelty(&config, action).await,
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_filter(
    config: &Config,
    items_path: Option<PathBuf>,
    source_name: Option<String>,
    context_path: PathBuf,
    sort: &str,
    limit: Option<usize>,
    relevance_threshold: Option<f32>,
    novelty_threshold: Option<f64>,
    json: bool,
    progress: &str,
) -> Result<()> {
    let context_text = std::fs::read_to_string(&context_path)
        .with_context(|| format!("Failed to read context file: {}", context_path.display()))?;

    let items = fetch_items(config, items_path, source_name).await?;

    let sort: SortKey = sort.parse().map_err(anyhow::Error::msg)?;
    let mut options = FilterOptions::from_config(config);
    options.sort = sort;
    if let Some(threshold) = relevance_threshold {
        options.relevance_threshold = threshold;
    }
    if let Some(threshold) = novelty_threshold {
        options.novelty_threshold = threshold;
    }

    let mut pipeline = FilterPipeline::from_config(config).await?;
    pipeline.set_options(options);

    let reporter = progress_mode(progress)?.reporter();
    pipeline.engine().init(reporter.as_ref()).await?;

    let mut outcome = pipeline.run(items, &context_text).await?;
    if let Some(limit) = limit {
        outcome.signals.truncate(limit);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.signals)?);
        return Ok(());
    }

    if outcome.signals.is_empty() {
        println!("No signals.");
    }
    for (rank, signal) in outcome.signals.iter().enumerate() {
        let watched = if signal.is_watched { "  [watched]" } else { "" };
        println!(
            "{:>3}. [{:>3}] {:<18} {}{}",
            rank + 1,
            signal.composite_score,
            signal.signal_type.to_string(),
            signal.item.title,
            watched
        );
        println!("       {}", signal.reason);
        if let Some(point) = &signal.matched_context_point {
            println!("       closest context point: {}", point);
        }
        if !signal.item.url.is_empty() {
            println!("       {}", signal.item.url);
        }
    }

    println!();
    println!("run {}", outcome.stats.run_id);
    println!("  items: {}", outcome.stats.total_items);
    println!("  dropped (no id): {}", outcome.stats.dropped_invalid);
    println!("  below relevance: {}", outcome.stats.below_relevance);
    println!("  below novelty: {}", outcome.stats.below_novelty);
    println!("  signals: {}", outcome.stats.signals);
    for (source, rate) in &outcome.stats.per_source {
        println!(
            "  {}: {} / {} passed",
            source, rate.passed, rate.considered
        );
    }

    Ok(())
}

async fn fetch_items(
    config: &Config,
    items_path: Option<PathBuf>,
    source_name: Option<String>,
) -> Result<Vec<Item>> {
    match (items_path, source_name) {
        (Some(path), None) => JsonFileSource::new("cli", path).fetch().await,
        (None, Some(name)) => {
            let registry = SourceRegistry::from_config(config);
            let source = registry
                .find(&name)
                .with_context(|| format!("No configured source named '{}'", name))?;
            source.fetch().await
        }
        (Some(_), Some(_)) => bail!("Pass either --items or --source, not both"),
        (None, None) => bail!("Pass --items <file> or --source <name>"),
    }
}

fn run_sources(config: &Config) -> Result<()> {
    let registry = SourceRegistry::from_config(config);
    if registry.is_empty() {
        println!("No sources configured. Add [sources.json.<name>] entries to the config.");
        return Ok(());
    }
    for source in registry.sources() {
        println!("{:<20} {}", source.name(), source.description());
    }
    Ok(())
}

async fn run_novelty(config: &Config, action: NoveltyAction) -> Result<()> {
    match action {
        NoveltyAction::Stats => match config.novelty.backend.as_str() {
            "file" => {
                let backend =
                    JsonFileBackend::new(&config.novelty.path, config.novelty.max_entries);
                println!("novelty backend: file ({})", config.novelty.path.display());
                println!("  records: {}", backend.count().await?);
            }
            "sqlite" => {
                let backend =
                    SqliteBackend::connect(&config.novelty.path, config.novelty.max_entries)
                        .await?;
                println!("novelty backend: sqlite ({})", config.novelty.path.display());
                println!("  records: {}", backend.count().await?);
            }
            other => {
                println!("novelty backend: {} (not durable, nothing to inspect)", other);
            }
        },
        NoveltyAction::Clear => {
            match config.novelty.backend.as_str() {
                "file" => {
                    JsonFileBackend::new(&config.novelty.path, config.novelty.max_entries)
                        .clear()
                        .await?;
                }
                "sqlite" => {
                    SqliteBackend::connect(&config.novelty.path, config.novelty.max_entries)
                        .await?
                        .clear()
                        .await?;
                }
                other => bail!("novelty backend '{}' has nothing durable to clear", other),
            }
            println!("novelty store cleared");
        }
    }
    Ok(())
}

fn progress_mode(value: &str) -> Result<ProgressMode> {
    match value {
        "auto" => Ok(ProgressMode::default_for_tty()),
        "off" => Ok(ProgressMode::Off),
        "human" => Ok(ProgressMode::Human),
        "json" => Ok(ProgressMode::Json),
        other => bail!("Unknown progress mode: {}. Use auto, off, human, or json.", other),
    }
}
