//! Embedding model load progress reporting.
//!
//! The first use of a local embedding provider may download model weights.
//! Reporters surface that wait on **stderr** so stdout remains parseable
//! for scripts.

use std::io::Write;

/// A single progress event during provider initialization.
#[derive(Clone, Debug)]
pub enum ModelProgressEvent {
    /// Model weights are being fetched. Byte counts when known.
    Downloading {
        model: String,
        loaded: Option<u64>,
        total: Option<u64>,
    },
    /// The provider is ready to embed.
    Ready { model: String },
}

/// Reports model load progress. Implementations write to stderr
/// (human or JSON).
pub trait ModelProgressReporter: Send + Sync {
    /// Emit a progress event. Called from provider initialization.
    fn report(&self, event: ModelProgressEvent);
}

/// Human-friendly progress on stderr: "model all-minilm-l6-v2  downloading...".
pub struct StderrProgress;

impl ModelProgressReporter for StderrProgress {
    fn report(&self, event: ModelProgressEvent) {
        let line = match &event {
            ModelProgressEvent::Downloading {
                model,
                loaded,
                total,
            } => match (loaded, total) {
                (Some(loaded), Some(total)) => {
                    format!("model {}  downloading  {} / {} bytes\n", model, loaded, total)
                }
                _ => format!("model {}  downloading...\n", model),
            },
            ModelProgressEvent::Ready { model } => format!("model {}  ready\n", model),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ModelProgressReporter for JsonProgress {
    fn report(&self, event: ModelProgressEvent) {
        let obj = match &event {
            ModelProgressEvent::Downloading {
                model,
                loaded,
                total,
            } => serde_json::json!({
                "event": "model_progress",
                "model": model,
                "status": "downloading",
                "loaded": loaded,
                "total": total
            }),
            ModelProgressEvent::Ready { model } => serde_json::json!({
                "event": "model_progress",
                "model": model,
                "status": "ready"
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ModelProgressReporter for NoProgress {
    fn report(&self, _event: ModelProgressEvent) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode. Caller passes it to provider init.
    pub fn reporter(&self) -> Box<dyn ModelProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
