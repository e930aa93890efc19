//! Keyword-driven signal classification.
//!
//! Assigns every item exactly one of the five signal categories plus a
//! confidence, a matched keyword, and a watch flag. Matching sources, in
//! priority order:
//!
//! 1. user-declared global watch keywords (any hit forces `is_watched`
//!    and owns the `matched_keyword` slot);
//! 2. exact terms parsed from the context document's labeled sections
//!    (plus per-category user overrides), checked across all five
//!    categories;
//! 3. generic per-category default lists, checked across all five
//!    categories only after every exact keyword missed.
//!
//! Classification never fails: a watch-only hit degrades to
//! `technical`/high, no hit at all to `technical`/low.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::context::ContextKeywords;
use crate::models::{Confidence, Item, Signal, SignalType};

/// Fallback keyword lists, consulted only when no exact keyword matches.
const GENERIC_KEYWORDS: [(SignalType, &[&str]); 5] = [
    (
        SignalType::Competitive,
        &[
            "competitor",
            "rival",
            "alternative to",
            "market share",
            "acquisition",
            "acquires",
            "launches",
        ],
    ),
    (
        SignalType::ThesisChallenging,
        &[
            "contrarian",
            "debunked",
            "overrated",
            "rethinking",
            "myth",
            "shuts down",
            "postmortem",
            "pivot",
        ],
    ),
    (
        SignalType::Opportunity,
        &[
            "pain point",
            "unmet need",
            "wish there was",
            "no good way",
            "feature request",
            "underserved",
        ],
    ),
    (
        SignalType::Technical,
        &[
            "benchmark",
            "performance",
            "latency",
            "architecture",
            "open source",
            "protocol",
            "framework",
            "release",
        ],
    ),
    (
        SignalType::Trend,
        &[
            "trending",
            "adoption",
            "momentum",
            "growth",
            "surge",
            "taking off",
        ],
    ),
];

/// How a keyword is located in item text.
///
/// Alphanumeric keywords use a compiled word-boundary pattern; keywords
/// carrying punctuation (where `\b` misbehaves) fall back to a manual
/// scan that checks the neighboring characters itself.
enum Matcher {
    Pattern(Regex),
    Scan(String),
}

impl Matcher {
    fn build(keyword: &str) -> Self {
        let plain = keyword
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ');
        if plain {
            let pattern = format!(r"\b{}\b", regex::escape(keyword));
            match Regex::new(&pattern) {
                Ok(re) => return Matcher::Pattern(re),
                Err(e) => warn!(keyword, error = %e, "keyword pattern failed, scanning instead"),
            }
        }
        Matcher::Scan(keyword.to_string())
    }

    /// `text` must already be lowercased.
    fn matches(&self, text: &str) -> bool {
        match self {
            Matcher::Pattern(re) => re.is_match(text),
            Matcher::Scan(keyword) => scan_match(text, keyword),
        }
    }
}

/// Manual word-boundary search: the characters immediately before and
/// after an occurrence must not be alphanumeric.
fn scan_match(text: &str, keyword: &str) -> bool {
    let mut from = 0;
    while let Some(pos) = text[from..].find(keyword) {
        let start = from + pos;
        let end = start + keyword.len();
        let before_ok = text[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = text[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = start + keyword.chars().next().map_or(1, char::len_utf8);
    }
    false
}

static GENERIC_MATCHERS: Lazy<Vec<(SignalType, Vec<(String, Matcher)>)>> = Lazy::new(|| {
    GENERIC_KEYWORDS
        .iter()
        .map(|(category, words)| {
            let matchers = words
                .iter()
                .map(|w| (w.to_string(), Matcher::build(w)))
                .collect();
            (*category, matchers)
        })
        .collect()
});

static CAPITALIZED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Z][A-Za-z0-9]+").expect("capitalized-token regex"));

pub struct Classifier {
    /// Global watch keywords, lowercased, in user order.
    watch: Vec<(String, Matcher)>,
    /// Exact keywords per category: context-derived plus user overrides.
    exact: Vec<(SignalType, Vec<(String, Matcher)>)>,
}

impl Classifier {
    /// Build a classifier from parsed context keywords, global watch
    /// keywords, and per-category overrides keyed by category name.
    pub fn new(
        context: &ContextKeywords,
        watch_keywords: &[String],
        overrides: &HashMap<String, Vec<String>>,
    ) -> Self {
        let watch = watch_keywords
            .iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .map(|k| {
                let matcher = Matcher::build(&k);
                (k, matcher)
            })
            .collect();

        for name in overrides.keys() {
            if category_by_name(name).is_none() {
                warn!(category = %name, "ignoring keyword override for unknown category");
            }
        }

        let exact = SignalType::ALL
            .iter()
            .map(|category| {
                let mut seen: Vec<String> = Vec::new();
                for keyword in context
                    .for_category(*category)
                    .iter()
                    .chain(override_list(overrides, *category))
                {
                    let keyword = keyword.trim().to_lowercase();
                    if !keyword.is_empty() && !seen.contains(&keyword) {
                        seen.push(keyword);
                    }
                }
                let matchers = seen
                    .into_iter()
                    .map(|k| {
                        let matcher = Matcher::build(&k);
                        (k, matcher)
                    })
                    .collect();
                (*category, matchers)
            })
            .collect();

        Self { watch, exact }
    }

    /// Classify one item. Total: always returns exactly one category.
    pub fn classify(&self, item: &Item) -> Signal {
        let text = item.search_text();

        let watch_hit = self
            .watch
            .iter()
            .find(|(_, m)| m.matches(&text))
            .map(|(k, _)| k.clone());
        let is_watched = watch_hit.is_some();

        // Exact keywords across all five categories outrank any generic
        // keyword in any category.
        for (category, matchers) in &self.exact {
            if let Some((keyword, _)) = matchers.iter().find(|(_, m)| m.matches(&text)) {
                return Signal {
                    signal_type: *category,
                    confidence: Confidence::High,
                    matched_keyword: Some(watch_hit.unwrap_or_else(|| keyword.clone())),
                    is_watched,
                };
            }
        }

        for (category, matchers) in GENERIC_MATCHERS.iter() {
            if let Some((keyword, _)) = matchers.iter().find(|(_, m)| m.matches(&text)) {
                return Signal {
                    signal_type: *category,
                    confidence: Confidence::Medium,
                    matched_keyword: Some(watch_hit.unwrap_or_else(|| keyword.clone())),
                    is_watched,
                };
            }
        }

        if let Some(keyword) = watch_hit {
            // A watched term with no categorical keyword still matters.
            return Signal {
                signal_type: SignalType::Technical,
                confidence: Confidence::High,
                matched_keyword: Some(keyword),
                is_watched: true,
            };
        }

        Signal {
            signal_type: SignalType::Technical,
            confidence: Confidence::Low,
            matched_keyword: None,
            is_watched: false,
        }
    }

    /// Pull a short topic out of the item for reason sentences: first
    /// matching watch keyword, else first matching exact keyword, else the
    /// first capitalized-looking token of the title, else a generic phrase.
    pub fn extract_topic(&self, item: &Item) -> String {
        let text = item.search_text();

        if let Some((keyword, _)) = self.watch.iter().find(|(_, m)| m.matches(&text)) {
            return keyword.clone();
        }
        for (_, matchers) in &self.exact {
            if let Some((keyword, _)) = matchers.iter().find(|(_, m)| m.matches(&text)) {
                return keyword.clone();
            }
        }
        if let Some(token) = CAPITALIZED_RE.find(&item.title) {
            return token.as_str().to_string();
        }
        "this space".to_string()
    }

    /// Templated one-line explanation for a classified item.
    pub fn reason(&self, signal_type: SignalType, item: &Item) -> String {
        let topic = self.extract_topic(item);
        match signal_type {
            SignalType::Competitive => {
                format!("Competitor activity detected around {}.", topic)
            }
            SignalType::ThesisChallenging => {
                format!("Challenges your current thinking on {}.", topic)
            }
            SignalType::Opportunity => {
                format!("Potential opportunity around {}.", topic)
            }
            SignalType::Technical => {
                format!("Technical development relevant to {}.", topic)
            }
            SignalType::Trend => format!("Growing trend forming around {}.", topic),
        }
    }
}

fn category_by_name(name: &str) -> Option<SignalType> {
    SignalType::ALL
        .iter()
        .copied()
        .find(|c| c.as_str() == name)
}

fn override_list<'a>(
    overrides: &'a HashMap<String, Vec<String>>,
    category: SignalType,
) -> impl Iterator<Item = &'a String> {
    overrides
        .get(category.as_str())
        .into_iter()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::parse_context;

    fn item(title: &str, description: &str) -> Item {
        Item {
            id: "t".to_string(),
            source: "test".to_string(),
            title: title.to_string(),
            description: description.to_string(),
            url: String::new(),
            metadata: serde_json::Map::new(),
        }
    }

    fn classifier(context: &str, watch: &[&str]) -> Classifier {
        let keywords = parse_context(context);
        let watch: Vec<String> = watch.iter().map(|s| s.to_string()).collect();
        Classifier::new(&keywords, &watch, &HashMap::new())
    }

    #[test]
    fn exact_context_keyword_wins_with_high_confidence() {
        let c = classifier("## Competitors\n- Foo\n", &[]);
        let signal = c.classify(&item("Foo launches new feature", ""));
        assert_eq!(signal.signal_type, SignalType::Competitive);
        assert_eq!(signal.confidence, Confidence::High);
        assert_eq!(signal.matched_keyword.as_deref(), Some("foo"));
        assert!(!signal.is_watched);
    }

    #[test]
    fn exact_match_outranks_generic_in_other_category() {
        // "benchmark" is a generic technical keyword; the exact competitor
        // term must win anyway.
        let c = classifier("## Competitors\n- Acme\n", &[]);
        let signal = c.classify(&item("Acme posts new benchmark results", ""));
        assert_eq!(signal.signal_type, SignalType::Competitive);
        assert_eq!(signal.confidence, Confidence::High);
    }

    #[test]
    fn generic_keyword_gives_medium_confidence() {
        let c = classifier("", &[]);
        let signal = c.classify(&item("Surprising benchmark results for parsers", ""));
        assert_eq!(signal.signal_type, SignalType::Technical);
        assert_eq!(signal.confidence, Confidence::Medium);
        assert_eq!(signal.matched_keyword.as_deref(), Some("benchmark"));
    }

    #[test]
    fn watch_keyword_owns_matched_keyword_slot() {
        let c = classifier("## Competitors\n- Acme\n", &["rust"]);
        let signal = c.classify(&item("Acme rewrites everything in Rust", ""));
        assert_eq!(signal.signal_type, SignalType::Competitive);
        assert!(signal.is_watched);
        assert_eq!(signal.matched_keyword.as_deref(), Some("rust"));
    }

    #[test]
    fn watch_only_degrades_to_technical_high() {
        let c = classifier("", &["zig"]);
        let signal = c.classify(&item("Why I rewrote my blog in Zig", ""));
        assert_eq!(signal.signal_type, SignalType::Technical);
        assert_eq!(signal.confidence, Confidence::High);
        assert!(signal.is_watched);
    }

    #[test]
    fn no_match_defaults_to_technical_low() {
        let c = classifier("", &[]);
        let signal = c.classify(&item("Cats sleep most of the day", ""));
        assert_eq!(signal.signal_type, SignalType::Technical);
        assert_eq!(signal.confidence, Confidence::Low);
        assert_eq!(signal.matched_keyword, None);
        assert!(!signal.is_watched);
    }

    #[test]
    fn word_boundaries_prevent_substring_hits() {
        let c = classifier("", &["go"]);
        let signal = c.classify(&item("Going, going, gone", ""));
        assert!(!signal.is_watched);
        assert_eq!(signal.confidence, Confidence::Low);
    }

    #[test]
    fn punctuated_keywords_check_neighbors_manually() {
        let c = classifier("## Stack\n- node.js\n", &[]);
        let hit = c.classify(&item("Migrating a service to node.js", ""));
        assert_eq!(hit.signal_type, SignalType::Technical);
        assert_eq!(hit.confidence, Confidence::High);

        let miss = c.classify(&item("The node.jsx experiment", ""));
        assert_eq!(miss.confidence, Confidence::Low);
    }

    #[test]
    fn overrides_merge_into_exact_sets() {
        let mut overrides = HashMap::new();
        overrides.insert("opportunity".to_string(), vec!["greenfield".to_string()]);
        let c = Classifier::new(&parse_context(""), &[], &overrides);
        let signal = c.classify(&item("A greenfield market nobody serves", ""));
        assert_eq!(signal.signal_type, SignalType::Opportunity);
        assert_eq!(signal.confidence, Confidence::High);
    }

    #[test]
    fn topic_prefers_watch_then_context_then_capitalized() {
        let c = classifier("## Competitors\n- Acme\n", &["wasm"]);
        assert_eq!(c.extract_topic(&item("All about wasm and Acme", "")), "wasm");
        assert_eq!(c.extract_topic(&item("Acme raises again", "")), "acme");
        assert_eq!(c.extract_topic(&item("Quantum leaps ahead", "")), "Quantum");
        assert_eq!(c.extract_topic(&item("no capitals here", "")), "this space");
    }

    #[test]
    fn reason_references_topic() {
        let c = classifier("## Competitors\n- Foo\n", &[]);
        let reason = c.reason(SignalType::Competitive, &item("Foo launches", ""));
        assert_eq!(reason, "Competitor activity detected around foo.");
    }
}
