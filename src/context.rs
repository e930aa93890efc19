//! Context document parsing.
//!
//! The user's context document is free-form markdown-ish text. Two things
//! are mined out of it, both through pure functions so the text mining is
//! testable without the rest of the pipeline:
//!
//! - [`parse_context`] — keyword sets per signal category, taken from
//!   labeled sections ("## Competitors", "Pain points:", ...), their
//!   bullets, and **bold** terms.
//! - [`extract_context_points`] — a small set of independently embeddable
//!   points (headline, bullets, question lines) used for fine-grained
//!   match explanations.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SignalType;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#{1,6}\s+(.+?)\s*$").expect("heading regex"));
static LABEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([A-Za-z][A-Za-z /&'-]{1,48}):\s*$").expect("label regex"));
static BULLET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*+]|\d+[.)])\s+(.+?)\s*$").expect("bullet regex"));
static BOLD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*([^*]+)\*\*").expect("bold regex"));

/// At most this many context points are embedded per run.
const MAX_CONTEXT_POINTS: usize = 8;

/// Keyword sets parsed from the context document, one list per category.
#[derive(Debug, Clone, Default)]
pub struct ContextKeywords {
    by_category: HashMap<SignalType, Vec<String>>,
}

impl ContextKeywords {
    pub fn for_category(&self, category: SignalType) -> &[String] {
        self.by_category
            .get(&category)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_category.values().all(|v| v.is_empty())
    }

    fn push(&mut self, category: SignalType, keyword: String) {
        let list = self.by_category.entry(category).or_default();
        if !list.contains(&keyword) {
            list.push(keyword);
        }
    }
}

/// Parse per-category keyword sets out of the context document.
///
/// A section header opens a category; bullets and bold terms inside it
/// contribute keywords until the next header. Text outside any mapped
/// section contributes nothing.
pub fn parse_context(text: &str) -> ContextKeywords {
    let mut keywords = ContextKeywords::default();
    let mut current: Option<SignalType> = None;

    for line in text.lines() {
        if let Some(header) = HEADING_RE
            .captures(line)
            .or_else(|| LABEL_RE.captures(line))
            .and_then(|c| c.get(1))
        {
            current = category_for_header(header.as_str());
            continue;
        }

        let Some(category) = current else { continue };

        // Bold terms name the keyword outright; fall back to the bullet's
        // leading phrase only when nothing is bolded.
        if BOLD_RE.is_match(line) {
            for bold in BOLD_RE.captures_iter(line) {
                if let Some(keyword) = keyword_from_phrase(&bold[1]) {
                    keywords.push(category, keyword);
                }
            }
        } else if let Some(bullet) = BULLET_RE.captures(line).and_then(|c| c.get(1)) {
            if let Some(keyword) = keyword_from_phrase(bullet.as_str()) {
                keywords.push(category, keyword);
            }
        }
    }

    keywords
}

/// Map a section header onto a fixed category, if it labels one.
fn category_for_header(header: &str) -> Option<SignalType> {
    let header = header.to_lowercase();
    const TABLE: [(&[&str], SignalType); 5] = [
        (
            &["competitor", "competition", "rival"],
            SignalType::Competitive,
        ),
        (
            &["thesis", "assumption", "bet", "belief"],
            SignalType::ThesisChallenging,
        ),
        (
            &["pain point", "problem", "need", "frustration"],
            SignalType::Opportunity,
        ),
        (
            &["stack", "tool", "technolog", "technical"],
            SignalType::Technical,
        ),
        (&["watching", "watch list", "trend", "topic"], SignalType::Trend),
    ];

    TABLE
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| header.contains(n)))
        .map(|(_, category)| *category)
}

/// Reduce a bullet or bold phrase to a matchable keyword: the leading term
/// before any explanation, markdown stripped, lowercased.
fn keyword_from_phrase(phrase: &str) -> Option<String> {
    let stripped = phrase.replace("**", "").replace('`', "");
    let mut term = stripped.as_str();
    for sep in [" — ", " – ", " - ", ": ", " ("] {
        if let Some(idx) = term.find(sep) {
            term = &term[..idx];
        }
    }
    let term = term
        .trim()
        .trim_end_matches(['.', ',', ';', ':'])
        .to_lowercase();
    if (2..=64).contains(&term.len()) {
        Some(term)
    } else {
        None
    }
}

/// Extract the context points worth embedding individually: the headline,
/// bullet lines, and question lines, deduplicated and capped.
pub fn extract_context_points(text: &str) -> Vec<String> {
    let mut points: Vec<String> = Vec::new();
    let mut push = |point: &str| {
        let point = point.trim();
        if point.len() >= 8 && !points.iter().any(|p| p == point) {
            points.push(point.to_string());
        }
    };

    // Headline: the first heading, else the first non-empty line.
    let headline = text
        .lines()
        .find_map(|l| HEADING_RE.captures(l).map(|c| c[1].to_string()))
        .or_else(|| {
            text.lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(String::from)
        });
    if let Some(headline) = headline {
        push(&headline);
    }

    for line in text.lines() {
        if let Some(bullet) = BULLET_RE.captures(line).and_then(|c| c.get(1)) {
            push(bullet.as_str());
        } else if line.trim().ends_with('?') {
            push(line.trim());
        }
    }

    points.truncate(MAX_CONTEXT_POINTS);
    points
}
