//! Similarity-based deduplication of incoming registration requests.
//!
//! The engine is read-only: it decides whether a request matches an entry
//! that already exists, and callers decide what to persist. The hard case is
//! near-identical descriptions that differ only in a size or model number
//! ("CHAIR TM58" vs "CHAIR TM60"), which the difference guard keeps apart
//! even when code and cost would qualify them as duplicates.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::catalog::{costs_within, CatalogEntry};
use crate::domain::text;

static PREFIXED_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:tam|tm|size|tamanho)\s*[:=]?\s*(\d+)").expect("valid regex"));
static UNIT_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\s*(?:cm|mm|ml|l)\b").expect("valid regex"));
static SHORT_PREFIX_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:t|tm)\s*(\d+)").expect("valid regex"));
static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{2,})\b").expect("valid regex"));
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("valid regex"));

/// Matching thresholds, tunable without a code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Cost difference accepted as "the same product", as a fraction of the
    /// reference cost.
    #[serde(rename = "costTolerance")]
    pub cost_tolerance: Decimal,
    /// Minimum description token-overlap ratio for the pairwise predicate.
    #[serde(rename = "overlapMin")]
    pub overlap_min: f64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self { cost_tolerance: dec!(0.10), overlap_min: 0.8 }
    }
}

/// Decides whether an incoming request matches an existing catalog entry.
#[derive(Debug, Clone, Default)]
pub struct DedupEngine {
    config: DedupConfig,
}

impl DedupEngine {
    pub fn new(config: DedupConfig) -> Self {
        Self { config }
    }

    /// Returns the generated code of an existing entry matching the request,
    /// or `None` when the request looks like a new product.
    ///
    /// Match order, first hit wins:
    /// 1. exact case-insensitive description match;
    /// 2. most recent entry with the same classification code and a cost
    ///    within tolerance, unless the difference guard separates them.
    pub fn find_existing(
        &self,
        description: &str,
        classification_code: &str,
        cost: Decimal,
        entries: &[CatalogEntry],
    ) -> Option<String> {
        let normalized = text::normalize(description);
        if let Some(exact) = entries
            .iter()
            .find(|e| e.active && text::normalize(&e.description) == normalized)
        {
            return Some(exact.generated_code.clone());
        }

        let mut candidates: Vec<&CatalogEntry> = entries
            .iter()
            .filter(|e| {
                e.active
                    && e.classification_code == classification_code
                    && costs_within(cost, e.cost, self.config.cost_tolerance)
            })
            .collect();
        candidates.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        candidates
            .into_iter()
            .find(|candidate| !are_distinct_variants(description, &candidate.description))
            .map(|candidate| candidate.generated_code.clone())
    }

    /// Pairwise similarity between two confirmed entries, used by catalog
    /// maintenance lookups.
    pub fn is_similar(&self, a: &CatalogEntry, b: &CatalogEntry) -> bool {
        a.is_similar(b, self.config.overlap_min, self.config.cost_tolerance)
    }

    pub fn config(&self) -> &DedupConfig {
        &self.config
    }
}

/// Difference guard: two descriptions whose non-numeric words are identical
/// but whose numeric tokens differ name different variants of the same
/// product line, not the same product.
fn are_distinct_variants(a: &str, b: &str) -> bool {
    let base_a = non_numeric_words(a);
    let base_b = non_numeric_words(b);
    if base_a != base_b {
        return false;
    }
    let nums_a = numeric_tokens(a);
    let nums_b = numeric_tokens(b);
    nums_a != nums_b
}

fn non_numeric_words(description: &str) -> Vec<String> {
    let normalized = text::normalize(description);
    let stripped = DIGIT_RUN.replace_all(&normalized, "");
    stripped.split_whitespace().map(str::to_string).collect()
}

/// Extracts the numeric tokens a human would read as a size or model number,
/// in order of pattern specificity, deduplicated.
pub fn numeric_tokens(description: &str) -> Vec<String> {
    let normalized = text::normalize(description);
    let mut tokens: Vec<String> = Vec::new();
    let mut push = |value: &str| {
        if !tokens.iter().any(|t| t == value) {
            tokens.push(value.to_string());
        }
    };
    for caps in PREFIXED_NUMBER.captures_iter(&normalized) {
        push(&caps[1]);
    }
    for caps in UNIT_NUMBER.captures_iter(&normalized) {
        push(&caps[1]);
    }
    for caps in SHORT_PREFIX_NUMBER.captures_iter(&normalized) {
        push(&caps[1]);
    }
    for caps in BARE_NUMBER.captures_iter(&normalized) {
        push(&caps[1]);
    }
    tokens
}
