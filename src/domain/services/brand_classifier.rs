//! Brand classification of free-text descriptions.
//!
//! Unlike the category classifier this one never abstains: every product
//! gets a brand id, falling back to the designated generic brand. False
//! positives are worse than the generic fallback, so short brand names are
//! matched only through explicit allow-lists.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::domain::options::BrandOption;
use crate::domain::text;

/// Well-known brands checked before the generic whole-name scan, highest
/// priority first. The second element lists the lookup aliases.
static PRIORITY_BRANDS: &[(&str, &[&str])] = &[
    ("SAMSUNG", &["samsung"]),
    ("DELL", &["dell"]),
    ("LENOVO", &["lenovo", "thinkpad"]),
    ("APPLE", &["apple", "iphone", "macbook", "ipad"]),
    ("MOTOROLA", &["motorola", "moto"]),
    ("XIAOMI", &["xiaomi", "redmi", "poco"]),
    ("ACER", &["acer"]),
    ("ASUS", &["asus"]),
    ("POSITIVO", &["positivo"]),
    ("MULTILASER", &["multilaser"]),
    ("INTELBRAS", &["intelbras"]),
    ("PHILIPS", &["philips"]),
    ("ELECTROLUX", &["electrolux"]),
    ("BRASTEMP", &["brastemp"]),
    ("CONSUL", &["consul"]),
    ("TRAMONTINA", &["tramontina"]),
    ("BOSCH", &["bosch"]),
    ("MAKITA", &["makita"]),
    ("DEWALT", &["dewalt"]),
    ("EPSON", &["epson"]),
    ("LOGITECH", &["logitech"]),
    ("KINGSTON", &["kingston"]),
];

/// Two-letter tokens accepted as brand words despite their length.
static SHORT_BRAND_ALLOW: &[&str] = &["hp", "lg", "3m", "jbl", "tcl", "aoc"];

/// Brands whose full names are too short for the whole-name scan, detected
/// by explicit whole-word regexes instead.
static SHORT_BRAND_PATTERNS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    vec![
        ("HP", Regex::new(r"\bhp\b").expect("valid regex")),
        ("LG", Regex::new(r"\blg\b").expect("valid regex")),
        ("3M", Regex::new(r"\b3m\b").expect("valid regex")),
        ("JBL", Regex::new(r"\bjbl\b").expect("valid regex")),
    ]
});

/// Maps descriptions to brand ids from the live option list.
#[derive(Debug, Clone)]
pub struct BrandClassifier {
    generic_brand_id: String,
    blocklist: Vec<String>,
}

impl BrandClassifier {
    pub fn new(generic_brand_id: impl Into<String>, blocklist: &[String]) -> Self {
        Self {
            generic_brand_id: generic_brand_id.into(),
            blocklist: blocklist.iter().map(|b| text::normalize(b)).collect(),
        }
    }

    /// Suggests a brand id for the description. Never fails: when nothing
    /// matches confidently, returns the generic brand id.
    pub fn suggest_brand(&self, description: &str, available: &[BrandOption]) -> String {
        let haystack = text::normalize(description);
        let words = brand_words(&haystack);

        for (name, aliases) in PRIORITY_BRANDS {
            for alias in *aliases {
                if !words.iter().any(|w| w == alias) {
                    continue;
                }
                if let Some(option) = self.resolve_by_name(name, available) {
                    if option.id != self.generic_brand_id {
                        debug!(brand = *name, alias, "priority brand hit");
                        return option.id.clone();
                    }
                }
            }
        }

        for option in available {
            if self.is_blocked(&option.name) {
                continue;
            }
            if self.whole_name_matches(&option.name, &words) {
                debug!(brand = %option.name, "whole name hit");
                return option.id.clone();
            }
        }

        for (name, pattern) in SHORT_BRAND_PATTERNS.iter() {
            if pattern.is_match(&haystack) {
                if let Some(option) = self.resolve_by_name(name, available) {
                    debug!(brand = *name, "short brand hit");
                    return option.id.clone();
                }
            }
        }

        tracing::info!(description, "no confident brand match, using generic brand");
        self.generic_brand_id.clone()
    }

    /// Reconciles a suggested brand against the options actually present on
    /// the current form. The suggestion may come from a previous session
    /// whose option list differed.
    pub fn resolve_against_form_options(
        &self,
        suggested_id: &str,
        suggested_name: &str,
        options: &[BrandOption],
    ) -> String {
        if let Some(option) = options.iter().find(|o| o.id == suggested_id) {
            return option.id.clone();
        }
        let wanted = text::normalize(suggested_name);
        if let Some(option) = options.iter().find(|o| text::normalize(&o.name) == wanted) {
            return option.id.clone();
        }
        if !wanted.is_empty() {
            if let Some(option) = options.iter().find(|o| {
                let have = text::normalize(&o.name);
                have.contains(&wanted) || wanted.contains(&have)
            }) {
                return option.id.clone();
            }
        }
        if let Some(option) = options.iter().find(|o| {
            let name = text::normalize(&o.name);
            ["generica", "generico", "generic", "sem marca", "no brand", "outros", "other"]
                .iter()
                .any(|alias| name.contains(alias))
        }) {
            return option.id.clone();
        }
        self.generic_brand_id.clone()
    }

    pub fn generic_brand_id(&self) -> &str {
        &self.generic_brand_id
    }

    fn is_blocked(&self, name: &str) -> bool {
        let normalized = text::normalize(name);
        normalized.len() <= 1 || self.blocklist.iter().any(|b| *b == normalized)
    }

    /// Every word of the brand name must appear as a whole word in the
    /// description; words of length <= 2 only count if allow-listed.
    fn whole_name_matches(&self, brand_name: &str, description_words: &[String]) -> bool {
        let name_words = brand_words(&text::normalize(brand_name));
        if name_words.is_empty() {
            return false;
        }
        name_words.iter().all(|word| {
            if word.len() <= 2 && !SHORT_BRAND_ALLOW.contains(&word.as_str()) {
                return false;
            }
            description_words.iter().any(|w| w == word)
        })
    }

    fn resolve_by_name<'a>(&self, name: &str, available: &'a [BrandOption]) -> Option<&'a BrandOption> {
        let wanted = text::normalize(name);
        available
            .iter()
            .filter(|o| !self.is_blocked(&o.name))
            .find(|o| {
                let have = text::normalize(&o.name);
                have == wanted || have.contains(&wanted) || wanted.contains(&have)
            })
    }
}

/// Splits on the characters brand names are written with.
fn brand_words(normalized: &str) -> Vec<String> {
    normalized
        .split([' ', '.', '-', '_'])
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}
