//! Shared text normalization for the dedup engine and the classifiers.
//!
//! Descriptions arrive as free text typed by humans into an upstream system:
//! mixed case, accented characters, ad-hoc punctuation. Every matching
//! component in this crate compares through this module so that they all see
//! the same token stream.

/// Separator characters that split a description into tokens.
pub const SEPARATORS: &[char] = &[' ', '-', ',', '.', ';', ':', '/', '\\', '_'];

/// Lowercases the input and folds accented Latin letters to their base form.
///
/// Idempotent: normalizing an already-normalized string is a no-op.
pub fn normalize(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(fold_diacritic)
        .collect()
}

fn fold_diacritic(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'ç' => 'c',
        'ñ' => 'n',
        other => other,
    }
}

/// Splits normalized text into tokens, dropping short tokens and tokens on
/// the ignore list. Duplicates are collapsed, first occurrence wins.
pub fn relevant_tokens(text: &str, min_len: usize, ignore: &[String]) -> Vec<String> {
    let normalized = normalize(text);
    let mut seen: Vec<String> = Vec::new();
    for token in normalized.split(SEPARATORS) {
        if token.len() < min_len {
            continue;
        }
        if ignore.iter().any(|w| w == token) {
            continue;
        }
        if seen.iter().any(|t| t == token) {
            continue;
        }
        seen.push(token.to_string());
    }
    seen
}

/// Plain whitespace word split of the normalized text, no filtering.
/// Used by the similarity overlap computation where every word counts.
pub fn words(text: &str) -> Vec<String> {
    normalize(text)
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// Token-overlap ratio between two descriptions in `0.0..=1.0`.
///
/// A token matches when it is equal to a token of the other description, or
/// one is a substring of the other (so "inspiron15" still matches
/// "inspiron"). The ratio is matches over the longer token count.
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let words_a = words(a);
    let words_b = words(b);
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    if words_a == words_b {
        return 1.0;
    }
    let matches = words_a
        .iter()
        .filter(|wa| {
            words_b
                .iter()
                .any(|wb| *wa == wb || wa.contains(wb.as_str()) || wb.contains(wa.as_str()))
        })
        .count();
    matches as f64 / words_a.len().max(words_b.len()) as f64
}
