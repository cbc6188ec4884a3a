//! Persisted category mapping table used by the group classifier.
//!
//! The table is advisory configuration, not authoritative data: reads may
//! race with a learning write and last-writer-wins is acceptable.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tunables controlling token extraction for classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingTunables {
    /// Minimum token-overlap similarity considered a match.
    #[serde(rename = "minSimilarity")]
    pub min_similarity: f64,
    /// Tokens shorter than this are ignored.
    #[serde(rename = "minTokenLength")]
    pub min_token_length: usize,
    /// Stop words that never participate in classification.
    #[serde(rename = "ignoreWords")]
    pub ignore_words: Vec<String>,
}

impl Default for MappingTunables {
    fn default() -> Self {
        Self {
            min_similarity: 0.7,
            min_token_length: 3,
            ignore_words: Vec::new(),
        }
    }
}

/// The full mapping table: direct token mappings, keyword groups and
/// tunables. Serialized as one flat JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryMappingTable {
    /// token -> category display name.
    #[serde(rename = "directMap")]
    pub direct_map: BTreeMap<String, String>,
    /// category display name -> keyword list.
    #[serde(rename = "keywordGroups")]
    pub keyword_groups: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub tunables: MappingTunables,
}

impl CategoryMappingTable {
    /// Starter table shipped with a fresh install. Grows from here through
    /// online learning.
    pub fn seeded() -> Self {
        let mut table = Self::default();
        let seeds: &[(&str, &[&str])] = &[
            ("INFORMATICA", &[
                "notebook", "computador", "mouse", "teclado", "monitor", "impressora", "ssd",
                "memoria", "processador", "roteador",
            ]),
            ("ELETRODOMESTICOS", &[
                "geladeira", "fogao", "microondas", "lavadora", "liquidificador", "ventilador",
            ]),
            ("FERRAMENTAS", &["furadeira", "parafusadeira", "martelo", "alicate", "serra"]),
            ("PAPELARIA", &["caderno", "caneta", "lapis", "papel", "grampeador"]),
        ];
        for (category, tokens) in seeds {
            for token in *tokens {
                table.learn_token(token, category);
            }
        }
        table
    }

    /// Records `token -> category_name` as a direct mapping and appends the
    /// token to the category's keyword group. Returns true when anything
    /// changed (callers skip the persist otherwise).
    pub fn learn_token(&mut self, token: &str, category_name: &str) -> bool {
        let mut changed = false;
        if !self.direct_map.contains_key(token) {
            self.direct_map.insert(token.to_string(), category_name.to_string());
            changed = true;
        }
        let keywords = self.keyword_groups.entry(category_name.to_string()).or_default();
        if !keywords.iter().any(|k| k == token) {
            keywords.push(token.to_string());
            changed = true;
        }
        changed
    }
}
