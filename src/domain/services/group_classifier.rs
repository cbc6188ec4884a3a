//! Heuristic category ("group") classification of free-text descriptions.
//!
//! The category list is loaded from the live form each session, so the
//! classifier never returns an id that is not currently selectable. The
//! persisted mapping table is advisory and grows through online learning.

use tracing::debug;

use crate::domain::mapping::CategoryMappingTable;
use crate::domain::options::CategoryOption;
use crate::domain::text;

/// Stateless classifier over a mapping table snapshot.
#[derive(Debug, Default)]
pub struct GroupClassifier;

impl GroupClassifier {
    /// Suggests a category id for the description, or `None` when nothing
    /// resolves. Callers substitute the configured default category.
    ///
    /// Resolution order: direct token mapping, keyword group, then a
    /// partial-name scan of the available category names.
    pub fn suggest_category(
        &self,
        description: &str,
        available: &[CategoryOption],
        table: &CategoryMappingTable,
    ) -> Option<String> {
        if available.is_empty() {
            return None;
        }
        let tokens = text::relevant_tokens(
            description,
            table.tunables.min_token_length,
            &table.tunables.ignore_words,
        );

        for token in &tokens {
            if let Some(name) = table.direct_map.get(token) {
                if let Some(option) = resolve_by_name(name, available) {
                    debug!(token, category = %option.name, "direct mapping hit");
                    return Some(option.id.clone());
                }
            }
        }

        for token in &tokens {
            for (name, keywords) in &table.keyword_groups {
                if keywords.iter().any(|k| k == token) {
                    if let Some(option) = resolve_by_name(name, available) {
                        debug!(token, category = %option.name, "keyword group hit");
                        return Some(option.id.clone());
                    }
                }
            }
        }

        for token in &tokens {
            if let Some(option) = available
                .iter()
                .find(|o| text::normalize(&o.name).contains(token.as_str()))
            {
                debug!(token, category = %option.name, "partial name hit");
                return Some(option.id.clone());
            }
        }

        None
    }

    /// Online-learning step, called after a successful registration. Adds
    /// each relevant token of the description as a direct mapping to the
    /// chosen category and extends its keyword group. Returns true when the
    /// table changed and should be persisted.
    pub fn learn(
        &self,
        description: &str,
        chosen_category_id: &str,
        available: &[CategoryOption],
        table: &mut CategoryMappingTable,
    ) -> bool {
        let Some(chosen) = available.iter().find(|o| o.id == chosen_category_id) else {
            return false;
        };
        let tokens = text::relevant_tokens(
            description,
            table.tunables.min_token_length,
            &table.tunables.ignore_words,
        );
        let mut changed = false;
        for token in &tokens {
            changed |= table.learn_token(token, &chosen.name);
        }
        changed
    }
}

/// Resolves a mapping-table category name against the live option list:
/// case-insensitive exact match first, then substring in either direction.
fn resolve_by_name<'a>(name: &str, available: &'a [CategoryOption]) -> Option<&'a CategoryOption> {
    let wanted = text::normalize(name);
    available
        .iter()
        .find(|o| text::normalize(&o.name) == wanted)
        .or_else(|| {
            available.iter().find(|o| {
                let have = text::normalize(&o.name);
                have.contains(&wanted) || wanted.contains(&have)
            })
        })
}
