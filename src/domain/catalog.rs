//! Catalog entry model.
//!
//! A `CatalogEntry` exists only after the target system confirmed an entity
//! by generating its identifier. The catalog store owns these records; the
//! form automation layer only supplies the data used to build one.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::text;

/// A confirmed, externally-identified registered entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Identifier assigned by the external system. Authoritative.
    #[serde(rename = "generatedCode")]
    pub generated_code: String,
    pub description: String,
    #[serde(rename = "classificationCode")]
    pub classification_code: String,
    pub cost: Decimal,
    #[serde(rename = "salePrice")]
    pub sale_price: Decimal,
    #[serde(rename = "categoryId")]
    pub category_id: String,
    #[serde(rename = "categoryName")]
    pub category_name: String,
    #[serde(rename = "brandId")]
    pub brand_id: Option<String>,
    #[serde(rename = "brandName")]
    pub brand_name: Option<String>,
    pub unit: String,
    #[serde(rename = "taxRate")]
    pub tax_rate: Decimal,
    #[serde(rename = "taxRegimeCode")]
    pub tax_regime_code: String,
    #[serde(rename = "markupPercent")]
    pub markup_percent: Decimal,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    #[serde(rename = "systemCreated")]
    pub system_created: bool,
    pub active: bool,
}

impl CatalogEntry {
    /// Pairwise similarity predicate: descriptions overlap at or above
    /// `overlap_min`, costs within `cost_tolerance` (fraction of self's
    /// cost), classification codes equal. All three must hold.
    pub fn is_similar(&self, other: &CatalogEntry, overlap_min: f64, cost_tolerance: Decimal) -> bool {
        self.classification_code == other.classification_code
            && costs_within(self.cost, other.cost, cost_tolerance)
            && text::overlap_ratio(&self.description, &other.description) >= overlap_min
    }
}

/// True when `b` is within `tolerance * a` of `a`.
pub fn costs_within(a: Decimal, b: Decimal, tolerance: Decimal) -> bool {
    (a - b).abs() <= a.abs() * tolerance
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn entry(description: &str, code: &str, cost: Decimal) -> CatalogEntry {
        CatalogEntry {
            generated_code: "123456".into(),
            description: description.into(),
            classification_code: code.into(),
            cost,
            sale_price: cost * dec!(1.45),
            category_id: "10".into(),
            category_name: "MISC".into(),
            brand_id: None,
            brand_name: None,
            unit: "PC".into(),
            tax_rate: dec!(17.00),
            tax_regime_code: "00".into(),
            markup_percent: dec!(45.00),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            system_created: true,
            active: true,
        }
    }

    #[test]
    fn similar_requires_all_three_criteria() {
        let a = entry("NOTEBOOK DELL INSPIRON 15", "84713012", dec!(2500.00));
        let same = entry("NOTEBOOK DELL INSPIRON 15", "84713012", dec!(2600.00));
        let other_code = entry("NOTEBOOK DELL INSPIRON 15", "84713019", dec!(2500.00));
        let other_cost = entry("NOTEBOOK DELL INSPIRON 15", "84713012", dec!(4000.00));
        let other_text = entry("CADEIRA GAMER", "84713012", dec!(2500.00));

        assert!(a.is_similar(&same, 0.8, dec!(0.1)));
        assert!(!a.is_similar(&other_code, 0.8, dec!(0.1)));
        assert!(!a.is_similar(&other_cost, 0.8, dec!(0.1)));
        assert!(!a.is_similar(&other_text, 0.8, dec!(0.1)));
    }

    #[test]
    fn cost_tolerance_is_a_fraction_of_the_reference_cost() {
        assert!(costs_within(dec!(100), dec!(110), dec!(0.1)));
        assert!(costs_within(dec!(100), dec!(90), dec!(0.1)));
        assert!(!costs_within(dec!(100), dec!(111), dec!(0.1)));
    }
}
