//! Domain services
//!
//! Business logic that doesn't naturally fit within a single entity: the
//! deduplication engine and the two classifiers.

pub mod brand_classifier;
pub mod dedup;
pub mod group_classifier;

pub use brand_classifier::BrandClassifier;
pub use dedup::{DedupConfig, DedupEngine};
pub use group_classifier::GroupClassifier;
