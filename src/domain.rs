//! Domain module - core business logic and entities
//!
//! Pure data and decision logic: no IO, no page automation, no storage.
//! Each module is its own file in the domain/ directory; public exports are
//! defined here for convenience.

pub mod catalog;
pub mod error;
pub mod failure;
pub mod mapping;
pub mod options;
pub mod registration;
pub mod services;
pub mod text;

pub use catalog::CatalogEntry;
pub use error::{FailureReason, RegistrationError};
pub use failure::FailureRecord;
pub use mapping::{CategoryMappingTable, MappingTunables};
pub use options::{BrandOption, CategoryOption};
pub use registration::{RegistrationRequest, RegistrationResponse};
pub use services::{BrandClassifier, DedupConfig, DedupEngine, GroupClassifier};
