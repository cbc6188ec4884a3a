//! Session-scoped option lists scraped from the live form.
//!
//! The target system is the source of truth for both lists; they are loaded
//! once per automation session and explicitly passed to the classifiers,
//! never persisted as authoritative data.

use serde::{Deserialize, Serialize};

/// One entry of the category ("group") select on the registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryOption {
    pub id: String,
    pub name: String,
}

impl CategoryOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}

/// One entry of the brand select on the registration form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrandOption {
    pub id: String,
    pub name: String,
}

impl BrandOption {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into() }
    }
}
