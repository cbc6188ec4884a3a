//! Infrastructure module - IO, persistence and browser plumbing
//!
//! Everything that touches a file or a page lives here. The domain layer
//! never imports from this module.

pub mod backlog;
pub mod brand_registry;
pub mod catalog_store;
pub mod config;
pub mod form_machine;
pub mod logging;
pub mod mapping_store;
pub mod page;
pub mod poll;
pub mod recovery;

pub use backlog::FailureBacklog;
pub use brand_registry::BrandRegistry;
pub use catalog_store::{CatalogStats, CatalogStore};
pub use config::{AutomationConfig, ConfigManager, FormTimingConfig, RetryConfig, SelectorConfig};
pub use form_machine::{is_valid_generated_code, FormMachine, FormPhase, FormPlan};
pub use mapping_store::MappingStore;
pub use page::{AutomationContext, ElementRef, LoginHandler, PageDriver, SessionProvider};
pub use poll::{poll_until, PollOutcome};
pub use recovery::{PageKind, RecoveryManager};
