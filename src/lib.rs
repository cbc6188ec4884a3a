//! Catalog Autoreg - resilient catalog registration pipeline
//!
//! Drives an external, browser-rendered business application to register
//! catalog entities on behalf of an upstream task source. The pipeline
//! combines similarity-based deduplication, heuristic category and brand
//! classification, a form-driving state machine confirmed through an
//! asynchronously-populated identifier field, and layered retry/recovery
//! with a durable failure backlog.
//!
//! The browser itself stays behind the [`infrastructure::page`] traits;
//! this crate carries no UI-library dependency.

// Module declarations
pub mod application;
pub mod domain;
pub mod infrastructure;

// Re-export the main entry points for embedding callers
pub use application::{PipelineStats, RegistrationPipeline};
pub use domain::{RegistrationRequest, RegistrationResponse};
pub use infrastructure::{AutomationConfig, ConfigManager};
