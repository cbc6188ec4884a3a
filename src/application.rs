//! Application module - use-case orchestration
//!
//! Hosts the registration pipeline that ties the domain services to the
//! infrastructure.

pub mod pipeline;

pub use pipeline::{PipelineStats, RegistrationPipeline};
