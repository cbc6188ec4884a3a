//! Durable failure records parked in the retry backlog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::error::{FailureReason, RegistrationError};
use crate::domain::registration::RegistrationRequest;

/// One failed registration, persisted until a later re-drive succeeds or
/// the record ages out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub request: RegistrationRequest,
    #[serde(rename = "errorMessage")]
    pub error_message: String,
    pub reason: FailureReason,
    #[serde(rename = "failedAt")]
    pub failed_at: DateTime<Utc>,
    pub attempts: u32,
}

impl FailureRecord {
    pub fn new(request: RegistrationRequest, error: &RegistrationError, attempts: u32) -> Self {
        Self {
            error_message: error.to_string(),
            reason: error.failure_reason(),
            failed_at: Utc::now(),
            attempts,
            request,
        }
    }

    /// Whether the record is older than `horizon` relative to `now`.
    pub fn is_older_than(&self, now: DateTime<Utc>, horizon: chrono::Duration) -> bool {
        now - self.failed_at > horizon
    }
}
