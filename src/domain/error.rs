//! Error taxonomy of the registration pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Everything that can go wrong while processing one registration request.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// Malformed request. Never retried, surfaced to the caller immediately.
    #[error("invalid request: {0}")]
    Validation(String),

    /// The entry form could not be located after the whole detection ladder.
    #[error("registration form not found: {0}")]
    FormNotFound(String),

    /// The form was filled but the target system never confirmed the save.
    #[error("save failed: {0}")]
    SaveFailed(String),

    /// The save looked successful but no valid identifier ever appeared.
    #[error("generated identifier was not captured: {0}")]
    CodeNotGenerated(String),

    /// The session landed on the login page mid-operation.
    #[error("session expired")]
    SessionExpired,

    /// No category options could be loaded. Degrades to the default
    /// category; not an error for the caller.
    #[error("no category options available")]
    ClassificationUnavailable,

    /// Catch-all for unexpected automation failures.
    #[error("unexpected automation error: {0}")]
    Unexpected(#[from] anyhow::Error),
}

impl RegistrationError {
    /// Whether the cross-operation retry loop should attempt recovery and
    /// try the whole registration again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::FormNotFound(_)
                | Self::SaveFailed(_)
                | Self::CodeNotGenerated(_)
                | Self::SessionExpired
                | Self::Unexpected(_)
        )
    }

    /// The durable reason tag recorded in the failure backlog.
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            Self::Validation(_) => FailureReason::Validation,
            Self::FormNotFound(_) => FailureReason::FormNotFound,
            Self::SaveFailed(_) => FailureReason::SaveFailed,
            Self::CodeNotGenerated(_) => FailureReason::CodeNotGenerated,
            Self::SessionExpired => FailureReason::SessionExpired,
            Self::ClassificationUnavailable => FailureReason::ClassificationUnavailable,
            Self::Unexpected(_) => FailureReason::Unexpected,
        }
    }
}

/// Fixed failure taxonomy persisted with backlog records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Validation,
    FormNotFound,
    SaveFailed,
    CodeNotGenerated,
    SessionExpired,
    ClassificationUnavailable,
    Unexpected,
}
