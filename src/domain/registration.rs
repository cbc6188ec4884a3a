//! Registration request/response models exchanged with the task intake
//! boundary.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::error::RegistrationError;

static CODE_SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.\s]").expect("valid regex"));

/// An incoming request to register one catalog entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationRequest {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub description: String,
    #[serde(rename = "classificationCode")]
    pub classification_code: String,
    pub cost: Decimal,
    pub timestamp: DateTime<Utc>,
    pub attempts: u32,
    pub priority: u32,
}

impl RegistrationRequest {
    pub fn new(
        description: impl Into<String>,
        classification_code: impl Into<String>,
        cost: Decimal,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            description: description.into(),
            classification_code: classification_code.into(),
            cost,
            timestamp: Utc::now(),
            attempts: 0,
            priority: 1,
        }
    }

    /// Checks the hard processing invariants: non-empty description and a
    /// positive cost. A malformed classification code is tolerated (the
    /// operator can fix it in the target system later) but logged.
    pub fn validate(&self) -> Result<(), RegistrationError> {
        if self.description.trim().is_empty() {
            return Err(RegistrationError::Validation(
                "description must not be empty".into(),
            ));
        }
        if self.cost <= Decimal::ZERO {
            return Err(RegistrationError::Validation(format!(
                "cost must be positive, got {}",
                self.cost
            )));
        }
        if !self.has_valid_classification_code() {
            tracing::warn!(
                request_id = %self.request_id,
                code = %self.classification_code,
                "classification code is not 8 numeric digits, proceeding anyway"
            );
        }
        Ok(())
    }

    /// Classification code stripped of dots and spaces.
    pub fn cleaned_classification_code(&self) -> String {
        CODE_SEPARATORS.replace_all(&self.classification_code, "").into_owned()
    }

    /// True when the cleaned classification code is exactly 8 digits.
    pub fn has_valid_classification_code(&self) -> bool {
        let cleaned = self.cleaned_classification_code();
        cleaned.len() == 8 && cleaned.chars().all(|c| c.is_ascii_digit())
    }
}

/// Outcome of one registration request, returned to the task intake
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationResponse {
    pub success: bool,
    pub message: String,
    #[serde(rename = "generatedCode")]
    pub generated_code: Option<String>,
    pub description: String,
    pub cost: Option<Decimal>,
    #[serde(rename = "salePrice")]
    pub sale_price: Option<Decimal>,
    #[serde(rename = "categoryName")]
    pub category_name: Option<String>,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "attemptNumber")]
    pub attempt_number: u32,
    #[serde(rename = "alreadyExisted")]
    pub already_existed: bool,
}

impl RegistrationResponse {
    /// A brand-new entity was registered and confirmed by the target system.
    pub fn registered(
        code: impl Into<String>,
        request: &RegistrationRequest,
        sale_price: Decimal,
        category_name: impl Into<String>,
        attempt_number: u32,
    ) -> Self {
        let code = code.into();
        Self {
            success: true,
            message: format!("registered with generated code {code}"),
            generated_code: Some(code),
            description: request.description.clone(),
            cost: Some(request.cost),
            sale_price: Some(sale_price),
            category_name: Some(category_name.into()),
            request_id: request.request_id.clone(),
            timestamp: Utc::now(),
            attempt_number,
            already_existed: false,
        }
    }

    /// The dedup engine matched an existing catalog entry; nothing was
    /// submitted to the target system.
    pub fn already_existed(code: impl Into<String>, request: &RegistrationRequest) -> Self {
        let code = code.into();
        Self {
            success: true,
            message: format!("entity already registered under code {code}"),
            generated_code: Some(code),
            description: request.description.clone(),
            cost: Some(request.cost),
            sale_price: None,
            category_name: None,
            request_id: request.request_id.clone(),
            timestamp: Utc::now(),
            attempt_number: 1,
            already_existed: true,
        }
    }

    /// Terminal failure after all retries were exhausted.
    pub fn failed(error: &RegistrationError, request: &RegistrationRequest, attempt_number: u32) -> Self {
        Self {
            success: false,
            message: error.to_string(),
            generated_code: None,
            description: request.description.clone(),
            cost: Some(request.cost),
            sale_price: None,
            category_name: None,
            request_id: request.request_id.clone(),
            timestamp: Utc::now(),
            attempt_number,
            already_existed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_description_is_rejected() {
        let req = RegistrationRequest::new("  ", "84713012", dec!(10.00));
        assert!(req.validate().is_err());
    }

    #[test]
    fn non_positive_cost_is_rejected() {
        let req = RegistrationRequest::new("SSD NVME 1TB", "84713012", dec!(0));
        assert!(req.validate().is_err());
    }

    #[test]
    fn malformed_classification_code_is_tolerated() {
        let req = RegistrationRequest::new("SSD NVME 1TB", "8471", dec!(199.90));
        assert!(req.validate().is_ok());
        assert!(!req.has_valid_classification_code());
    }

    #[test]
    fn classification_code_is_cleaned_before_validation() {
        let req = RegistrationRequest::new("SSD NVME 1TB", "8471.30 12", dec!(199.90));
        assert_eq!(req.cleaned_classification_code(), "84713012");
        assert!(req.has_valid_classification_code());
    }
}
