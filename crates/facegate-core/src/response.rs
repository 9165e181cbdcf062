//! Flat JSON response shapes for a transport layer.

use crate::gates::LivenessReport;
use crate::outcome::{Checks, ErrorCode, Stage};
use crate::pipeline::{EnrollmentReport, Rejection, ValidationResult, VerificationResult};
use crate::types::DEFAULT_EMBEDDING_VERSION;
use serde::Serialize;

/// `{ valid, message, embedding, embedding_version }` or `{ valid: false, error_code, reason }`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<Stage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<EnrollmentReport>,
    pub checks: Checks,
}

impl From<&ValidationResult> for ValidationResponse {
    fn from(result: &ValidationResult) -> Self {
        match result {
            ValidationResult::Accepted {
                embedding,
                report,
                checks,
            } => Self {
                valid: true,
                message: Some("Image is valid.".to_string()),
                error_code: None,
                reason: None,
                failed_stage: None,
                embedding: Some(embedding.values.clone()),
                embedding_version: Some(
                    embedding
                        .model_version
                        .clone()
                        .unwrap_or_else(|| DEFAULT_EMBEDDING_VERSION.to_string()),
                ),
                diagnostics: Some(report.clone()),
                checks: checks.clone(),
            },
            ValidationResult::Rejected(rejection) => Self {
                valid: false,
                message: None,
                error_code: Some(rejection.code),
                reason: Some(rejection.reason.clone()),
                failed_stage: rejection.stage,
                embedding: None,
                embedding_version: None,
                diagnostics: None,
                checks: rejection.checks.clone(),
            },
        }
    }
}

/// `{ verified, confidence, is_same_person, liveness, checks }`, or an error shape
/// carrying `error_code` and `reason` plus whatever checks ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationResponse {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_same_person: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liveness: Option<LivenessReport>,
    #[serde(skip_serializing_if = "Checks::is_empty")]
    pub checks: Checks,
}

impl VerificationResponse {
    fn rejected(rejection: &Rejection, liveness: &LivenessReport) -> Self {
        // Liveness data only once the liveness stage ran.
        let liveness = rejection
            .checks
            .get(Stage::Liveness)
            .map(|_| liveness.clone());
        Self {
            verified: false,
            error_code: Some(rejection.code),
            reason: Some(rejection.reason.clone()),
            confidence: None,
            is_same_person: None,
            liveness,
            checks: rejection.checks.clone(),
        }
    }
}

impl From<&VerificationResult> for VerificationResponse {
    fn from(result: &VerificationResult) -> Self {
        match result {
            VerificationResult::Verified(report) | VerificationResult::NoMatch(report) => Self {
                verified: report.comparison.verified,
                error_code: None,
                reason: None,
                confidence: Some(report.comparison.confidence),
                is_same_person: Some(report.comparison.is_same_person),
                liveness: Some(report.liveness.clone()),
                checks: report.checks.clone(),
            },
            VerificationResult::Rejected {
                rejection,
                liveness,
            } => Self::rejected(rejection, liveness),
        }
    }
}
