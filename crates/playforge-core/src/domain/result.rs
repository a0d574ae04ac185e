//! The final result of one orchestration.

use serde::{Deserialize, Serialize};

use super::request::GenerationResponse;
use super::verdict::ValidationVerdict;

/// Why an orchestration ended without a valid artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The generator failed or missed its deadline.
    Generator,
    /// The sandbox could not produce a verdict.
    Infrastructure,
    /// Every attempt produced an invalid artifact.
    Exhausted,
}

/// One generate-validate cycle in the run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    /// SHA-256 of the validated text; `None` when generation failed.
    pub artifact_digest: Option<String>,
    pub error_count: usize,
    pub duration_ms: u64,
}

/// Result of [`Orchestrator::orchestrate`](crate::Orchestrator::orchestrate).
///
/// `success` is true exactly when an attempt produced a valid verdict; the
/// artifact is then the exact text that passed validation. Every failed
/// result carries an empty artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub artifact: String,
    pub verdict: Option<ValidationVerdict>,
    pub model_used: Option<String>,
    pub tokens_used: Option<u64>,
    pub failure_reason: Option<String>,
    pub failure_kind: Option<FailureKind>,
    pub attempts: u32,
    #[serde(default)]
    pub history: Vec<AttemptRecord>,
}

impl GenerationResult {
    pub(crate) fn succeeded(
        response: GenerationResponse,
        verdict: ValidationVerdict,
        attempts: u32,
        history: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            success: true,
            artifact: response.content,
            verdict: Some(verdict),
            model_used: Some(response.model_id),
            tokens_used: response.token_count,
            failure_reason: None,
            failure_kind: None,
            attempts,
            history,
        }
    }

    pub(crate) fn failed(
        kind: FailureKind,
        reason: String,
        verdict: Option<ValidationVerdict>,
        attempts: u32,
        history: Vec<AttemptRecord>,
    ) -> Self {
        Self {
            success: false,
            artifact: String::new(),
            verdict,
            model_used: None,
            tokens_used: None,
            failure_reason: Some(reason),
            failure_kind: Some(kind),
            attempts,
            history,
        }
    }
}
