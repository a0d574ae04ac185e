//! Structured lifecycle events for orchestration runs.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Runs are wrapped in [`run_span`], which tags all nested events (sandbox
//! ones included) with the run id.

use tracing::{info, warn};

use crate::domain::FailureKind;

/// Span tagging everything inside one orchestration with `run_id`.
///
/// ```ignore
/// orchestrate(...).instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("playforge.run", run_id = %run_id)
}

pub fn emit_orchestration_started(max_attempts: u32, backend: &str, model: &str) {
    info!(
        event = "orchestration.started",
        max_attempts,
        sandbox = %backend,
        model = %model,
    );
}

pub fn emit_attempt_started(attempt: u32, description_chars: usize) {
    info!(event = "attempt.started", attempt, description_chars);
}

pub fn emit_attempt_validated(attempt: u32, valid: bool, error_count: usize, duration_ms: u64) {
    info!(
        event = "attempt.validated",
        attempt,
        valid,
        error_count,
        duration_ms,
    );
}

/// Generator or sandbox failure that ends the run (warning level).
pub fn emit_attempt_aborted(attempt: u32, kind: FailureKind, error: &dyn std::fmt::Display) {
    warn!(event = "attempt.aborted", attempt, kind = ?kind, error = %error);
}

pub fn emit_orchestration_finished(
    success: bool,
    attempts: u32,
    failure_kind: Option<FailureKind>,
    duration_ms: u64,
) {
    info!(
        event = "orchestration.finished",
        success,
        attempts,
        failure_kind = ?failure_kind,
        duration_ms,
    );
}
