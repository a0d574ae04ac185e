//! Maps raw checker outcomes to a [`ValidationVerdict`].

use playforge_sandbox::{BuiltinChecker, CheckerOutcome};

use crate::domain::ValidationVerdict;

/// Combine the lint and syntax outcomes into one verdict.
///
/// Lint findings always come before syntax findings. A failed or timed-out
/// checker contributes exactly one error. Lint stdout mentioning a warning is
/// kept verbatim as a single, non-gating warning.
pub fn classify(lint: &CheckerOutcome, syntax: &CheckerOutcome) -> ValidationVerdict {
    let errors = [
        (BuiltinChecker::AnsibleLint, lint),
        (BuiltinChecker::SyntaxCheck, syntax),
    ]
    .into_iter()
    .filter_map(|(checker, outcome)| failure_message(checker.name(), outcome))
    .collect();

    ValidationVerdict::new(
        errors,
        lint_warnings(lint),
        raw_output(lint),
        raw_output(syntax),
    )
}

fn failure_message(checker: &str, outcome: &CheckerOutcome) -> Option<String> {
    if outcome.timed_out {
        return Some(format!(
            "{checker} timed out after {}s",
            outcome.timeout_secs
        ));
    }
    if outcome.exit_code == 0 {
        return None;
    }

    let stderr = outcome.stderr.trim();
    let detail = if stderr.is_empty() {
        outcome.stdout.trim()
    } else {
        stderr
    };
    if detail.is_empty() {
        Some(format!(
            "{checker} failed: exited with code {}",
            outcome.exit_code
        ))
    } else {
        Some(format!("{checker} failed: {detail}"))
    }
}

fn lint_warnings(lint: &CheckerOutcome) -> Vec<String> {
    if lint.stdout.to_lowercase().contains("warning") {
        vec![lint.stdout.clone()]
    } else {
        Vec::new()
    }
}

/// Stdout then stderr, each stream starting on its own line.
fn raw_output(outcome: &CheckerOutcome) -> String {
    let mut raw = outcome.stdout.clone();
    if !raw.is_empty() && !outcome.stderr.is_empty() && !raw.ends_with('\n') {
        raw.push('\n');
    }
    raw.push_str(&outcome.stderr);
    raw
}
