//! Validation engine: both checkers through the sandbox, one verdict out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use playforge_sandbox::{
    BuiltinChecker, CheckerInvocation, CheckerOutcome, SandboxError, SandboxRunner,
};

use crate::classifier::classify;
use crate::domain::{ValidationError, ValidationVerdict};

/// Error recorded for blank artifacts, which never reach the sandbox.
pub const EMPTY_ARTIFACT: &str = "artifact is empty";

/// How a checker that hit its deadline is reported.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutPolicy {
    /// A timeout is a finding in the verdict and drives a retry.
    #[default]
    Finding,
    /// A timeout is an infrastructure failure and ends the run.
    Infrastructure,
}

/// Runs the lint and syntax checkers against one artifact.
pub struct ValidationEngine {
    sandbox: Arc<dyn SandboxRunner>,
    lint_command: Vec<String>,
    syntax_command: Vec<String>,
    timeout_policy: TimeoutPolicy,
}

impl ValidationEngine {
    pub fn new(sandbox: Arc<dyn SandboxRunner>) -> Self {
        Self {
            sandbox,
            lint_command: BuiltinChecker::AnsibleLint.command(),
            syntax_command: BuiltinChecker::SyntaxCheck.command(),
            timeout_policy: TimeoutPolicy::default(),
        }
    }

    pub fn with_timeout_policy(mut self, policy: TimeoutPolicy) -> Self {
        self.timeout_policy = policy;
        self
    }

    /// Override the checker argv (artifact path is still appended last).
    pub fn with_commands(mut self, lint: Vec<String>, syntax: Vec<String>) -> Self {
        self.lint_command = lint;
        self.syntax_command = syntax;
        self
    }

    pub fn sandbox(&self) -> &Arc<dyn SandboxRunner> {
        &self.sandbox
    }

    /// Validate `artifact`, holding each checker to `timeout_secs`.
    ///
    /// Both checkers run concurrently; the verdict orders lint findings first
    /// regardless of which finished first.
    pub async fn validate(
        &self,
        artifact: &str,
        timeout_secs: u64,
    ) -> Result<ValidationVerdict, ValidationError> {
        if artifact.trim().is_empty() {
            return Ok(ValidationVerdict::rejected(EMPTY_ARTIFACT));
        }

        let lint = CheckerInvocation::custom(
            BuiltinChecker::AnsibleLint.name(),
            self.lint_command.clone(),
            timeout_secs,
        );
        let syntax = CheckerInvocation::custom(
            BuiltinChecker::SyntaxCheck.name(),
            self.syntax_command.clone(),
            timeout_secs,
        );

        let (lint_outcome, syntax_outcome) = tokio::join!(
            self.sandbox.run(&lint, artifact),
            self.sandbox.run(&syntax, artifact),
        );
        let lint_outcome = lint_outcome?;
        let syntax_outcome = syntax_outcome?;

        debug!(
            backend = self.sandbox.backend_name(),
            lint_exit = lint_outcome.exit_code,
            syntax_exit = syntax_outcome.exit_code,
            lint_ms = lint_outcome.duration_ms,
            syntax_ms = syntax_outcome.duration_ms,
            "checkers finished"
        );

        if self.timeout_policy == TimeoutPolicy::Infrastructure {
            reject_timeout(&lint, &lint_outcome)?;
            reject_timeout(&syntax, &syntax_outcome)?;
        }

        Ok(classify(&lint_outcome, &syntax_outcome))
    }
}

fn reject_timeout(
    invocation: &CheckerInvocation,
    outcome: &CheckerOutcome,
) -> Result<(), SandboxError> {
    if outcome.timed_out {
        return Err(SandboxError::Timeout {
            checker: invocation.name.clone(),
            timeout_secs: outcome.timeout_secs,
        });
    }
    Ok(())
}
