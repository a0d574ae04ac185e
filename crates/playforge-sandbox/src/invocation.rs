//! Checker definitions and invocation descriptors.

use serde::{Deserialize, Serialize};

use crate::error::{SandboxError, SandboxResult};

/// The two checkers every validation runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuiltinChecker {
    /// ansible-lint <file>
    AnsibleLint,

    /// ansible-playbook --syntax-check <file>
    SyntaxCheck,
}

impl BuiltinChecker {
    /// Name used in error text and logs.
    pub fn name(&self) -> &'static str {
        match self {
            BuiltinChecker::AnsibleLint => "ansible-lint",
            BuiltinChecker::SyntaxCheck => "syntax-check",
        }
    }

    /// Checker argv without the artifact path (the sandbox appends it).
    pub fn command(&self) -> Vec<String> {
        match self {
            BuiltinChecker::AnsibleLint => vec!["ansible-lint".to_string()],
            BuiltinChecker::SyntaxCheck => {
                vec!["ansible-playbook".to_string(), "--syntax-check".to_string()]
            }
        }
    }
}

/// One sandboxed checker run.
///
/// The artifact path is never part of `command`; runners append it as the
/// final argument so untrusted text cannot reach the command line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckerInvocation {
    /// Human-readable checker name.
    pub name: String,

    /// Command to execute (first element is the executable).
    pub command: Vec<String>,

    /// Deadline in seconds.
    pub timeout_secs: u64,
}

impl CheckerInvocation {
    /// Invocation for one of the builtin checkers.
    pub fn from_builtin(checker: BuiltinChecker, timeout_secs: u64) -> Self {
        Self {
            name: checker.name().to_string(),
            command: checker.command(),
            timeout_secs,
        }
    }

    /// Invocation for an arbitrary checker command.
    pub fn custom(name: impl Into<String>, command: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            name: name.into(),
            command,
            timeout_secs,
        }
    }

    /// Reject invocations no runner can execute.
    pub fn check(&self) -> SandboxResult<()> {
        match self.command.first() {
            None => Err(SandboxError::InvalidInvocation(format!(
                "checker {} has empty command",
                self.name
            ))),
            Some(exe) if exe.trim().is_empty() => Err(SandboxError::InvalidInvocation(format!(
                "checker {} has blank executable",
                self.name
            ))),
            Some(_) if self.timeout_secs == 0 => Err(SandboxError::InvalidInvocation(format!(
                "checker {} has zero timeout",
                self.name
            ))),
            Some(_) => Ok(()),
        }
    }

    /// Deadline after clamping to the runner's cold-start floor.
    pub fn effective_timeout_secs(&self, floor_secs: u64) -> u64 {
        if self.timeout_secs < floor_secs {
            tracing::warn!(
                checker = %self.name,
                requested_secs = self.timeout_secs,
                floor_secs,
                "checker timeout below sandbox floor; clamping"
            );
            floor_secs
        } else {
            self.timeout_secs
        }
    }
}
