//! The sandbox runner contract and its raw result type.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SandboxResult;
use crate::invocation::CheckerInvocation;

/// Raw result of one checker run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerOutcome {
    /// Exit code (0 = no findings, -1 when killed at the deadline).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Whether the run was killed because it exceeded its deadline.
    pub timed_out: bool,

    /// Deadline the run was held to, after clamping.
    pub timeout_secs: u64,

    /// Wall time in milliseconds.
    pub duration_ms: u64,
}

impl CheckerOutcome {
    /// A run that exited on its own.
    pub fn completed(
        exit_code: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: false,
            timeout_secs,
            duration_ms: 0,
        }
    }

    /// A run killed at its deadline; whatever output arrived is kept.
    pub fn deadline_exceeded(
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            exit_code: -1,
            stdout: stdout.into(),
            stderr: stderr.into(),
            timed_out: true,
            timeout_secs,
            duration_ms: timeout_secs.saturating_mul(1000),
        }
    }

    /// Builder: record wall time.
    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }

    /// Whether the checker finished in time with exit code 0.
    pub fn passed(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs one checker invocation against untrusted artifact text.
///
/// Implementations must:
/// - hand `payload` to the checker only through a file reference
/// - kill the checker once `invocation.timeout_secs` (after clamping) elapses
///   and report it as `timed_out`, not as an error
/// - remove the transient artifact before returning, and on drop
#[async_trait]
pub trait SandboxRunner: Send + Sync {
    async fn run(
        &self,
        invocation: &CheckerInvocation,
        payload: &str,
    ) -> SandboxResult<CheckerOutcome>;

    /// Short backend label for logs.
    fn backend_name(&self) -> &'static str;
}
