//! Host-process backend.
//!
//! Weaker isolation than [`DockerSandbox`](crate::DockerSandbox): the checker
//! runs as the current user, in its own process group, with a null stdin.
//! Useful when the checkers are installed locally and for tests.

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::config::SandboxConfig;
use crate::error::{SandboxError, SandboxResult};
use crate::exec::run_to_deadline;
use crate::invocation::CheckerInvocation;
use crate::runner::{CheckerOutcome, SandboxRunner};
use crate::transient::TransientArtifact;

/// Runs checkers directly on the host.
pub struct LocalSandbox {
    config: SandboxConfig,
}

impl LocalSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SandboxRunner for LocalSandbox {
    async fn run(
        &self,
        invocation: &CheckerInvocation,
        payload: &str,
    ) -> SandboxResult<CheckerOutcome> {
        invocation.check()?;
        let timeout_secs = invocation.effective_timeout_secs(self.config.min_timeout_secs);

        let artifact = TransientArtifact::write(&self.config.scratch_root(), payload)?;

        let mut cmd = Command::new(&invocation.command[0]);
        cmd.args(&invocation.command[1..]).arg(artifact.path());

        debug!(checker = %invocation.name, timeout_secs, "running local checker");

        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_secs(timeout_secs),
            Duration::from_secs(self.config.teardown_grace_secs),
            self.config.max_output_bytes,
        )
        .await;

        artifact.close(&invocation.name);

        let captured = captured.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                SandboxError::Unavailable {
                    reason: format!("cannot start {}: {}", invocation.command[0], e),
                }
            }
            _ => SandboxError::Io(e),
        })?;

        if captured.status.is_none() {
            info!(event = "sandbox.timeout", checker = %invocation.name, timeout_secs);
        }
        Ok(captured.into_outcome(timeout_secs))
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}
