//! Container backend: one throwaway, network-less, read-only container per run.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{SandboxConfig, MAX_START_RETRIES};
use crate::error::{SandboxError, SandboxResult};
use crate::exec::{run_to_deadline, Captured};
use crate::invocation::CheckerInvocation;
use crate::runner::{CheckerOutcome, SandboxRunner};
use crate::transient::TransientArtifact;

/// Where the artifact appears inside the container.
pub const CONTAINER_ARTIFACT_PATH: &str = "/work/playbook.yml";

/// `docker run` exit codes that mean the container never ran the checker.
const RUNTIME_EXIT_CODES: [i32; 3] = [125, 126, 127];

/// Ceiling for a single start-retry delay.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Delay before start retry `attempt` (zero-based): doubling, capped.
fn backoff_delay(base_ms: u64, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(MAX_START_RETRIES);
    Duration::from_millis(base_ms.saturating_mul(factor)).min(MAX_BACKOFF)
}

/// Runs each checker in a fresh container.
///
/// A semaphore models the runtime's finite execution slots. Runtime-level
/// failures (daemon down, image missing) are retried with exponential
/// backoff before surfacing as [`SandboxError::Unavailable`].
pub struct DockerSandbox {
    config: SandboxConfig,
    slots: Arc<Semaphore>,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        Self { config, slots }
    }

    /// Ask the daemon for its version; `Err` when the runtime is unreachable.
    pub async fn probe(&self) -> SandboxResult<String> {
        let mut cmd = Command::new(&self.config.docker_binary);
        cmd.args(["version", "--format", "{{.Server.Version}}"]);
        let captured = run_to_deadline(
            &mut cmd,
            Duration::from_secs(10),
            Duration::from_secs(1),
            4096,
        )
        .await
        .map_err(|e| SandboxError::Unavailable {
            reason: format!("cannot start {}: {}", self.config.docker_binary, e),
        })?;

        match captured.status {
            Some(status) if status.success() => Ok(captured.stdout.trim().to_string()),
            Some(_) => Err(SandboxError::Unavailable {
                reason: captured.stderr.trim().to_string(),
            }),
            None => Err(SandboxError::Unavailable {
                reason: "container runtime did not answer within 10s".to_string(),
            }),
        }
    }

    /// Full `docker run` argv for one checker run.
    pub fn run_args(
        &self,
        container: &str,
        host_artifact: &Path,
        invocation: &CheckerInvocation,
    ) -> Vec<OsString> {
        let mut mount = OsString::from("type=bind,source=");
        mount.push(host_artifact.as_os_str());
        mount.push(format!(",target={CONTAINER_ARTIFACT_PATH},readonly"));

        let mut args: Vec<OsString> = [
            "run",
            "--rm",
            "--name",
            container,
            "--network",
            "none",
            "--read-only",
            "--tmpfs",
            "/tmp:rw,size=64m",
            "--env",
            "HOME=/tmp",
            "--cap-drop",
            "ALL",
            "--security-opt",
            "no-new-privileges",
            "--memory",
            self.config.memory_limit.as_str(),
            "--cpus",
            self.config.cpu_limit.as_str(),
        ]
        .into_iter()
        .map(OsString::from)
        .collect();

        args.push("--pids-limit".into());
        args.push(self.config.pids_limit.to_string().into());
        args.push("--mount".into());
        args.push(mount);
        args.push(self.config.image.clone().into());
        args.extend(invocation.command.iter().map(OsString::from));
        args.push(CONTAINER_ARTIFACT_PATH.into());
        args
    }

    async fn run_once(
        &self,
        invocation: &CheckerInvocation,
        artifact: &TransientArtifact,
        timeout_secs: u64,
    ) -> SandboxResult<CheckerOutcome> {
        let grace = Duration::from_secs(self.config.teardown_grace_secs);
        let slot_wait = Duration::from_secs(timeout_secs) + grace;
        let waited = Instant::now();
        let _permit = tokio::time::timeout(slot_wait, self.slots.clone().acquire_owned())
            .await
            .map_err(|_| SandboxError::Busy {
                waited_ms: waited.elapsed().as_millis() as u64,
            })?
            .map_err(|_| SandboxError::Unavailable {
                reason: "execution slots closed".to_string(),
            })?;

        let container = format!("playforge-{}", Uuid::new_v4().simple());
        let mut guard = ContainerGuard::new(&self.config.docker_binary, &container);

        let mut cmd = Command::new(&self.config.docker_binary);
        cmd.args(self.run_args(&container, artifact.path(), invocation));

        debug!(checker = %invocation.name, container = %container, timeout_secs, "starting container");

        let captured = match run_to_deadline(
            &mut cmd,
            Duration::from_secs(timeout_secs),
            grace,
            self.config.max_output_bytes,
        )
        .await
        {
            Ok(captured) => captured,
            Err(e) => {
                guard.disarm();
                return Err(SandboxError::Unavailable {
                    reason: format!("cannot start {}: {}", self.config.docker_binary, e),
                });
            }
        };

        if captured.status.is_none() {
            info!(event = "sandbox.timeout", checker = %invocation.name, container = %container, timeout_secs);
            guard.remove_now().await;
            return Ok(captured.into_outcome(timeout_secs));
        }

        // --rm removed the container once it exited.
        guard.disarm();
        classify_runtime_exit(captured, timeout_secs)
    }
}

/// Separate "docker could not run the container" from "the checker ran".
fn classify_runtime_exit(captured: Captured, timeout_secs: u64) -> SandboxResult<CheckerOutcome> {
    let code = captured.exit_code();
    if RUNTIME_EXIT_CODES.contains(&code) {
        return Err(SandboxError::Unavailable {
            reason: format!(
                "container runtime exited with {}: {}",
                code,
                captured.stderr.trim()
            ),
        });
    }
    Ok(captured.into_outcome(timeout_secs))
}

#[async_trait]
impl SandboxRunner for DockerSandbox {
    async fn run(
        &self,
        invocation: &CheckerInvocation,
        payload: &str,
    ) -> SandboxResult<CheckerOutcome> {
        invocation.check()?;
        let timeout_secs = invocation.effective_timeout_secs(self.config.min_timeout_secs);
        let artifact = TransientArtifact::write(&self.config.scratch_root(), payload)?;

        let retries = self.config.start_retries.min(MAX_START_RETRIES);
        let mut attempt = 0u32;
        let result = loop {
            match self.run_once(invocation, &artifact, timeout_secs).await {
                Err(e) if e.is_retryable() && attempt < retries => {
                    let delay = backoff_delay(self.config.backoff_base_ms, attempt);
                    warn!(
                        checker = %invocation.name,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "container runtime unavailable; retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => break other,
            }
        };

        artifact.close(&invocation.name);
        result
    }

    fn backend_name(&self) -> &'static str {
        "docker"
    }
}

/// Force-removes a container that did not exit on its own.
///
/// Killing the `docker run` client leaves the container running, so the
/// deadline path removes it explicitly and `Drop` covers cancellation.
struct ContainerGuard {
    binary: String,
    name: String,
    armed: bool,
}

impl ContainerGuard {
    fn new(binary: &str, name: &str) -> Self {
        Self {
            binary: binary.to_string(),
            name: name.to_string(),
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }

    async fn remove_now(&mut self) {
        self.armed = false;
        let result = Command::new(&self.binary)
            .args(["rm", "--force", &self.name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            warn!(container = %self.name, error = %e, "failed to remove timed-out container");
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let spawned = std::process::Command::new(&self.binary)
            .args(["rm", "--force", &self.name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn();
        match spawned {
            // Reap off the async runtime's worker threads.
            Ok(mut child) => {
                let name = self.name.clone();
                std::thread::spawn(move || {
                    if let Err(e) = child.wait() {
                        debug!(container = %name, error = %e, "docker rm did not finish");
                    }
                });
            }
            Err(e) => {
                warn!(container = %self.name, error = %e, "failed to remove abandoned container")
            }
        }
    }
}
