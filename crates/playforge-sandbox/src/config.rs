//! Sandbox configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which isolation mechanism runs the checkers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SandboxBackend {
    /// One throwaway container per checker run.
    #[default]
    Docker,
    /// Checker runs as a host process in its own process group.
    Local,
}

/// Upper bound for [`SandboxConfig::start_retries`].
pub const MAX_START_RETRIES: u32 = 8;

/// Configuration shared by all sandbox backends.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    pub backend: SandboxBackend,

    /// Container runtime CLI.
    pub docker_binary: String,

    /// Image that ships ansible-lint and ansible-playbook.
    pub image: String,

    /// `--memory` limit per container.
    pub memory_limit: String,

    /// `--cpus` limit per container.
    pub cpu_limit: String,

    /// `--pids-limit` per container.
    pub pids_limit: u32,

    /// Checker deadlines below this are clamped up (container cold start).
    pub min_timeout_secs: u64,

    /// Execution slots: concurrent containers allowed at once.
    pub max_concurrent: usize,

    /// Extra start attempts when the runtime reports itself unavailable
    /// (at most [`MAX_START_RETRIES`]).
    pub start_retries: u32,

    /// Base delay for exponential backoff between start attempts.
    pub backoff_base_ms: u64,

    /// Time allowed for teardown after a deadline expires.
    pub teardown_grace_secs: u64,

    /// Captured stdout/stderr beyond this many bytes is discarded.
    pub max_output_bytes: usize,

    /// Parent directory for transient artifacts (system temp dir if unset).
    pub scratch_dir: Option<PathBuf>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backend: SandboxBackend::Docker,
            docker_binary: "docker".to_string(),
            image: "playforge-ansible-validator:latest".to_string(),
            memory_limit: "512m".to_string(),
            cpu_limit: "1.0".to_string(),
            pids_limit: 256,
            min_timeout_secs: 30,
            max_concurrent: 4,
            start_retries: 2,
            backoff_base_ms: 500,
            teardown_grace_secs: 5,
            max_output_bytes: 1024 * 1024,
            scratch_dir: None,
        }
    }
}

impl SandboxConfig {
    /// Host-process configuration with no cold-start floor.
    pub fn local() -> Self {
        Self {
            backend: SandboxBackend::Local,
            min_timeout_secs: 1,
            ..Self::default()
        }
    }

    /// Builder: place transient artifacts under `dir`.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Directory transient artifacts are created in.
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
