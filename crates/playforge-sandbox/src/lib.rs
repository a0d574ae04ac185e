//! Playforge Sandbox - isolated checker execution
//!
//! Runs one static checker against untrusted artifact text:
//! - The artifact only reaches the checker as a file reference (never argv text)
//! - Every run is bounded by a wall-clock deadline and killed when it expires
//! - The transient artifact is removed on every exit path, cancellation included
//!
//! Two backends implement [`SandboxRunner`]: [`DockerSandbox`] (container
//! isolation, the production default) and [`LocalSandbox`] (host process).

pub mod config;
pub mod docker;
pub mod error;
pub mod invocation;
pub mod local;
pub mod runner;

mod exec;
mod transient;

use std::sync::Arc;

pub use config::{SandboxBackend, SandboxConfig, MAX_START_RETRIES};
pub use docker::DockerSandbox;
pub use error::{SandboxError, SandboxResult};
pub use invocation::{BuiltinChecker, CheckerInvocation};
pub use local::LocalSandbox;
pub use runner::{CheckerOutcome, SandboxRunner};

/// Build the runner selected by `config.backend`.
pub fn build_sandbox(config: &SandboxConfig) -> Arc<dyn SandboxRunner> {
    match config.backend {
        SandboxBackend::Docker => Arc::new(DockerSandbox::new(config.clone())),
        SandboxBackend::Local => Arc::new(LocalSandbox::new(config.clone())),
    }
}
