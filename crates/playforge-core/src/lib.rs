//! Playforge Core Library
//!
//! Generates Ansible playbooks for Kubernetes with a language model and only
//! hands one back once it passes `ansible-lint` and
//! `ansible-playbook --syntax-check` inside a sandbox. Failed candidates are
//! retried with the checker errors fed back into the next request.

pub mod classifier;
pub mod domain;
pub mod fakes;
pub mod generator;
pub mod library;
pub mod obs;
pub mod orchestrator;
pub mod prompts;
pub mod readme;
pub mod service;
pub mod settings;
pub mod telemetry;
pub mod validation;

pub use classifier::classify;

pub use domain::{
    artifact_digest, AttemptRecord, ConfigError, FailureKind, GenerationRequest,
    GenerationResponse, GenerationResult, GeneratorError, LibraryError, OrchestratorError,
    PromptError, ValidationError, ValidationVerdict,
};

pub use generator::{build_generator, ClaudeGenerator, GeminiGenerator, Generator};
pub use library::{sanitize_filename, PlaybookLibrary, PlaybookMetadata};
pub use orchestrator::{
    compose_feedback, next_state, strip_code_fence, AttemptState, Orchestrator,
    OrchestratorOptions, FEEDBACK_HEADER,
};
pub use prompts::{load_system_prompt, CRITICAL_KEYWORDS};
pub use readme::{generate_readme, try_generate_readme};
pub use service::{build_validation_engine, Playforge};
pub use settings::{GeneratorSettings, LibrarySettings, Provider, Settings, ValidationSettings};
pub use telemetry::init_tracing;
pub use validation::{TimeoutPolicy, ValidationEngine, EMPTY_ARTIFACT};

pub use playforge_sandbox::{
    CheckerInvocation, CheckerOutcome, SandboxBackend, SandboxConfig, SandboxError,
    SandboxRunner,
};
