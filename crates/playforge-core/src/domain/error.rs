//! Error taxonomy for Playforge.
//!
//! Checker findings are never errors: they live in
//! [`ValidationVerdict::errors`](crate::ValidationVerdict::errors) and drive
//! retries. Everything below ends an operation.

use std::path::PathBuf;

use playforge_sandbox::SandboxError;

/// Invalid settings, caught before any external call.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("max_attempts must be at least 1, got {0}")]
    InvalidMaxAttempts(u32),

    #[error("temperature must be within [0, 2], got {0}")]
    InvalidTemperature(f64),

    #[error("max_tokens must be greater than zero")]
    InvalidMaxTokens,

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error("{field} must not be empty")]
    EmptyCommand { field: &'static str },

    #[error("{field} is {value}, at most {max} allowed")]
    TooLarge {
        field: &'static str,
        value: u64,
        max: u64,
    },

    #[error("missing API key for provider {provider}: set {env_var}")]
    MissingApiKey {
        provider: String,
        env_var: &'static str,
    },

    #[error("unknown provider: {0} (expected claude or gemini)")]
    UnknownProvider(String),

    #[error("system prompt: {0}")]
    Prompt(#[from] PromptError),

    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),

    #[error("invalid value for {var}: {value:?}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failures of the text generator. Fatal to an orchestration; never retried.
#[derive(Debug, thiserror::Error)]
pub enum GeneratorError {
    #[error("provider returned HTTP {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation timed out after {0}s")]
    Timeout(u64),

    #[error("provider returned no text")]
    EmptyResponse,

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] ConfigError),
}

impl From<reqwest::Error> for GeneratorError {
    fn from(err: reqwest::Error) -> Self {
        GeneratorError::Transport(err.to_string())
    }
}

/// Validation could not produce a verdict.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{0}")]
    Infrastructure(#[from] SandboxError),
}

/// The orchestration refused to start.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

/// Playbook library failures.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("invalid playbook name: {0:?}")]
    InvalidName(String),

    #[error("path escapes the playbook directory: {0}")]
    PathTraversal(String),

    #[error("playbook not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// System prompt loading failures.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("cannot read prompt {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("prompt is missing critical keywords: {}", .0.join(", "))]
    MissingKeywords(Vec<String>),
}
