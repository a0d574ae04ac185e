//! Process settings.
//!
//! Sources, lowest precedence first: built-in defaults, a TOML file, then
//! environment variables. The binary applies its own flags on top and calls
//! [`Settings::validate`] before constructing anything.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use playforge_sandbox::{BuiltinChecker, SandboxBackend, SandboxConfig, MAX_START_RETRIES};

use crate::domain::request::TEMPERATURE_RANGE;
use crate::domain::ConfigError;
use crate::generator::{
    DEFAULT_CLAUDE_BASE_URL, DEFAULT_CLAUDE_MODEL, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL,
};
use crate::validation::TimeoutPolicy;

/// Env var naming the TOML settings file.
pub const CONFIG_ENV: &str = "PLAYFORGE_CONFIG";

/// Which hosted model backs generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Gemini,
    Claude,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini",
            Provider::Claude => "claude",
        }
    }

    /// Env var holding this provider's credential.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::Claude => "ANTHROPIC_API_KEY",
        }
    }
}

impl FromStr for Provider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" => Ok(Provider::Gemini),
            "claude" | "anthropic" => Ok(Provider::Claude),
            other => Err(ConfigError::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text generator settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GeneratorSettings {
    pub provider: Provider,
    #[serde(skip_serializing)]
    pub claude_api_key: Option<String>,
    #[serde(skip_serializing)]
    pub gemini_api_key: Option<String>,
    pub claude_model: String,
    pub gemini_model: String,
    pub claude_base_url: String,
    pub gemini_base_url: String,
    pub max_tokens: u32,
    pub temperature: f64,
    /// Deadline for one generator call, HTTP round trip included.
    pub timeout_secs: u64,
    /// Replaces the bundled system prompt when set.
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            claude_api_key: None,
            gemini_api_key: None,
            claude_model: DEFAULT_CLAUDE_MODEL.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            claude_base_url: DEFAULT_CLAUDE_BASE_URL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            max_tokens: 4096,
            temperature: 0.3,
            timeout_secs: 120,
            system_prompt_path: None,
        }
    }
}

impl GeneratorSettings {
    /// Credential for the selected provider.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        let key = match self.provider {
            Provider::Claude => self.claude_api_key.as_deref(),
            Provider::Gemini => self.gemini_api_key.as_deref(),
        };
        key.filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey {
                provider: self.provider.to_string(),
                env_var: self.provider.api_key_env(),
            })
    }

    /// Model id the selected provider will be asked for.
    pub fn model(&self) -> &str {
        match self.provider {
            Provider::Claude => &self.claude_model,
            Provider::Gemini => &self.gemini_model,
        }
    }
}

/// Validation and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ValidationSettings {
    /// Per-checker deadline.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub timeout_policy: TimeoutPolicy,
    pub lint_command: Vec<String>,
    pub syntax_command: Vec<String>,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_attempts: 3,
            timeout_policy: TimeoutPolicy::default(),
            lint_command: BuiltinChecker::AnsibleLint.command(),
            syntax_command: BuiltinChecker::SyntaxCheck.command(),
        }
    }
}

/// Playbook library location.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LibrarySettings {
    pub data_dir: PathBuf,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
        }
    }
}

/// Everything a Playforge process needs, loaded once and passed down.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub generator: GeneratorSettings,
    pub validation: ValidationSettings,
    pub sandbox: SandboxConfig,
    pub library: LibrarySettings,
}

impl Settings {
    /// Load defaults, then `path` (or `$PLAYFORGE_CONFIG`), then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut settings = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env_from(|key| std::env::var(key).ok())?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Overlay environment variables read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PLAYFORGE_PROVIDER") {
            self.generator.provider = v.parse()?;
        }
        if let Some(v) = lookup("ANTHROPIC_API_KEY") {
            self.generator.claude_api_key = Some(v);
        }
        if let Some(v) = lookup("GEMINI_API_KEY") {
            self.generator.gemini_api_key = Some(v);
        }
        if let Some(v) = lookup("PLAYFORGE_VALIDATION_TIMEOUT") {
            self.validation.timeout_secs = parse_env("PLAYFORGE_VALIDATION_TIMEOUT", v)?;
        }
        if let Some(v) = lookup("PLAYFORGE_MAX_ATTEMPTS") {
            self.validation.max_attempts = parse_env("PLAYFORGE_MAX_ATTEMPTS", v)?;
        }
        if let Some(v) = lookup("PLAYFORGE_SANDBOX_BACKEND") {
            self.sandbox.backend = match v.trim().to_ascii_lowercase().as_str() {
                "docker" => SandboxBackend::Docker,
                "local" => SandboxBackend::Local,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "PLAYFORGE_SANDBOX_BACKEND",
                        value: v,
                    })
                }
            };
        }
        if let Some(v) = lookup("PLAYFORGE_DOCKER_IMAGE") {
            self.sandbox.image = v;
        }
        if let Some(v) = lookup("PLAYFORGE_DATA_DIR") {
            self.library.data_dir = PathBuf::from(v);
        }
        Ok(())
    }

    /// Reject settings no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.validation.max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts(self.validation.max_attempts));
        }
        if !TEMPERATURE_RANGE.contains(&self.generator.temperature) {
            return Err(ConfigError::InvalidTemperature(self.generator.temperature));
        }
        if self.generator.max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens);
        }
        let positive = [
            ("validation.timeout_secs", self.validation.timeout_secs),
            ("generator.timeout_secs", self.generator.timeout_secs),
            ("sandbox.max_concurrent", self.sandbox.max_concurrent as u64),
            ("sandbox.max_output_bytes", self.sandbox.max_output_bytes as u64),
        ];
        if let Some(&(field, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::MustBePositive { field });
        }
        if self.sandbox.start_retries > MAX_START_RETRIES {
            return Err(ConfigError::TooLarge {
                field: "sandbox.start_retries",
                value: u64::from(self.sandbox.start_retries),
                max: u64::from(MAX_START_RETRIES),
            });
        }
        if self.validation.lint_command.is_empty() {
            return Err(ConfigError::EmptyCommand {
                field: "validation.lint_command",
            });
        }
        if self.validation.syntax_command.is_empty() {
            return Err(ConfigError::EmptyCommand {
                field: "validation.syntax_command",
            });
        }
        Ok(())
    }

    /// Credential for the selected provider.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.generator.require_api_key()
    }
}

fn parse_env<T: FromStr>(var: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { var, value })
}
