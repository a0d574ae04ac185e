//! `Playforge`: the two operations callers actually use.
//!
//! Wires settings, generator, sandbox and system prompt together once so
//! front ends only deal with descriptions, artifacts and results.

use std::sync::Arc;

use playforge_sandbox::{build_sandbox, SandboxRunner};

use crate::domain::{
    ConfigError, GenerationResult, OrchestratorError, ValidationError, ValidationVerdict,
};
use crate::generator::{build_generator, Generator};
use crate::orchestrator::{Orchestrator, OrchestratorOptions};
use crate::prompts::load_system_prompt;
use crate::settings::Settings;
use crate::validation::ValidationEngine;

/// Validation engine configured from `settings` on the configured sandbox.
pub fn build_validation_engine(settings: &Settings) -> ValidationEngine {
    validation_engine_on(build_sandbox(&settings.sandbox), settings)
}

fn validation_engine_on(sandbox: Arc<dyn SandboxRunner>, settings: &Settings) -> ValidationEngine {
    ValidationEngine::new(sandbox)
        .with_timeout_policy(settings.validation.timeout_policy)
        .with_commands(
            settings.validation.lint_command.clone(),
            settings.validation.syntax_command.clone(),
        )
}

pub struct Playforge {
    engine: Arc<ValidationEngine>,
    orchestrator: Orchestrator,
    settings: Settings,
}

impl Playforge {
    /// Build everything from settings: provider client, sandbox, system prompt.
    pub fn from_settings(settings: Settings) -> Result<Self, ConfigError> {
        settings.validate()?;
        let generator = build_generator(&settings.generator)?;
        let sandbox = build_sandbox(&settings.sandbox);
        let system_prompt = load_system_prompt(settings.generator.system_prompt_path.as_deref())?;
        Self::new(generator, sandbox, system_prompt, settings)
    }

    /// Assemble from explicit parts (tests, embedding).
    pub fn new(
        generator: Arc<dyn Generator>,
        sandbox: Arc<dyn SandboxRunner>,
        system_prompt: impl Into<String>,
        settings: Settings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let engine = Arc::new(validation_engine_on(sandbox, &settings));
        let orchestrator = Orchestrator::new(
            generator,
            engine.clone(),
            system_prompt,
            OrchestratorOptions::from_settings(&settings),
        );
        Ok(Self {
            engine,
            orchestrator,
            settings,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Generate and validate with the configured attempt budget.
    pub async fn generate(&self, description: &str) -> Result<GenerationResult, OrchestratorError> {
        self.generate_with(description, self.settings.validation.max_attempts)
            .await
    }

    pub async fn generate_with(
        &self,
        description: &str,
        max_attempts: u32,
    ) -> Result<GenerationResult, OrchestratorError> {
        self.orchestrator.orchestrate(description, max_attempts).await
    }

    /// Validate an artifact without generating anything.
    pub async fn validate(&self, artifact: &str) -> Result<ValidationVerdict, ValidationError> {
        self.engine
            .validate(artifact, self.settings.validation.timeout_secs)
            .await
    }
}
