//! The generate-validate-retry state machine.
//!
//! ```text
//! Attempting(n) --valid--------------> Succeeded
//!               --invalid, n < max---> Retrying(n + 1) --> Attempting(n + 1)
//!               --invalid, n == max--> Exhausted
//! ```
//!
//! Generator and sandbox failures leave the machine immediately; only
//! checker findings are retried.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::Instrument;

use crate::domain::{
    artifact_digest, AttemptRecord, ConfigError, FailureKind, GenerationRequest,
    GenerationResponse, GenerationResult, GeneratorError, OrchestratorError, ValidationVerdict,
};
use crate::generator::Generator;
use crate::obs;
use crate::settings::Settings;
use crate::validation::ValidationEngine;

/// Header introducing the previous attempt's errors in a retry description.
pub const FEEDBACK_HEADER: &str = "Previous attempt had validation errors:";

const REMEDIATION_CHECKLIST: &str = "Please fix these issues and ensure:\n\
- All modules use FQCN (kubernetes.core.k8s not k8s)\n\
- No kubectl commands are used\n\
- YAML syntax is correct\n\
- All required fields are present";

/// Where the retry loop stands.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptState {
    Attempting(u32),
    Retrying { next: u32, errors: Vec<String> },
    Succeeded {
        attempt: u32,
        response: GenerationResponse,
        verdict: ValidationVerdict,
    },
    Exhausted {
        attempt: u32,
        verdict: ValidationVerdict,
    },
}

/// Transition out of `Attempting(attempt)` once a verdict is in.
pub fn next_state(
    attempt: u32,
    max_attempts: u32,
    response: GenerationResponse,
    verdict: ValidationVerdict,
) -> AttemptState {
    if verdict.is_valid() {
        AttemptState::Succeeded {
            attempt,
            response,
            verdict,
        }
    } else if attempt < max_attempts {
        AttemptState::Retrying {
            next: attempt + 1,
            errors: verdict.errors().to_vec(),
        }
    } else {
        AttemptState::Exhausted { attempt, verdict }
    }
}

/// Description for the next attempt: the original request plus the latest
/// errors and the remediation checklist. Earlier feedback is not carried.
pub fn compose_feedback(original: &str, errors: &[String]) -> String {
    format!(
        "{original}\n\n{FEEDBACK_HEADER}\n{}\n\n{REMEDIATION_CHECKLIST}",
        errors.join("\n")
    )
}

/// Remove one Markdown code fence wrapping the whole text, if present.
///
/// Models often answer with ```` ```yaml ... ``` ```` despite instructions.
/// Anything else (no fence, several fences, prose around the fence) is
/// returned unchanged.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let Some(inner) = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
    else {
        return text.to_string();
    };
    let Some((info, body)) = inner.split_once('\n') else {
        return text.to_string();
    };
    if info.contains(char::is_whitespace) || body.contains("```") {
        return text.to_string();
    }
    let body = body.trim_end();
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

/// Generation and validation parameters fixed for the life of an orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorOptions {
    pub max_tokens: u32,
    pub temperature: f64,
    pub generation_timeout_secs: u64,
    pub validation_timeout_secs: u64,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl OrchestratorOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            max_tokens: settings.generator.max_tokens,
            temperature: settings.generator.temperature,
            generation_timeout_secs: settings.generator.timeout_secs,
            validation_timeout_secs: settings.validation.timeout_secs,
        }
    }
}

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    engine: Arc<ValidationEngine>,
    system_prompt: String,
    options: OrchestratorOptions,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        engine: Arc<ValidationEngine>,
        system_prompt: impl Into<String>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            generator,
            engine,
            system_prompt: system_prompt.into(),
            options,
        }
    }

    /// Generate until an artifact validates or `max_attempts` are used up.
    ///
    /// Dropping the returned future cancels in-flight checker runs and removes
    /// their transient files.
    pub async fn orchestrate(
        &self,
        description: &str,
        max_attempts: u32,
    ) -> Result<GenerationResult, OrchestratorError> {
        if max_attempts < 1 {
            return Err(ConfigError::InvalidMaxAttempts(max_attempts).into());
        }
        if self.options.generation_timeout_secs == 0 {
            return Err(ConfigError::MustBePositive {
                field: "generator.timeout_secs",
            }
            .into());
        }
        // Surfaces bad token/temperature settings before the generator is called.
        GenerationRequest::new(
            description,
            self.system_prompt.as_str(),
            self.options.max_tokens,
            self.options.temperature,
        )?;

        let run_id = uuid::Uuid::new_v4().to_string();
        let result = self
            .run(description, max_attempts)
            .instrument(obs::run_span(&run_id))
            .await?;
        Ok(result)
    }

    async fn run(
        &self,
        original: &str,
        max_attempts: u32,
    ) -> Result<GenerationResult, OrchestratorError> {
        let started = Instant::now();
        obs::emit_orchestration_started(
            max_attempts,
            self.engine.sandbox().backend_name(),
            self.generator.model_id(),
        );

        let mut history = Vec::new();
        let mut description = original.to_string();
        let mut state = AttemptState::Attempting(1);

        let result = loop {
            state = match state {
                AttemptState::Attempting(attempt) => {
                    match self.attempt(attempt, &description, &mut history).await? {
                        Ok((response, verdict)) => {
                            next_state(attempt, max_attempts, response, verdict)
                        }
                        Err(failed) => break failed,
                    }
                }
                AttemptState::Retrying { next, errors } => {
                    description = compose_feedback(original, &errors);
                    AttemptState::Attempting(next)
                }
                AttemptState::Succeeded {
                    attempt,
                    response,
                    verdict,
                } => break GenerationResult::succeeded(response, verdict, attempt, history),
                AttemptState::Exhausted { attempt, verdict } => {
                    break GenerationResult::failed(
                        FailureKind::Exhausted,
                        format!("exhausted {attempt} attempts"),
                        Some(verdict),
                        attempt,
                        history,
                    )
                }
            };
        };

        obs::emit_orchestration_finished(
            result.success,
            result.attempts,
            result.failure_kind,
            started.elapsed().as_millis() as u64,
        );
        Ok(result)
    }

    /// One generate-validate cycle. The inner `Err` is a terminal result.
    async fn attempt(
        &self,
        attempt: u32,
        description: &str,
        history: &mut Vec<AttemptRecord>,
    ) -> Result<Result<(GenerationResponse, ValidationVerdict), GenerationResult>, OrchestratorError>
    {
        let started = Instant::now();
        obs::emit_attempt_started(attempt, description.chars().count());

        let request = GenerationRequest::new(
            description,
            self.system_prompt.as_str(),
            self.options.max_tokens,
            self.options.temperature,
        )?;

        let deadline = Duration::from_secs(self.options.generation_timeout_secs);
        let generated = match tokio::time::timeout(deadline, self.generator.generate(&request)).await
        {
            Ok(generated) => generated,
            Err(_) => Err(GeneratorError::Timeout(self.options.generation_timeout_secs)),
        };
        let response = match generated {
            Ok(response) => response,
            Err(e) => {
                obs::emit_attempt_aborted(attempt, FailureKind::Generator, &e);
                history.push(record(attempt, None, 0, started));
                return Ok(Err(GenerationResult::failed(
                    FailureKind::Generator,
                    format!("generation failed: {e}"),
                    None,
                    attempt,
                    std::mem::take(history),
                )));
            }
        };
        let response = GenerationResponse {
            content: strip_code_fence(&response.content),
            ..response
        };

        let verdict = match self
            .engine
            .validate(&response.content, self.options.validation_timeout_secs)
            .await
        {
            Ok(verdict) => verdict,
            Err(e) => {
                obs::emit_attempt_aborted(attempt, FailureKind::Infrastructure, &e);
                history.push(record(attempt, Some(response.content.as_str()), 0, started));
                return Ok(Err(GenerationResult::failed(
                    FailureKind::Infrastructure,
                    e.to_string(),
                    None,
                    attempt,
                    std::mem::take(history),
                )));
            }
        };

        let entry = record(
            attempt,
            Some(response.content.as_str()),
            verdict.errors().len(),
            started,
        );
        obs::emit_attempt_validated(
            attempt,
            verdict.is_valid(),
            entry.error_count,
            entry.duration_ms,
        );
        history.push(entry);
        Ok(Ok((response, verdict)))
    }
}

fn record(
    attempt: u32,
    artifact: Option<&str>,
    error_count: usize,
    started: Instant,
) -> AttemptRecord {
    AttemptRecord {
        attempt,
        artifact_digest: artifact.map(artifact_digest),
        error_count,
        duration_ms: started.elapsed().as_millis() as u64,
    }
}
