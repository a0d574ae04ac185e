//! Text generator seam and its hosted backends.
//!
//! The orchestrator only sees [`Generator`]; which provider sits behind it is
//! decided once by [`build_generator`].

pub mod claude;
pub mod gemini;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{ConfigError, GenerationRequest, GenerationResponse, GeneratorError};
use crate::settings::{GeneratorSettings, Provider};

pub use claude::{ClaudeGenerator, DEFAULT_CLAUDE_BASE_URL, DEFAULT_CLAUDE_MODEL};
pub use gemini::{GeminiGenerator, DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};

/// Provider error bodies are cut to this many characters.
const MAX_ERROR_BODY_CHARS: usize = 2000;

#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError>;

    /// Model id requests are sent to.
    fn model_id(&self) -> &str;
}

/// Build the generator for the configured provider.
pub fn build_generator(settings: &GeneratorSettings) -> Result<Arc<dyn Generator>, ConfigError> {
    let api_key = settings.require_api_key()?.to_string();
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

    let generator: Arc<dyn Generator> = match settings.provider {
        Provider::Claude => Arc::new(ClaudeGenerator::new(
            client,
            api_key,
            &settings.claude_model,
            &settings.claude_base_url,
            settings.timeout_secs,
        )),
        Provider::Gemini => Arc::new(GeminiGenerator::new(
            client,
            api_key,
            &settings.gemini_model,
            &settings.gemini_base_url,
            settings.timeout_secs,
        )),
    };
    Ok(generator)
}

/// Map a send failure, keeping client-side timeouts distinct.
pub(crate) fn send_error(err: reqwest::Error, timeout_secs: u64) -> GeneratorError {
    if err.is_timeout() {
        GeneratorError::Timeout(timeout_secs)
    } else {
        GeneratorError::from(err)
    }
}

/// Turn a non-2xx response into a provider error.
pub(crate) async fn provider_error(response: reqwest::Response) -> GeneratorError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    GeneratorError::Provider {
        status,
        body: truncate(&body, MAX_ERROR_BODY_CHARS),
    }
}

fn truncate(value: &str, max_chars: usize) -> String {
    let mut chars = value.chars();
    let kept: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{kept}...")
    } else {
        kept
    }
}
