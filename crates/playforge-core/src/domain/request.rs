//! Generator request/response pair.

use serde::{Deserialize, Serialize};

use super::error::ConfigError;

/// Temperatures accepted by every supported provider.
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=2.0;

/// One call to the text generator. Built fresh per attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    description: String,
    system_prompt: String,
    max_tokens: u32,
    temperature: f64,
}

impl GenerationRequest {
    pub fn new(
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        max_tokens: u32,
        temperature: f64,
    ) -> Result<Self, ConfigError> {
        if max_tokens == 0 {
            return Err(ConfigError::InvalidMaxTokens);
        }
        if !TEMPERATURE_RANGE.contains(&temperature) {
            return Err(ConfigError::InvalidTemperature(temperature));
        }
        Ok(Self {
            description: description.into(),
            system_prompt: system_prompt.into(),
            max_tokens,
            temperature,
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

/// What the generator produced for one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub content: String,
    pub model_id: String,
    pub token_count: Option<u64>,
}
