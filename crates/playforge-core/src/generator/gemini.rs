//! Google Generative Language `generateContent` backend.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::{provider_error, send_error, Generator};
use crate::domain::{GenerationRequest, GenerationResponse, GeneratorError};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash-001";

pub struct GeminiGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

impl GeminiGenerator {
    pub fn new(
        client: Client,
        api_key: impl Into<String>,
        model: &str,
        base_url: &str,
        timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_secs,
        }
    }

    fn generate_url(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// System and user prompts travel as one text part.
fn combined_prompt(request: &GenerationRequest) -> String {
    format!(
        "{}\n\nUser: {}",
        request.system_prompt(),
        request.description()
    )
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [{ "text": combined_prompt(request) }]
                }
            ],
            "generationConfig": {
                "maxOutputTokens": request.max_tokens(),
                "temperature": request.temperature(),
            },
        });

        let response = self
            .client
            .post(self.generate_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;

        let content = body["candidates"]
            .as_array()
            .and_then(|candidates| candidates.first())
            .and_then(|candidate| candidate["content"]["parts"].as_array())
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(|part| part["text"].as_str())
                    .collect::<Vec<_>>()
                    .join("")
            })
            .filter(|text| !text.trim().is_empty())
            .ok_or(GeneratorError::EmptyResponse)?;

        let token_count = body["usageMetadata"]["totalTokenCount"].as_u64();
        let model_id = body["modelVersion"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| self.model.clone());

        Ok(GenerationResponse {
            content,
            model_id,
            token_count,
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
