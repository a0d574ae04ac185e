//! Anthropic Messages API backend.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{provider_error, send_error, Generator};
use crate::domain::{GenerationRequest, GenerationResponse, GeneratorError};

pub const DEFAULT_CLAUDE_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_CLAUDE_MODEL: &str = "claude-sonnet-4-5-20250929";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct ClaudeGenerator {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout_secs: u64,
}

impl ClaudeGenerator {
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

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    model: Option<String>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[async_trait]
impl Generator for ClaudeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let payload = json!({
            "model": self.model,
            "max_tokens": request.max_tokens(),
            "temperature": request.temperature(),
            "system": request.system_prompt(),
            "messages": [
                {
                    "role": "user",
                    "content": request.description(),
                }
            ],
        });

        let response = self
            .client
            .post(self.messages_url())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&payload)
            .send()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|e| send_error(e, self.timeout_secs))?;

        // First text block only; tool-use and thinking blocks are skipped.
        let content = body
            .content
            .into_iter()
            .find(|block| block.kind == "text")
            .and_then(|block| block.text)
            .filter(|text| !text.trim().is_empty())
            .ok_or(GeneratorError::EmptyResponse)?;

        Ok(GenerationResponse {
            content,
            model_id: body.model.unwrap_or_else(|| self.model.clone()),
            token_count: body.usage.map(|u| u.input_tokens + u.output_tokens),
        })
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
