//! Anthropic messages-API client.
//!
//! Anthropic keeps the system prompt out of the message list and returns
//! content as a list of typed blocks; the text blocks are joined into the
//! reply.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use crate::{ChatClient, ChatRequest, Provider, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Max tokens sent when the request does not specify one; the messages API
/// requires the field.
const DEFAULT_MAX_TOKENS: usize = 1024;

/// Anthropic API client.
#[derive(Clone)]
pub struct AnthropicClient {
    config: ProviderConfig,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { config, client }
    }
}

#[async_trait]
impl ChatClient for AnthropicClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/v1/messages", self.config.base_url);

        let messages: Vec<AnthropicMessage> = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: match m.role {
                    Role::User => "user",
                    Role::Assistant => "assistant",
                },
                content: m.content.clone(),
            })
            .collect();

        let body = AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.clone(),
            messages,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        let parsed: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .content
            .iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        tracing::debug!(model = %self.config.model, chars = text.len(), "anthropic reply");
        Ok(text)
    }

    fn provider(&self) -> Provider {
        Provider::Anthropic
    }
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_extraction_shape() {
        let json = r#"{"content":[{"type":"text","text":"Hello"},{"type":"text","text":" world"}]}"#;
        let parsed: AnthropicResponse = serde_json::from_str(json).unwrap();
        let text: String = parsed
            .content
            .iter()
            .filter(|b| b.block_type == "text")
            .filter_map(|b| b.text.as_deref())
            .collect();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn test_client_creation() {
        let config = ProviderConfig::resolve("sk-ant-test", None, None).unwrap();
        let client = AnthropicClient::new(config);
        assert_eq!(client.provider(), Provider::Anthropic);
    }
}
