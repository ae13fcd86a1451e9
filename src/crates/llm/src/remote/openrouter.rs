//! OpenRouter client.
//!
//! OpenRouter exposes an OpenAI-compatible surface and routes to many
//! underlying providers; it is the default when the API key shape does not
//! identify a specific provider.

use crate::config::ProviderConfig;
use crate::error::{LlmError, Result};
use crate::{ChatClient, ChatRequest, Provider, Role};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenRouter API client.
#[derive(Clone)]
pub struct OpenRouterClient {
    config: ProviderConfig,
    client: Client,
    app_name: Option<String>,
}

impl OpenRouterClient {
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self {
            config,
            client,
            app_name: None,
        }
    }

    /// Set the application name sent in OpenRouter's tracking headers.
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = Some(app_name.into());
        self
    }
}

#[async_trait]
impl ChatClient for OpenRouterClient {
    async fn chat(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(OpenRouterMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        for m in &request.messages {
            messages.push(OpenRouterMessage {
                role: match m.role {
                    Role::User => "user".to_string(),
                    Role::Assistant => "assistant".to_string(),
                },
                content: m.content.clone(),
            });
        }

        let body = OpenRouterRequest {
            model: self.config.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            stream: false,
        };

        let mut req = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body);
        if let Some(app_name) = &self.app_name {
            req = req.header("HTTP-Referer", app_name).header("X-Title", app_name);
        }

        let response = req.send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Provider { status, body });
        }

        let parsed: OpenRouterResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let text = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;

        tracing::debug!(model = %self.config.model, chars = text.len(), "openrouter reply");
        Ok(text)
    }

    fn provider(&self) -> Provider {
        Provider::OpenRouter
    }
}

#[derive(Debug, Serialize)]
struct OpenRouterRequest {
    model: String,
    messages: Vec<OpenRouterMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<usize>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenRouterMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenRouterResponse {
    choices: Vec<OpenRouterChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenRouterChoice {
    message: OpenRouterMessage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_content_extraction_shape() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hi there"}}]}"#;
        let parsed: OpenRouterResponse = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.choices[0].message.content, "Hi there");
    }

    #[test]
    fn test_client_creation() {
        let config = ProviderConfig::resolve("sk-or-v1-test", None, None).unwrap();
        let client = OpenRouterClient::new(config).with_app_name("graphbridge");
        assert_eq!(client.provider(), Provider::OpenRouter);
        assert!(client.app_name.is_some());
    }
}
