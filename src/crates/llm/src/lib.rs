//! LLM provider adapters for the graphbridge intent router.
//!
//! The LLM is an external collaborator with two known wire shapes: the
//! Anthropic messages API (`content[0].text`) and the OpenAI-compatible
//! shape OpenRouter exposes (`choices[0].message.content`). This crate wraps
//! both behind the [`ChatClient`] trait so the router (and tests) never see
//! provider details.

pub mod config;
pub mod error;
pub mod remote;

pub use config::{Provider, ProviderConfig};
pub use error::{LlmError, Result};
pub use remote::{AnthropicClient, OpenRouterClient};

use async_trait::async_trait;
use std::sync::Arc;

/// Role of one chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// One message in a chat request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A single chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt, sent the provider-appropriate way.
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature.clamp(0.0, 1.0));
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Object-safe chat completion client.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Run one chat completion and return the assistant text. Non-2xx
    /// provider responses surface as [`LlmError::Provider`] with the
    /// upstream status and body preserved.
    async fn chat(&self, request: ChatRequest) -> Result<String>;

    /// The provider this client talks to.
    fn provider(&self) -> Provider;
}

/// Build the client matching a resolved configuration.
pub fn client_for(config: ProviderConfig) -> Arc<dyn ChatClient> {
    match config.provider {
        Provider::Anthropic => Arc::new(AnthropicClient::new(config)),
        Provider::OpenRouter => Arc::new(OpenRouterClient::new(config)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_for_dispatches_on_provider() {
        let config = ProviderConfig::resolve("sk-ant-abc", None, None).unwrap();
        assert_eq!(client_for(config).provider(), Provider::Anthropic);

        let config = ProviderConfig::resolve("sk-or-v1-abc", None, None).unwrap();
        assert_eq!(client_for(config).provider(), Provider::OpenRouter);
    }

    #[test]
    fn test_temperature_clamped() {
        let req = ChatRequest::new(vec![ChatMessage::user("hi")]).with_temperature(3.0);
        assert_eq!(req.temperature, Some(1.0));
    }
}
