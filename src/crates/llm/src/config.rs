//! Provider selection and call configuration.

use crate::error::{LlmError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

const ANTHROPIC_DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const OPENROUTER_DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

fn default_timeout() -> Duration {
    Duration::from_secs(12)
}

/// Supported provider wire shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Anthropic,
    OpenRouter,
}

impl Provider {
    /// Parse an explicit provider name from request config.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "anthropic" | "claude" => Some(Provider::Anthropic),
            "openrouter" => Some(Provider::OpenRouter),
            _ => None,
        }
    }

    /// Infer the provider from the API key shape. Anthropic keys start with
    /// `sk-ant-` (or the legacy `claude-` shape); everything else routes
    /// through OpenRouter.
    pub fn infer_from_key(api_key: &str) -> Self {
        if api_key.starts_with("sk-ant-") || api_key.starts_with("claude-") {
            Provider::Anthropic
        } else {
            Provider::OpenRouter
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => ANTHROPIC_BASE_URL,
            Provider::OpenRouter => OPENROUTER_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Anthropic => ANTHROPIC_DEFAULT_MODEL,
            Provider::OpenRouter => OPENROUTER_DEFAULT_MODEL,
        }
    }
}

/// Configuration for one provider-bound client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: Provider,
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_timeout")]
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Build a config from the pieces a chat request carries: the bearer
    /// key, an optional explicit provider name, and an optional model
    /// override. Explicit provider wins; otherwise the key shape decides.
    pub fn resolve(
        api_key: &str,
        explicit_provider: Option<&str>,
        model: Option<&str>,
    ) -> Result<Self> {
        if api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        let provider = explicit_provider
            .and_then(Provider::from_name)
            .unwrap_or_else(|| Provider::infer_from_key(api_key));
        Ok(Self {
            provider,
            api_key: api_key.to_string(),
            base_url: provider.default_base_url().to_string(),
            model: model
                .filter(|m| !m.is_empty())
                .unwrap_or(provider.default_model())
                .to_string(),
            timeout: default_timeout(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
