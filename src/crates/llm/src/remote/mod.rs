//! Remote provider clients.

mod anthropic;
mod openrouter;

pub use anthropic::AnthropicClient;
pub use openrouter::OpenRouterClient;
