// Multi-provider LLM support
//
// An abstraction layer over the chat APIs that back the oracle, so an
// experiment can run against whichever provider is configured.

use anyhow::Result;
use async_trait::async_trait;

pub mod types;

pub mod claude;
pub mod openai;

pub mod factory;

pub use factory::create_provider;
pub use types::{Message, ProviderRequest, ProviderResponse};

/// Trait for LLM providers
///
/// Calls are single-shot: providers never retry, so a failure surfaces to
/// the caller exactly once.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a message and wait for the complete response
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse>;

    /// Get the provider name (e.g., "claude", "openai")
    fn name(&self) -> &str;

    /// Get the default model for this provider
    fn default_model(&self) -> &str;
}
