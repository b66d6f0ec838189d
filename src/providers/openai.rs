// OpenAI-compatible chat completions backend
//
// Also used for self-hosted endpoints that mimic the OpenAI wire format;
// point `base_url` at them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{ProviderRequest, ProviderResponse};
use super::LlmProvider;
use crate::usage::TokenUsage;

const OPENAI_BASE_URL: &str = "https://api.openai.com";
const OPENAI_DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Clone)]
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: String,
}

impl OpenAIProvider {
    /// Provider for api.openai.com. `timeout` bounds each whole request.
    pub fn new_openai(api_key: String, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build().context("Failed to create HTTP client")?,
            api_key,
            base_url: OPENAI_BASE_URL.to_string(),
            default_model: OPENAI_DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Point at a compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn chat_body(&self, request: &ProviderRequest) -> ChatBody {
        let model = match request.model.as_str() {
            "" => self.default_model.clone(),
            m => m.to_string(),
        };

        // The system instruction travels as the first message
        let system = request.system.iter().map(|s| ChatMessage {
            role: "system".to_string(),
            content: s.clone(),
        });
        let turns = request.messages.iter().map(|m| ChatMessage {
            role: m.role.clone(),
            content: m.content.clone(),
        });

        ChatBody {
            model,
            messages: system.chain(turns).collect(),
            max_tokens: Some(request.max_tokens),
            temperature: request.temperature,
        }
    }

    fn into_provider_response(reply: ChatReply) -> Result<ProviderResponse> {
        let usage = reply
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens, u.total_tokens));
        let choice = reply
            .choices
            .into_iter()
            .next()
            .context("Chat completion contained no choices")?;

        Ok(ProviderResponse {
            id: reply.id,
            model: reply.model,
            text: choice.message.content.unwrap_or_default(),
            stop_reason: choice.finish_reason,
            provider: "openai".to_string(),
            usage,
        })
    }
}

#[async_trait]
impl LlmProvider for OpenAIProvider {
    async fn send_message(&self, request: &ProviderRequest) -> Result<ProviderResponse> {
        let body = self.chat_body(request);
        let url = format!("{}/v1/chat/completions", self.base_url);
        tracing::debug!(model = %body.model, messages = body.messages.len(), "POST {url}");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to reach {url}"))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat completion request returned {status}: {detail}");
        }

        let reply: ChatReply = response
            .json()
            .await
            .context("Failed to decode chat completion")?;
        Self::into_provider_response(reply)
    }

    fn name(&self) -> &str {
        "openai"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }
}

// ── Wire format ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
}
