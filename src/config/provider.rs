// Provider entry — which HTTP oracle backend to talk to

use serde::{Deserialize, Serialize};

/// A single provider entry.
///
/// Serializes with a `type` tag, e.g.:
/// ```toml
/// [[providers]]
/// type = "openai"
/// api_key = "sk-..."
/// base_url = "http://localhost:11434"   # any OpenAI-compatible endpoint
///
/// [[providers]]
/// type = "claude"
/// api_key = "sk-ant-..."
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProviderEntry {
    Claude {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
    Openai {
        api_key: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        base_url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
    },
}

impl ProviderEntry {
    /// Human-readable name for logs.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Claude { name, .. } => name.as_deref().unwrap_or("Claude"),
            Self::Openai { name, .. } => name.as_deref().unwrap_or("OpenAI"),
        }
    }

    /// Short provider-type tag ("claude" or "openai").
    pub fn provider_type(&self) -> &'static str {
        match self {
            Self::Claude { .. } => "claude",
            Self::Openai { .. } => "openai",
        }
    }

    pub fn api_key(&self) -> &str {
        match self {
            Self::Claude { api_key, .. } | Self::Openai { api_key, .. } => api_key,
        }
    }

    /// Default model used when an experiment leaves a model selection empty.
    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Claude { model, .. } | Self::Openai { model, .. } => model.as_deref(),
        }
    }

    pub fn base_url(&self) -> Option<&str> {
        match self {
            Self::Claude { base_url, .. } | Self::Openai { base_url, .. } => base_url.as_deref(),
        }
    }
}
