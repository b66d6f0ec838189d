// Provider factory
//
// Creates an LLM provider from a configured provider entry

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::claude::ClaudeProvider;
use super::openai::OpenAIProvider;
use super::LlmProvider;
use crate::config::{OracleSettings, ProviderEntry};

/// Create an `LlmProvider` from a `ProviderEntry`.
pub fn create_provider(
    entry: &ProviderEntry,
    settings: &OracleSettings,
) -> Result<Arc<dyn LlmProvider>> {
    let timeout = settings.request_timeout_secs.map(Duration::from_secs);

    match entry {
        ProviderEntry::Claude {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut provider = ClaudeProvider::new(api_key.clone(), timeout)?;
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider))
        }

        ProviderEntry::Openai {
            api_key,
            model,
            base_url,
            ..
        } => {
            let mut provider = OpenAIProvider::new_openai(api_key.clone(), timeout)?;
            if let Some(m) = model {
                provider = provider.with_model(m.clone());
            }
            if let Some(url) = base_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider))
        }
    }
}
