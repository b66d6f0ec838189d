// Configuration structs

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::constants::DEFAULT_MAX_TOKENS;
use super::provider::ProviderEntry;

/// Request options shared by every oracle call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleSettings {
    /// Maximum tokens to generate per call
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Transport timeout in seconds. Unset means calls wait indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: None,
            request_timeout_secs: None,
        }
    }
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Providers in priority order; the first one serves every oracle role
    pub providers: Vec<ProviderEntry>,

    /// Per-request options
    pub oracle: OracleSettings,
}

impl Config {
    pub fn with_providers(providers: Vec<ProviderEntry>) -> Self {
        Self {
            providers,
            oracle: OracleSettings::default(),
        }
    }

    /// The provider that backs the oracle.
    pub fn active_provider(&self) -> Option<&ProviderEntry> {
        self.providers.first()
    }

    /// Validate configuration and return helpful errors
    pub fn validate(&self) -> Result<()> {
        if self.providers.is_empty() {
            bail!("No providers configured. Add a [[providers]] entry to config.toml.");
        }
        for entry in &self.providers {
            if entry.api_key().trim().is_empty() {
                bail!("Provider '{}' has an empty api_key", entry.display_name());
            }
        }
        if self.oracle.max_tokens == 0 {
            bail!("oracle.max_tokens must be greater than zero");
        }
        if let Some(t) = self.oracle.temperature {
            if !(0.0..=2.0).contains(&t) {
                bail!("oracle.temperature must be between 0.0 and 2.0 (got {t})");
            }
        }
        Ok(())
    }
}
