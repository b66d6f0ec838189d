// Configuration loader
// Loads provider settings from ~/.draftbench/config.toml, an explicit path,
// or environment variables

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::constants::CONFIG_DIR_NAME;
use super::provider::ProviderEntry;
use super::settings::{Config, OracleSettings};

#[derive(Deserialize)]
struct TomlConfig {
    #[serde(default)]
    providers: Vec<ProviderEntry>,
    #[serde(default)]
    oracle: OracleSettings,
}

/// Load configuration.
///
/// An explicit path must exist. Without one, `~/.draftbench/config.toml` is
/// tried first, then `OPENAI_API_KEY` and `ANTHROPIC_API_KEY`.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    if let Some(path) = explicit {
        return load_from_file(path);
    }

    if let Some(path) = default_config_path() {
        if path.exists() {
            return load_from_file(&path);
        }
    }

    if let Some(config) = from_env() {
        return Ok(config);
    }

    bail!(
        "No configuration found.\n\n\
        Create ~/{CONFIG_DIR_NAME}/config.toml with at least one provider:\n\n\
        [[providers]]\n\
        type = \"openai\"\n\
        api_key = \"sk-...\"\n\n\
        Alternatively, set OPENAI_API_KEY or ANTHROPIC_API_KEY."
    );
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(CONFIG_DIR_NAME).join("config.toml"))
}

/// Parse and validate a config file.
pub fn load_from_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file: {}", path.display()))?;
    parse_config(&contents)
        .with_context(|| format!("Invalid configuration file: {}", path.display()))
}

fn parse_config(contents: &str) -> Result<Config> {
    let toml_config: TomlConfig =
        toml::from_str(contents).context("Failed to parse configuration TOML")?;

    let config = Config {
        providers: toml_config.providers,
        oracle: toml_config.oracle,
    };

    config
        .validate()
        .context("Configuration validation failed")?;

    Ok(config)
}

fn from_env() -> Option<Config> {
    let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    if let Some(api_key) = non_empty("OPENAI_API_KEY") {
        return Some(Config::with_providers(vec![ProviderEntry::Openai {
            api_key,
            model: None,
            base_url: non_empty("OPENAI_BASE_URL"),
            name: Some("OpenAI (Environment)".to_string()),
        }]));
    }

    non_empty("ANTHROPIC_API_KEY").map(|api_key| {
        Config::with_providers(vec![ProviderEntry::Claude {
            api_key,
            model: None,
            base_url: None,
            name: Some("Claude (Environment)".to_string()),
        }])
    })
}
