// Configuration module
// Public interface for provider settings and experiment definitions

pub mod constants;
mod experiment;
mod loader;
mod provider;
mod settings;

pub use experiment::{
    Category, ConsistencyOptions, ExperimentConfig, FeedbackToggles, ModelSelection, PromptSet,
    ProtocolType, Resource,
};
pub use loader::{default_config_path, load_config, load_from_file};
pub use provider::ProviderEntry;
pub use settings::{Config, OracleSettings};
