// Project-wide constants
//
// Centralised here so defaults and thresholds have one source of truth.
// Import via `use crate::config::constants::*;`.

/// Directory under $HOME holding `config.toml`.
pub const CONFIG_DIR_NAME: &str = ".draftbench";

/// Default delay after every oracle call, in milliseconds.
pub const DEFAULT_PACING_MS: u64 = 1500;

/// Default maximum tokens per oracle request.
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Consistency protocols compare at least this many variants.
pub const MIN_CONSISTENCY_VARIANTS: usize = 2;
