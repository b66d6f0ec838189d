// Token usage accounting — per-call usage folded into per-step and per-run totals

use serde::{Deserialize, Serialize};

/// Token usage statistics reported by a single oracle call (or an aggregate of several)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, output_tokens: u64, total_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            output_tokens,
            total_tokens,
        }
    }

    /// Build from prompt/output counts when the provider omits a total.
    pub fn from_counts(prompt_tokens: u64, output_tokens: u64) -> Self {
        Self::new(prompt_tokens, output_tokens, prompt_tokens + output_tokens)
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_tokens == 0 && self.output_tokens == 0 && self.total_tokens == 0
    }

    /// Add another record into this one (saturating).
    pub fn absorb(&mut self, other: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(other.prompt_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
        self.total_tokens = self.total_tokens.saturating_add(other.total_tokens);
    }
}

/// Aggregates the usage of several oracle calls.
///
/// Calls that did not report usage contribute nothing; `contributors()` tells
/// how many calls actually reported.
#[derive(Debug, Clone, Default)]
pub struct TokenAccumulator {
    total: TokenUsage,
    contributors: usize,
}

impl TokenAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one call's usage, if it reported any.
    pub fn record(&mut self, usage: Option<&TokenUsage>) {
        if let Some(usage) = usage {
            self.total.absorb(usage);
            self.contributors += 1;
        }
    }

    pub fn contributors(&self) -> usize {
        self.contributors
    }

    pub fn total(&self) -> TokenUsage {
        self.total
    }
}
