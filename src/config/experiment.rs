// Experiment definition — what to run, with which prompts, models and resources

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::constants::DEFAULT_PACING_MS;
use crate::graph::GenerationMethod;

/// Experiment topology executed by the protocol runner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    /// N chains of one seed plus K refinements
    Convergence,
    /// Step-by-step single shot vs. refinement loop, per repetition
    Comparative,
    /// Full context vs. zero context chains, per repetition
    Ablation,
    /// M independent single-step variants, then cross-variant analysis
    ConsistencyText,
    /// One document, M independent evaluations
    ConsistencyAnnotation,
    /// N plain chains
    Custom,
}

impl ProtocolType {
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::ConsistencyText | Self::ConsistencyAnnotation)
    }
}

/// Reference material that can be included in prompts and evaluations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub content: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

/// Evaluation category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSet {
    /// System instruction sent with every generation
    #[serde(default)]
    pub system_instruction: String,
    /// The task the generator works on
    pub task: String,
    /// Evaluator instructions
    #[serde(default)]
    pub evaluator: String,
    /// Extra instruction appended to refinement prompts
    #[serde(default)]
    pub refinement: String,
    /// Extra instruction for the step-by-step method
    #[serde(default)]
    pub step_by_step: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(default)]
    pub generator: String,
    #[serde(default)]
    pub evaluator: String,
    /// Annotation judge; falls back to the evaluator model
    #[serde(default)]
    pub judge: Option<String>,
    /// Cross-variant highlighter; falls back to the evaluator model
    #[serde(default)]
    pub highlighter: Option<String>,
    /// Report commentary; falls back to the generator model
    #[serde(default)]
    pub commentary: Option<String>,
}

impl ModelSelection {
    pub fn judge_model(&self) -> &str {
        self.judge.as_deref().unwrap_or(&self.evaluator)
    }

    pub fn highlighter_model(&self) -> &str {
        self.highlighter.as_deref().unwrap_or(&self.evaluator)
    }

    pub fn commentary_model(&self) -> &str {
        self.commentary.as_deref().unwrap_or(&self.generator)
    }
}

/// Which parts of the previous version feed a refinement prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackToggles {
    #[serde(default = "default_true")]
    pub include_prior_text: bool,
    #[serde(default = "default_true")]
    pub include_ai_critique: bool,
    #[serde(default = "default_true")]
    pub include_human_notes: bool,
}

impl Default for FeedbackToggles {
    fn default() -> Self {
        Self {
            include_prior_text: true,
            include_ai_critique: true,
            include_human_notes: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyOptions {
    /// Ask the judge oracle to align annotation sets
    #[serde(default)]
    pub use_judge: bool,
    /// Ask for a narrative commentary on the report
    #[serde(default)]
    pub commentary: bool,
    /// Index of the run to compare every other run against
    #[serde(default)]
    pub baseline: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default = "new_experiment_id")]
    pub id: String,
    pub name: String,
    pub protocol: ProtocolType,
    /// Refinement iterations after the seed (K)
    #[serde(default)]
    pub iterations: usize,
    /// Repetitions, chains or variants (N / M)
    #[serde(default = "default_runs")]
    pub runs: usize,
    /// Delay after every oracle call
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,
    #[serde(default)]
    pub models: ModelSelection,
    pub prompts: PromptSet,
    /// Method for seed steps; refinements always use the refine loop
    #[serde(default)]
    pub method_override: Option<GenerationMethod>,
    #[serde(default)]
    pub feedback: FeedbackToggles,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub consistency: ConsistencyOptions,
}

fn default_true() -> bool {
    true
}

fn default_runs() -> usize {
    1
}

fn default_pacing_ms() -> u64 {
    DEFAULT_PACING_MS
}

fn new_experiment_id() -> String {
    Uuid::new_v4().to_string()
}

impl ExperimentConfig {
    /// Parse an experiment definition from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).context("Failed to parse experiment definition")?;
        config.validate()?;
        Ok(config)
    }

    /// Load an experiment definition from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read experiment file: {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid experiment file: {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("Experiment name must not be empty");
        }
        if self.prompts.task.trim().is_empty() {
            bail!("prompts.task must not be empty");
        }
        let mut seen = HashSet::new();
        for category in &self.categories {
            if !seen.insert(category.id.as_str()) {
                bail!("Duplicate category id '{}'", category.id);
            }
        }
        if let Some(baseline) = self.consistency.baseline {
            if baseline >= self.runs.max(1) && self.protocol.is_consistency() {
                tracing::warn!(
                    "Baseline index {} is beyond the configured {} runs; it may be ignored",
                    baseline,
                    self.runs
                );
            }
        }
        Ok(())
    }

    /// Resources marked as enabled, in configured order.
    pub fn enabled_resources(&self) -> Vec<Resource> {
        self.resources.iter().filter(|r| r.enabled).cloned().collect()
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    /// Fill empty model selections from a provider default.
    pub fn apply_default_model(&mut self, model: &str) {
        if self.models.generator.is_empty() {
            self.models.generator = model.to_string();
        }
        if self.models.evaluator.is_empty() {
            self.models.evaluator = model.to_string();
        }
    }
}
