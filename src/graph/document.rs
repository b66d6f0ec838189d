// Document nodes and annotations stored in the version graph

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::diff::DiffStats;
use crate::usage::TokenUsage;

/// Rater id reserved for automated scores
pub const AI_RATER: &str = "AI";

/// category id → rater id → score (0–100)
pub type ScoreMap = BTreeMap<String, BTreeMap<String, u8>>;

/// How a document version was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMethod {
    Standard,
    StepByStep,
    RefineLoop,
}

impl GenerationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::StepByStep => "step_by_step",
            Self::RefineLoop => "refine_loop",
        }
    }
}

/// One segment of a step-segmented generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub thought: String,
    pub text: String,
}

/// Prompts and models as they were when the node was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSnapshot {
    pub system_instruction: String,
    pub full_prompt: String,
    pub evaluator_prompt: String,
    pub generator_model: String,
    pub evaluator_model: String,
}

/// Which protocol run a node belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolLink {
    pub experiment_id: String,
    pub run_id: String,
    pub run_label: String,
    pub step: usize,
    pub iteration: usize,
}

/// Who wrote an annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AnnotationAuthor {
    /// A human reviewer, by id
    Reviewer(String),
    /// The evaluation oracle
    Evaluator,
    /// The cross-variant highlighting oracle
    Highlighter,
    /// The annotation-judging oracle
    Judge,
}

impl AnnotationAuthor {
    pub fn is_automated(&self) -> bool {
        !matches!(self, Self::Reviewer(_))
    }
}

/// A reviewer's objection to an annotation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refutation {
    pub reviewer: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// A remark anchored to a quoted passage of a document.
///
/// The quote is verbatim from whoever wrote the annotation and is not
/// guaranteed to be locatable in the content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub quote: String,
    pub category: String,
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_quote: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_quote: Option<String>,
    pub author: AnnotationAuthor,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub confirmations: BTreeSet<String>,
    #[serde(default)]
    pub refutations: Vec<Refutation>,
}

impl Annotation {
    pub fn new(
        quote: impl Into<String>,
        category: impl Into<String>,
        comment: impl Into<String>,
        author: AnnotationAuthor,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            quote: quote.into(),
            category: category.into(),
            comment: comment.into(),
            evidence_id: None,
            evidence_quote: None,
            related_variant: None,
            related_quote: None,
            author,
            timestamp: Utc::now(),
            confirmations: BTreeSet::new(),
            refutations: Vec::new(),
        }
    }

    pub fn with_evidence(mut self, id: Option<String>, quote: Option<String>) -> Self {
        self.evidence_id = id;
        self.evidence_quote = quote;
        self
    }

    pub fn with_relation(mut self, variant: Option<String>, quote: Option<String>) -> Self {
        self.related_variant = variant;
        self.related_quote = quote;
        self
    }

    pub fn is_refuted(&self) -> bool {
        !self.refutations.is_empty()
    }
}

/// Write-once node of the version graph.
///
/// Content, reasoning trace, method and prompt snapshots are fixed at
/// construction. Annotations and scores are the only parts that grow
/// afterwards, through the graph's mutation methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    id: String,
    parent_id: Option<String>,
    timestamp: DateTime<Utc>,
    content: String,
    reasoning: Option<Vec<ReasoningStep>>,
    method: GenerationMethod,
    prompts: PromptSnapshot,
    pub(crate) annotations: Vec<Annotation>,
    pub(crate) scores: ScoreMap,
    usage: TokenUsage,
    diff: Option<DiffStats>,
    protocol: Option<ProtocolLink>,
}

/// Everything needed to create a node
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub parent_id: Option<String>,
    pub content: String,
    pub reasoning: Option<Vec<ReasoningStep>>,
    pub method: GenerationMethod,
    pub prompts: PromptSnapshot,
    pub annotations: Vec<Annotation>,
    pub scores: ScoreMap,
    pub usage: TokenUsage,
    pub diff: Option<DiffStats>,
    pub protocol: Option<ProtocolLink>,
}

impl DocumentVersion {
    pub fn create(new: NewDocument) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            parent_id: new.parent_id,
            timestamp: Utc::now(),
            content: new.content,
            reasoning: new.reasoning,
            method: new.method,
            prompts: new.prompts,
            annotations: new.annotations,
            scores: new.scores,
            usage: new.usage,
            diff: new.diff,
            protocol: new.protocol,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning(&self) -> Option<&[ReasoningStep]> {
        self.reasoning.as_deref()
    }

    pub fn method(&self) -> GenerationMethod {
        self.method
    }

    pub fn prompts(&self) -> &PromptSnapshot {
        &self.prompts
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    pub fn scores(&self) -> &ScoreMap {
        &self.scores
    }

    pub fn usage(&self) -> &TokenUsage {
        &self.usage
    }

    pub fn diff(&self) -> Option<&DiffStats> {
        self.diff.as_ref()
    }

    pub fn protocol(&self) -> Option<&ProtocolLink> {
        self.protocol.as_ref()
    }

    /// Score given by `rater` for `category`, if any.
    pub fn score(&self, category: &str, rater: &str) -> Option<u8> {
        self.scores.get(category).and_then(|by_rater| by_rater.get(rater)).copied()
    }

    /// Automated scores keyed by category.
    pub fn ai_scores(&self) -> BTreeMap<&str, u8> {
        self.scores
            .iter()
            .filter_map(|(category, by_rater)| {
                by_rater.get(AI_RATER).map(|score| (category.as_str(), *score))
            })
            .collect()
    }

    /// Mean automated score across categories; `None` when nothing was scored.
    pub fn mean_ai_score(&self) -> Option<f64> {
        let scores = self.ai_scores();
        if scores.is_empty() {
            return None;
        }
        Some(scores.values().map(|&s| f64::from(s)).sum::<f64>() / scores.len() as f64)
    }
}

/// Insert a clamped score into a score map.
pub fn insert_score(scores: &mut ScoreMap, category: &str, rater: &str, value: i64) {
    let clamped = value.clamp(0, 100) as u8;
    scores
        .entry(category.to_string())
        .or_default()
        .insert(rater.to_string(), clamped);
}
