// Request/response shapes for every oracle role

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::{Category, Resource};
use crate::graph::{GenerationMethod, ReasoningStep};
use crate::usage::TokenUsage;

// ── Generation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub full_prompt: String,
    pub system_instruction: String,
    pub model: String,
    pub method: GenerationMethod,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResponse {
    pub text: String,
    /// Present only for step-segmented output
    pub reasoning: Option<Vec<ReasoningStep>>,
    pub usage: Option<TokenUsage>,
}

// ── Evaluation ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationRequest {
    pub text: String,
    pub resources: Vec<Resource>,
    pub categories: Vec<Category>,
    pub model: String,
    pub prompt_template: String,
}

/// An annotation proposed by the evaluator, before it becomes part of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationCandidate {
    pub quote: String,
    #[serde(default, alias = "categoryLabel", alias = "category_label")]
    pub category: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, alias = "sourceId")]
    pub source_id: Option<String>,
    #[serde(default, alias = "sourceQuote")]
    pub source_quote: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvaluationResponse {
    pub candidates: Vec<AnnotationCandidate>,
    /// Raw category key → score as returned; normalized by the pipeline
    pub scores: BTreeMap<String, serde_json::Value>,
    pub usage: Option<TokenUsage>,
}

// ── Cross-variant highlighting ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HighlightKind {
    /// Content that differs from another variant
    Diff,
    /// Content no other variant has
    Addition,
    /// Content traceable to the original prompt or resources
    Source,
}

impl HighlightKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Diff => "DIFF",
            Self::Addition => "ADDITION",
            Self::Source => "SOURCE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledText {
    pub label: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighlightRequest {
    pub original_text: String,
    pub variants: Vec<LabeledText>,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighlightAnnotation {
    #[serde(rename = "type")]
    pub kind: HighlightKind,
    pub quote: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default, alias = "relatedVariant")]
    pub related_variant: Option<String>,
    #[serde(default, alias = "relatedQuote")]
    pub related_quote: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantHighlights {
    pub label: String,
    #[serde(default)]
    pub annotations: Vec<HighlightAnnotation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HighlightResponse {
    pub variants: Vec<VariantHighlights>,
    #[serde(skip)]
    pub usage: Option<TokenUsage>,
}

impl HighlightResponse {
    pub fn for_label(&self, label: &str) -> &[HighlightAnnotation] {
        self.variants
            .iter()
            .find(|v| v.label == label)
            .map(|v| v.annotations.as_slice())
            .unwrap_or(&[])
    }
}

// ── Annotation judging ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct JudgeRequest {
    /// Compact indexed listing of the first annotation set
    pub listing_a: String,
    /// Compact indexed listing of the second annotation set
    pub listing_b: String,
    pub role: String,
    pub model: String,
}

/// One proposed pairing. Indices are kept as raw JSON so out-of-range or
/// non-integer values can be filtered rather than failing the whole reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgeMatch {
    #[serde(alias = "aIndex")]
    pub a_index: serde_json::Value,
    #[serde(alias = "bIndex")]
    pub b_index: serde_json::Value,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgeResponse {
    #[serde(default)]
    pub matches: Vec<JudgeMatch>,
    #[serde(skip)]
    pub usage: Option<TokenUsage>,
}

// ── Commentary ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct CommentaryRequest {
    pub summary: String,
    pub model: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommentaryResponse {
    pub text: String,
    pub usage: Option<TokenUsage>,
}
