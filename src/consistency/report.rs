// Consistency report — pairwise, per-variant and baseline metrics over a set
// of completed runs
//
// The report is derived data. It is recomputed on every protocol execution
// and never written back into the graph.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use super::matching::{AnnotationMatcher, MatchOutcome};
use crate::graph::{Annotation, AnnotationAuthor, DocumentVersion};
use crate::lexical::{jaccard, style_divergence, token_set};
use crate::oracle::{CommentaryRequest, Oracle};
use crate::usage::{TokenAccumulator, TokenUsage};

/// Other variants count as sharing content above this Jaccard overlap.
const SHARED_WITH_THRESHOLD: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// Text and annotation metrics (independently generated variants)
    Full,
    /// Annotation metrics only (one text, several evaluations)
    AnnotationOnly,
}

/// What the report needs from one run
#[derive(Debug, Clone, PartialEq)]
pub struct ReportVariant {
    pub label: String,
    pub content: String,
    pub annotations: Vec<Annotation>,
    /// category id → AI score
    pub ai_scores: BTreeMap<String, u8>,
}

impl ReportVariant {
    /// Snapshot a node. Cross-variant highlights are left out since they
    /// describe the variant set rather than the text itself.
    pub fn from_node(label: impl Into<String>, node: &DocumentVersion) -> Self {
        Self {
            label: label.into(),
            content: node.content().to_string(),
            annotations: node
                .annotations()
                .iter()
                .filter(|a| a.author != AnnotationAuthor::Highlighter)
                .cloned()
                .collect(),
            ai_scores: node
                .ai_scores()
                .into_iter()
                .map(|(category, score)| (category.to_string(), score))
                .collect(),
        }
    }

    fn mean_ai_score(&self) -> Option<f64> {
        if self.ai_scores.is_empty() {
            return None;
        }
        let sum: f64 = self.ai_scores.values().map(|&s| f64::from(s)).sum();
        Some(sum / self.ai_scores.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextMetrics {
    /// Token-set Jaccard overlap
    pub overlap: f64,
    /// Absolute difference in character count
    pub length_delta: usize,
    pub style_divergence: f64,
    /// Distinct tokens only in A
    pub only_a_tokens: usize,
    /// Distinct tokens only in B
    pub only_b_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDelta {
    pub category: String,
    pub a: u8,
    pub b: u8,
    pub delta: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairwiseComparison {
    pub a_label: String,
    pub b_label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<TextMetrics>,
    pub annotations: MatchOutcome,
    /// |mean AI score of A − mean AI score of B|, when both were scored
    pub mean_score_delta: Option<f64>,
    pub category_deltas: Vec<CategoryDelta>,
}

impl PairwiseComparison {
    /// Same comparison with A and B swapped.
    pub fn reversed(&self) -> Self {
        Self {
            a_label: self.b_label.clone(),
            b_label: self.a_label.clone(),
            text: self.text.as_ref().map(|t| TextMetrics {
                only_a_tokens: t.only_b_tokens,
                only_b_tokens: t.only_a_tokens,
                ..t.clone()
            }),
            annotations: self.annotations.reversed(),
            mean_score_delta: self.mean_score_delta,
            category_deltas: self
                .category_deltas
                .iter()
                .map(|d| CategoryDelta {
                    category: d.category.clone(),
                    a: d.b,
                    b: d.a,
                    delta: d.delta,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantBreakdown {
    pub label: String,
    /// Fraction of this variant's tokens absent from every other variant
    pub unique_fraction: f64,
    /// Fraction of this variant's tokens present in some other variant
    pub shared_fraction: f64,
    /// Fraction of other variants overlapping this one above the threshold
    pub shared_with_ratio: f64,
    pub mean_overlap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub baseline_label: String,
    /// Baseline as A, every other run as B
    pub comparisons: Vec<PairwiseComparison>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub mode: ReportMode,
    pub variant_labels: Vec<String>,
    pub pairwise: Vec<PairwiseComparison>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<VariantBreakdown>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineComparison>,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commentary: Option<String>,
}

/// Commentary settings for a `ReportBuilder`
#[derive(Clone, Copy)]
pub struct CommentaryConfig<'a> {
    pub oracle: &'a dyn Oracle,
    pub model: &'a str,
}

pub struct ReportBuilder<'a> {
    matcher: AnnotationMatcher<'a>,
    commentary: Option<CommentaryConfig<'a>>,
    pacing: Duration,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(matcher: AnnotationMatcher<'a>) -> Self {
        Self {
            matcher,
            commentary: None,
            pacing: Duration::ZERO,
        }
    }

    pub fn with_commentary(mut self, commentary: CommentaryConfig<'a>, pacing: Duration) -> Self {
        self.commentary = Some(commentary);
        self.pacing = pacing;
        self
    }

    /// Build the report. Also returns the usage of judge and commentary calls.
    pub async fn build(
        &self,
        variants: &[ReportVariant],
        mode: ReportMode,
        baseline: Option<usize>,
    ) -> (ConsistencyReport, TokenUsage) {
        let mut usage = TokenAccumulator::new();
        let token_sets: Vec<HashSet<String>> =
            variants.iter().map(|v| token_set(&v.content)).collect();

        let mut pairwise = Vec::new();
        let mut pair_index = BTreeMap::new();
        for i in 0..variants.len() {
            for j in (i + 1)..variants.len() {
                let (a, b) = (&variants[i], &variants[j]);
                let text = (mode == ReportMode::Full)
                    .then(|| text_metrics(a, b, &token_sets[i], &token_sets[j]));
                let (annotations, judge_usage) =
                    self.matcher.match_sets(&a.annotations, &b.annotations).await;
                usage.record(judge_usage.as_ref());

                pair_index.insert((i, j), pairwise.len());
                pairwise.push(PairwiseComparison {
                    a_label: a.label.clone(),
                    b_label: b.label.clone(),
                    text,
                    annotations,
                    mean_score_delta: a
                        .mean_ai_score()
                        .zip(b.mean_ai_score())
                        .map(|(x, y)| (x - y).abs()),
                    category_deltas: category_deltas(a, b),
                });
            }
        }

        let (breakdown, baseline) = if mode == ReportMode::Full {
            let breakdown = variant_breakdown(variants, &token_sets);
            let baseline = baseline.and_then(|index| {
                if index >= variants.len() {
                    tracing::warn!(
                        "Baseline index {index} is out of range for {} variants; skipping baseline comparison",
                        variants.len()
                    );
                    return None;
                }
                Some(baseline_comparison(variants, index, &pairwise, &pair_index))
            });
            (breakdown, baseline)
        } else {
            (Vec::new(), None)
        };

        let summary = summarize(mode, variants.len(), &pairwise);

        let mut commentary = None;
        if let Some(config) = self.commentary {
            let result = config
                .oracle
                .comment(&CommentaryRequest {
                    summary: numeric_summary(mode, &pairwise),
                    model: config.model.to_string(),
                })
                .await;
            if !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
            match result {
                Ok(response) => {
                    usage.record(response.usage.as_ref());
                    let text = response.text.trim().to_string();
                    commentary = (!text.is_empty()).then_some(text);
                }
                Err(e) => tracing::warn!("Report commentary skipped: {e}"),
            }
        }

        let report = ConsistencyReport {
            mode,
            variant_labels: variants.iter().map(|v| v.label.clone()).collect(),
            pairwise,
            variants: breakdown,
            baseline,
            summary,
            commentary,
        };
        (report, usage.total())
    }
}

// ── Metrics ──────────────────────────────────────────────────────────────

fn text_metrics(
    a: &ReportVariant,
    b: &ReportVariant,
    tokens_a: &HashSet<String>,
    tokens_b: &HashSet<String>,
) -> TextMetrics {
    TextMetrics {
        overlap: jaccard(tokens_a, tokens_b),
        length_delta: a.content.chars().count().abs_diff(b.content.chars().count()),
        style_divergence: style_divergence(&a.content, &b.content),
        only_a_tokens: tokens_a.difference(tokens_b).count(),
        only_b_tokens: tokens_b.difference(tokens_a).count(),
    }
}

fn category_deltas(a: &ReportVariant, b: &ReportVariant) -> Vec<CategoryDelta> {
    a.ai_scores
        .iter()
        .filter_map(|(category, &score_a)| {
            b.ai_scores.get(category).map(|&score_b| CategoryDelta {
                category: category.clone(),
                a: score_a,
                b: score_b,
                delta: score_a.abs_diff(score_b),
            })
        })
        .collect()
}

fn variant_breakdown(
    variants: &[ReportVariant],
    token_sets: &[HashSet<String>],
) -> Vec<VariantBreakdown> {
    let others_count = variants.len().saturating_sub(1);

    variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let own = &token_sets[i];
            let others: HashSet<&String> = token_sets
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .flat_map(|(_, set)| set.iter())
                .collect();

            let shared_tokens = own.iter().filter(|t| others.contains(t)).count();
            let fraction = |count: usize| {
                if own.is_empty() {
                    0.0
                } else {
                    count as f64 / own.len() as f64
                }
            };

            let overlaps: Vec<f64> = token_sets
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, set)| jaccard(own, set))
                .collect();
            let overlapping = overlaps.iter().filter(|&&o| o > SHARED_WITH_THRESHOLD).count();

            VariantBreakdown {
                label: variant.label.clone(),
                unique_fraction: fraction(own.len() - shared_tokens),
                shared_fraction: fraction(shared_tokens),
                shared_with_ratio: if others_count == 0 {
                    0.0
                } else {
                    overlapping as f64 / others_count as f64
                },
                mean_overlap: mean(overlaps.iter().copied()),
            }
        })
        .collect()
}

fn baseline_comparison(
    variants: &[ReportVariant],
    baseline: usize,
    pairwise: &[PairwiseComparison],
    pair_index: &BTreeMap<(usize, usize), usize>,
) -> BaselineComparison {
    let comparisons = (0..variants.len())
        .filter(|&other| other != baseline)
        .filter_map(|other| {
            if baseline < other {
                pair_index.get(&(baseline, other)).map(|&k| pairwise[k].clone())
            } else {
                pair_index.get(&(other, baseline)).map(|&k| pairwise[k].reversed())
            }
        })
        .collect();

    BaselineComparison {
        baseline_label: variants[baseline].label.clone(),
        comparisons,
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

// ── Summary ──────────────────────────────────────────────────────────────

struct SummaryStats {
    mean_overlap: f64,
    min_overlap: f64,
    max_overlap: f64,
    agreement: f64,
    quote_overlap: f64,
    comment_alignment: f64,
}

fn summary_stats(pairwise: &[PairwiseComparison]) -> SummaryStats {
    let overlaps: Vec<f64> = pairwise
        .iter()
        .filter_map(|p| p.text.as_ref().map(|t| t.overlap))
        .collect();
    SummaryStats {
        mean_overlap: mean(overlaps.iter().copied()),
        min_overlap: overlaps.iter().copied().reduce(f64::min).unwrap_or(0.0),
        max_overlap: overlaps.iter().copied().reduce(f64::max).unwrap_or(0.0),
        agreement: mean(pairwise.iter().map(|p| p.annotations.shared_fraction)),
        quote_overlap: mean(pairwise.iter().map(|p| p.annotations.avg_quote_overlap)),
        comment_alignment: mean(pairwise.iter().map(|p| p.annotations.avg_comment_similarity)),
    }
}

fn summarize(mode: ReportMode, variant_count: usize, pairwise: &[PairwiseComparison]) -> String {
    if pairwise.is_empty() {
        return format!("Only {variant_count} run(s) available; nothing to compare.");
    }
    let stats = summary_stats(pairwise);
    match mode {
        ReportMode::Full => format!(
            "Across {variant_count} variants, mean text overlap was {:.2} (min {:.2}, max {:.2}) \
             and mean annotation agreement was {:.2}.",
            stats.mean_overlap, stats.min_overlap, stats.max_overlap, stats.agreement
        ),
        ReportMode::AnnotationOnly => format!(
            "Across {variant_count} evaluations, mean annotation agreement was {:.2} with quote \
             overlap {:.2} and comment alignment {:.2}.",
            stats.agreement, stats.quote_overlap, stats.comment_alignment
        ),
    }
}

/// Numbers only, for the commentary oracle.
fn numeric_summary(mode: ReportMode, pairwise: &[PairwiseComparison]) -> String {
    let stats = summary_stats(pairwise);
    let mut lines = vec![format!("pairs compared: {}", pairwise.len())];
    if mode == ReportMode::Full {
        lines.push(format!("mean text overlap: {:.3}", stats.mean_overlap));
        lines.push(format!("min text overlap: {:.3}", stats.min_overlap));
        lines.push(format!("max text overlap: {:.3}", stats.max_overlap));
    }
    lines.push(format!("mean annotation agreement: {:.3}", stats.agreement));
    lines.push(format!("mean quote overlap: {:.3}", stats.quote_overlap));
    lines.push(format!("mean comment alignment: {:.3}", stats.comment_alignment));
    let score_deltas: Vec<f64> = pairwise.iter().filter_map(|p| p.mean_score_delta).collect();
    if !score_deltas.is_empty() {
        lines.push(format!(
            "mean AI score delta: {:.2}",
            mean(score_deltas.iter().copied())
        ));
    }
    lines.join("\n")
}
