// Annotation matching — partial one-to-one alignment of two annotation sets
//
// A lexical strategy always runs. When a judge oracle is configured its
// pairing replaces the lexical one, provided it returns at least one valid
// pair. Metrics over the final pairing are always recomputed with the
// lexical scorers so both sources report on the same scale.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Write as _;
use std::time::Duration;

use crate::graph::Annotation;
use crate::lexical::{comment_similarity, quote_overlap_score};
use crate::oracle::{JudgeMatch, JudgeRequest, Oracle};
use crate::usage::TokenUsage;

/// Annotations beyond this many per side are left out of judge listings.
const MAX_JUDGE_ITEMS: usize = 60;
/// Longest quote or comment shown to the judge, in characters.
const MAX_JUDGE_FIELD_CHARS: usize = 200;

const JUDGE_ROLE: &str = "You align two independent reviews of the same text. Two annotations \
match when they point at substantially the same passage and raise the same concern. You answer \
only with the JSON object you are asked for.";

/// One aligned pair of indices into A and B
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedPair {
    pub a: usize,
    pub b: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    Heuristic,
    Judge,
}

/// Agreement metrics for one pair of annotation sets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub pairs: Vec<MatchedPair>,
    pub shared: usize,
    pub only_a: usize,
    pub only_b: usize,
    pub shared_fraction: f64,
    pub avg_quote_overlap: f64,
    pub avg_comment_similarity: f64,
    pub source: MatchSource,
    pub justification: String,
}

impl MatchOutcome {
    /// Compute metrics for a pairing of `a` and `b`.
    pub fn from_pairs(
        a: &[Annotation],
        b: &[Annotation],
        pairs: Vec<MatchedPair>,
        source: MatchSource,
        justification: String,
    ) -> Self {
        let shared = pairs.len();
        let distinct_b: HashSet<usize> = pairs.iter().map(|p| p.b).collect();
        let denominator = a.len().max(b.len());

        let (quote_sum, comment_sum) = pairs.iter().fold((0.0, 0.0), |(q, c), pair| {
            let (quote, comment) = pair_similarity(&a[pair.a], &b[pair.b]);
            (q + quote, c + comment)
        });

        let mean = |sum: f64| if shared == 0 { 0.0 } else { sum / shared as f64 };

        Self {
            shared,
            only_a: a.len().saturating_sub(shared),
            only_b: b.len().saturating_sub(distinct_b.len()),
            shared_fraction: if denominator == 0 {
                0.0
            } else {
                shared as f64 / denominator as f64
            },
            avg_quote_overlap: mean(quote_sum),
            avg_comment_similarity: mean(comment_sum),
            pairs,
            source,
            justification,
        }
    }

    /// Same outcome seen from B's side.
    pub fn reversed(&self) -> Self {
        Self {
            pairs: self
                .pairs
                .iter()
                .map(|p| MatchedPair {
                    a: p.b,
                    b: p.a,
                    reason: p.reason.clone(),
                })
                .collect(),
            only_a: self.only_b,
            only_b: self.only_a,
            ..self.clone()
        }
    }
}

/// (quote overlap, comment similarity) of two annotations
pub fn pair_similarity(a: &Annotation, b: &Annotation) -> (f64, f64) {
    (
        quote_overlap_score(&a.quote, &b.quote),
        comment_similarity(&a.comment, &b.comment),
    )
}

/// A way of pairing two annotation lists
pub trait MatchStrategy: Send + Sync {
    fn pair(&self, a: &[Annotation], b: &[Annotation]) -> Vec<MatchedPair>;

    fn name(&self) -> &'static str;
}

/// Order-dependent greedy pairing on weighted lexical similarity.
///
/// Each A item, in order, takes the best-scoring B item that is still
/// unconsumed and whose quote overlap reaches the threshold. Ties go to the
/// lower B index.
#[derive(Debug, Clone, Copy)]
pub struct GreedyMatcher {
    pub quote_weight: f64,
    pub comment_weight: f64,
    pub min_quote_overlap: f64,
}

impl Default for GreedyMatcher {
    fn default() -> Self {
        Self {
            quote_weight: 0.65,
            comment_weight: 0.35,
            min_quote_overlap: 0.35,
        }
    }
}

impl MatchStrategy for GreedyMatcher {
    fn pair(&self, a: &[Annotation], b: &[Annotation]) -> Vec<MatchedPair> {
        let mut consumed = vec![false; b.len()];
        let mut pairs = Vec::new();

        for (ai, left) in a.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (bi, right) in b.iter().enumerate() {
                if consumed[bi] {
                    continue;
                }
                let (quote, comment) = pair_similarity(left, right);
                if quote < self.min_quote_overlap {
                    continue;
                }
                let score = self.quote_weight * quote + self.comment_weight * comment;
                if best.map_or(true, |(_, best_score)| score > best_score) {
                    best = Some((bi, score));
                }
            }
            if let Some((bi, _)) = best {
                consumed[bi] = true;
                pairs.push(MatchedPair {
                    a: ai,
                    b: bi,
                    reason: None,
                });
            }
        }

        pairs
    }

    fn name(&self) -> &'static str {
        "greedy-lexical"
    }
}

/// Judge settings for an `AnnotationMatcher`
#[derive(Clone, Copy)]
pub struct JudgeConfig<'a> {
    pub oracle: &'a dyn Oracle,
    pub model: &'a str,
}

/// Heuristic pairing with an optional judge override
pub struct AnnotationMatcher<'a> {
    strategy: &'a dyn MatchStrategy,
    judge: Option<JudgeConfig<'a>>,
    pacing: Duration,
}

impl<'a> AnnotationMatcher<'a> {
    pub fn new(strategy: &'a dyn MatchStrategy) -> Self {
        Self {
            strategy,
            judge: None,
            pacing: Duration::ZERO,
        }
    }

    pub fn with_judge(mut self, judge: JudgeConfig<'a>, pacing: Duration) -> Self {
        self.judge = Some(judge);
        self.pacing = pacing;
        self
    }

    /// Align `a` and `b`. Returns the outcome and the judge's usage, if it was called.
    pub async fn match_sets(
        &self,
        a: &[Annotation],
        b: &[Annotation],
    ) -> (MatchOutcome, Option<TokenUsage>) {
        let heuristic_pairs = self.strategy.pair(a, b);
        let heuristic_reason = format!(
            "{} paired {} of {} / {} annotations",
            self.strategy.name(),
            heuristic_pairs.len(),
            a.len(),
            b.len()
        );

        let Some(judge) = self.judge.filter(|_| !(a.is_empty() && b.is_empty())) else {
            return (
                MatchOutcome::from_pairs(a, b, heuristic_pairs, MatchSource::Heuristic, heuristic_reason),
                None,
            );
        };

        let request = JudgeRequest {
            listing_a: judge_listing(a),
            listing_b: judge_listing(b),
            role: JUDGE_ROLE.to_string(),
            model: judge.model.to_string(),
        };

        let result = judge.oracle.judge(&request).await;
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }

        match result {
            Ok(response) => {
                let pairs = filter_judge_matches(&response.matches, a.len(), b.len());
                if pairs.is_empty() {
                    tracing::debug!("Judge returned no usable matches; keeping heuristic pairing");
                    return (
                        MatchOutcome::from_pairs(a, b, heuristic_pairs, MatchSource::Heuristic, heuristic_reason),
                        response.usage,
                    );
                }
                let reasons: Vec<&str> = pairs
                    .iter()
                    .filter_map(|p| p.reason.as_deref())
                    .filter(|r| !r.is_empty())
                    .collect();
                let justification = if reasons.is_empty() {
                    format!("judge paired {} annotations", pairs.len())
                } else {
                    reasons.join("; ")
                };
                (
                    MatchOutcome::from_pairs(a, b, pairs, MatchSource::Judge, justification),
                    response.usage,
                )
            }
            Err(e) => {
                tracing::warn!("Annotation judge unavailable, using heuristic pairing: {e}");
                (
                    MatchOutcome::from_pairs(a, b, heuristic_pairs, MatchSource::Heuristic, heuristic_reason),
                    None,
                )
            }
        }
    }
}

/// Keep judge pairs with integer in-range indices, first use of an index wins.
pub fn filter_judge_matches(matches: &[JudgeMatch], len_a: usize, len_b: usize) -> Vec<MatchedPair> {
    let index = |value: &serde_json::Value, len: usize| {
        value
            .as_u64()
            .and_then(|i| usize::try_from(i).ok())
            .filter(|&i| i < len)
    };

    let mut used_a = HashSet::new();
    let mut used_b = HashSet::new();
    let mut pairs = Vec::new();

    for m in matches {
        let (Some(a), Some(b)) = (index(&m.a_index, len_a), index(&m.b_index, len_b)) else {
            tracing::debug!("Dropping judge match with invalid indices: {:?} / {:?}", m.a_index, m.b_index);
            continue;
        };
        if used_a.contains(&a) || used_b.contains(&b) {
            tracing::debug!("Dropping duplicate judge match {a} -> {b}");
            continue;
        }
        used_a.insert(a);
        used_b.insert(b);
        pairs.push(MatchedPair {
            a,
            b,
            reason: Some(m.reason.clone()),
        });
    }

    pairs
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

/// Compact indexed listing, one annotation per line.
fn judge_listing(annotations: &[Annotation]) -> String {
    let mut listing = String::new();
    for (i, annotation) in annotations.iter().take(MAX_JUDGE_ITEMS).enumerate() {
        let _ = writeln!(
            listing,
            "[{i}] ({}) \"{}\": {}",
            annotation.category,
            truncate_chars(annotation.quote.trim(), MAX_JUDGE_FIELD_CHARS),
            truncate_chars(annotation.comment.trim(), MAX_JUDGE_FIELD_CHARS)
        );
    }
    if annotations.len() > MAX_JUDGE_ITEMS {
        let _ = writeln!(listing, "({} more omitted)", annotations.len() - MAX_JUDGE_ITEMS);
    }
    if listing.is_empty() {
        listing.push_str("(none)\n");
    }
    listing
}
