// Generation step — one oracle round trip turned into one document node
//
// generate → pace → diff against the predecessor → evaluate → pace →
// normalize scores and annotations → fold usage → build the node.

use std::collections::BTreeMap;
use std::time::Duration;

use super::prompt::{PromptAssembler, PromptContext, RefinementFeedback};
use crate::config::{Category, ExperimentConfig, Resource};
use crate::diff::{diff_stats, DiffStats};
use crate::graph::{
    insert_score, Annotation, AnnotationAuthor, DocumentVersion, GenerationMethod, NewDocument,
    PromptSnapshot, ProtocolLink, ScoreMap, AI_RATER,
};
use crate::oracle::{
    AnnotationCandidate, EvaluationRequest, GenerationRequest, Oracle, OracleResult,
};
use crate::usage::{TokenAccumulator, TokenUsage};

/// Where a step sits in the protocol
#[derive(Debug, Clone, Copy)]
pub struct StepInput<'a> {
    pub run_id: &'a str,
    pub run_label: &'a str,
    /// Previous version in the same chain; `Some` makes this a refinement
    pub predecessor: Option<&'a DocumentVersion>,
    /// Position in the run, starting at 0
    pub step: usize,
    /// Refinement iteration; 0 for the seed
    pub iteration: usize,
    pub resources: &'a [Resource],
    /// Forced seed method, taking precedence over the experiment's override
    pub method_override: Option<GenerationMethod>,
    /// Skip the evaluation call entirely
    pub evaluate: bool,
}

/// Outcome of the evaluation half of a step
#[derive(Debug, Clone, Default)]
struct Evaluated {
    annotations: Vec<Annotation>,
    scores: ScoreMap,
    usage: Option<TokenUsage>,
}

pub struct GenerationStep<'a> {
    config: &'a ExperimentConfig,
    oracle: &'a dyn Oracle,
    assembler: &'a dyn PromptAssembler,
    pacing: Duration,
}

impl<'a> GenerationStep<'a> {
    pub fn new(
        config: &'a ExperimentConfig,
        oracle: &'a dyn Oracle,
        assembler: &'a dyn PromptAssembler,
    ) -> Self {
        Self {
            config,
            oracle,
            assembler,
            pacing: config.pacing(),
        }
    }

    /// Method for a step: refinement when there is a predecessor, else the
    /// step's or experiment's override, else standard.
    pub fn select_method(&self, input: &StepInput<'_>) -> GenerationMethod {
        if input.predecessor.is_some() {
            GenerationMethod::RefineLoop
        } else {
            input
                .method_override
                .or(self.config.method_override)
                .unwrap_or(GenerationMethod::Standard)
        }
    }

    /// Produce exactly one node. Any oracle request failure aborts the step.
    pub async fn run(&self, input: StepInput<'_>) -> OracleResult<DocumentVersion> {
        let method = self.select_method(&input);
        let feedback = input
            .predecessor
            .map(|p| RefinementFeedback::from_node(p, &self.config.feedback));

        let full_prompt = self.assembler.assemble(&PromptContext {
            prompts: &self.config.prompts,
            method,
            resources: input.resources,
            feedback: feedback.as_ref(),
        });

        tracing::debug!(
            run = input.run_label,
            step = input.step,
            method = method.as_str(),
            "Generating"
        );

        let generated = self
            .oracle
            .generate(&GenerationRequest {
                full_prompt: full_prompt.clone(),
                system_instruction: self.config.prompts.system_instruction.clone(),
                model: self.config.models.generator.clone(),
                method,
            })
            .await?;
        self.pace().await;

        let diff = input
            .predecessor
            .map(|p| diff_stats(p.content(), &generated.text));

        let evaluated = if input.evaluate {
            self.evaluate_text(&generated.text, input.resources).await?
        } else {
            Evaluated::default()
        };

        let mut usage = TokenAccumulator::new();
        usage.record(generated.usage.as_ref());
        usage.record(evaluated.usage.as_ref());

        Ok(DocumentVersion::create(NewDocument {
            parent_id: input.predecessor.map(|p| p.id().to_string()),
            content: generated.text,
            reasoning: generated.reasoning,
            method,
            prompts: self.snapshot(full_prompt),
            annotations: evaluated.annotations,
            scores: evaluated.scores,
            usage: usage.total(),
            diff,
            protocol: Some(self.link(&input)),
        }))
    }

    /// Evaluate an existing node's content again, producing a child node with
    /// the same content and a fresh evaluation.
    pub async fn reevaluate(
        &self,
        base: &DocumentVersion,
        input: StepInput<'_>,
    ) -> OracleResult<DocumentVersion> {
        tracing::debug!(run = input.run_label, base = base.id(), "Re-evaluating");

        let evaluated = self.evaluate_text(base.content(), input.resources).await?;

        let mut usage = TokenAccumulator::new();
        usage.record(evaluated.usage.as_ref());

        let mut prompts = base.prompts().clone();
        prompts.evaluator_prompt = self.config.prompts.evaluator.clone();
        prompts.evaluator_model = self.config.models.evaluator.clone();

        Ok(DocumentVersion::create(NewDocument {
            parent_id: Some(base.id().to_string()),
            content: base.content().to_string(),
            reasoning: base.reasoning().map(<[_]>::to_vec),
            method: base.method(),
            prompts,
            annotations: evaluated.annotations,
            scores: evaluated.scores,
            usage: usage.total(),
            diff: Some(DiffStats::default()),
            protocol: Some(self.link(&input)),
        }))
    }

    async fn evaluate_text(&self, text: &str, resources: &[Resource]) -> OracleResult<Evaluated> {
        let result = self
            .oracle
            .evaluate(&EvaluationRequest {
                text: text.to_string(),
                resources: resources.to_vec(),
                categories: self.config.categories.clone(),
                model: self.config.models.evaluator.clone(),
                prompt_template: self.config.prompts.evaluator.clone(),
            })
            .await;

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_malformed() => {
                self.pace().await;
                tracing::warn!("{e}; continuing without annotations or scores");
                return Ok(Evaluated::default());
            }
            Err(e) => return Err(e),
        };
        self.pace().await;

        let categories = &self.config.categories;
        Ok(Evaluated {
            annotations: response
                .candidates
                .into_iter()
                .map(|c| materialize_annotation(c, categories))
                .collect(),
            scores: normalize_scores(&response.scores, categories),
            usage: response.usage,
        })
    }

    async fn pace(&self) {
        if !self.pacing.is_zero() {
            tokio::time::sleep(self.pacing).await;
        }
    }

    fn snapshot(&self, full_prompt: String) -> PromptSnapshot {
        PromptSnapshot {
            system_instruction: self.config.prompts.system_instruction.clone(),
            full_prompt,
            evaluator_prompt: self.config.prompts.evaluator.clone(),
            generator_model: self.config.models.generator.clone(),
            evaluator_model: self.config.models.evaluator.clone(),
        }
    }

    fn link(&self, input: &StepInput<'_>) -> ProtocolLink {
        ProtocolLink {
            experiment_id: self.config.id.clone(),
            run_id: input.run_id.to_string(),
            run_label: input.run_label.to_string(),
            step: input.step,
            iteration: input.iteration,
        }
    }
}

// ── Evaluation normalization ─────────────────────────────────────────────

fn resolve_category<'c>(key: &str, categories: &'c [Category]) -> Option<&'c Category> {
    let key = key.trim();
    categories
        .iter()
        .find(|c| c.id.eq_ignore_ascii_case(key))
        .or_else(|| categories.iter().find(|c| c.name.eq_ignore_ascii_case(key)))
}

/// Map raw evaluator score keys onto category ids under the `AI` rater.
///
/// Keys matching no category and values that are not finite numbers are
/// dropped. Values are rounded and clamped to 0–100.
pub fn normalize_scores(
    raw: &BTreeMap<String, serde_json::Value>,
    categories: &[Category],
) -> ScoreMap {
    let mut scores = ScoreMap::new();
    for (key, value) in raw {
        let Some(category) = resolve_category(key, categories) else {
            tracing::debug!("Dropping score for unknown category '{key}'");
            continue;
        };
        let Some(number) = value.as_f64().filter(|n| n.is_finite()) else {
            continue;
        };
        insert_score(&mut scores, &category.id, AI_RATER, number.round() as i64);
    }
    scores
}

fn materialize_annotation(candidate: AnnotationCandidate, categories: &[Category]) -> Annotation {
    let category = resolve_category(&candidate.category, categories)
        .map(|c| c.id.clone())
        .unwrap_or(candidate.category);
    Annotation::new(
        candidate.quote,
        category,
        candidate.comment,
        AnnotationAuthor::Evaluator,
    )
    .with_evidence(candidate.source_id, candidate.source_quote)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn categories() -> Vec<Category> {
        vec![
            Category {
                id: "acc".into(),
                name: "Accuracy".into(),
                description: String::new(),
            },
            Category {
                id: "style".into(),
                name: "Style".into(),
                description: String::new(),
            },
        ]
    }

    #[test]
    fn test_normalize_scores_by_id_or_name() {
        let raw: BTreeMap<String, serde_json::Value> = [
            ("accuracy".to_string(), json!(81.6)),
            ("STYLE".to_string(), json!(140)),
            ("tone".to_string(), json!(50)),
        ]
        .into_iter()
        .collect();
        let scores = normalize_scores(&raw, &categories());
        assert_eq!(scores["acc"][AI_RATER], 82);
        assert_eq!(scores["style"][AI_RATER], 100);
        assert_eq!(scores.len(), 2);
    }

    #[test]
    fn test_normalize_scores_drops_non_numeric() {
        let raw: BTreeMap<String, serde_json::Value> = [
            ("acc".to_string(), json!("high")),
            ("style".to_string(), json!(null)),
        ]
        .into_iter()
        .collect();
        assert!(normalize_scores(&raw, &categories()).is_empty());
    }

    #[test]
    fn test_negative_score_clamped() {
        let raw: BTreeMap<String, serde_json::Value> =
            [("acc".to_string(), json!(-4))].into_iter().collect();
        assert_eq!(normalize_scores(&raw, &categories())["acc"][AI_RATER], 0);
    }

    #[test]
    fn test_materialize_maps_category_name() {
        let annotation = materialize_annotation(
            AnnotationCandidate {
                quote: "q".into(),
                category: "accuracy".into(),
                comment: "c".into(),
                source_id: Some("r1".into()),
                source_quote: None,
            },
            &categories(),
        );
        assert_eq!(annotation.category, "acc");
        assert_eq!(annotation.author, AnnotationAuthor::Evaluator);
        assert_eq!(annotation.evidence_id.as_deref(), Some("r1"));
        assert!(annotation.confirmations.is_empty());
        assert!(annotation.refutations.is_empty());
    }

    #[test]
    fn test_materialize_keeps_unknown_label() {
        let annotation = materialize_annotation(
            AnnotationCandidate {
                quote: "q".into(),
                category: "Pacing".into(),
                comment: String::new(),
                source_id: None,
                source_quote: None,
            },
            &categories(),
        );
        assert_eq!(annotation.category, "Pacing");
    }
}
