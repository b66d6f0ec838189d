// LLM-backed oracle: builds role prompts, sends them through a provider and
// recovers structured answers from free-form model output

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;

use super::error::OracleError;
use super::parse::extract_json;
use super::trace::parse_trace;
use super::types::*;
use super::{Oracle, OracleResult};
use crate::config::{Category, OracleSettings, Resource};
use crate::graph::GenerationMethod;
use crate::providers::{LlmProvider, ProviderRequest, ProviderResponse};

pub struct LlmOracle {
    provider: Arc<dyn LlmProvider>,
    settings: OracleSettings,
}

impl LlmOracle {
    pub fn new(provider: Arc<dyn LlmProvider>, settings: OracleSettings) -> Self {
        Self { provider, settings }
    }

    async fn send(
        &self,
        operation: &'static str,
        prompt: String,
        system: &str,
        model: &str,
    ) -> OracleResult<ProviderResponse> {
        let request = ProviderRequest::prompt(prompt)
            .with_system(system)
            .with_model(model)
            .with_max_tokens(self.settings.max_tokens)
            .with_temperature(self.settings.temperature);

        self.provider
            .send_message(&request)
            .await
            .map_err(|e| OracleError::request(operation, format!("{e:#}")))
    }
}

#[async_trait]
impl Oracle for LlmOracle {
    async fn generate(&self, request: &GenerationRequest) -> OracleResult<GenerationResponse> {
        let response = self
            .send(
                "generate",
                request.full_prompt.clone(),
                &request.system_instruction,
                &request.model,
            )
            .await?;

        if request.method == GenerationMethod::StepByStep {
            let parsed = parse_trace(&response.text);
            if !parsed.traced {
                tracing::debug!("Step-by-step output had no usable segments; kept as plain text");
            }
            return Ok(GenerationResponse {
                text: parsed.content(),
                reasoning: parsed.reasoning(),
                usage: response.usage,
            });
        }

        Ok(GenerationResponse {
            text: response.text.trim().to_string(),
            reasoning: None,
            usage: response.usage,
        })
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> OracleResult<EvaluationResponse> {
        let prompt = evaluation_prompt(request);
        let response = self
            .send("evaluate", prompt, EVALUATOR_SYSTEM, &request.model)
            .await?;

        let raw: RawEvaluation = extract_json(&response.text)
            .ok_or_else(|| OracleError::malformed("evaluate", "no evaluation JSON in response"))?;

        Ok(EvaluationResponse {
            candidates: raw.annotations,
            scores: raw.scores,
            usage: response.usage,
        })
    }

    async fn highlight(&self, request: &HighlightRequest) -> OracleResult<HighlightResponse> {
        let prompt = highlight_prompt(request);
        let response = self
            .send("highlight", prompt, HIGHLIGHTER_SYSTEM, &request.model)
            .await?;

        let mut parsed: HighlightResponse = extract_json(&response.text)
            .ok_or_else(|| OracleError::malformed("highlight", "no highlight JSON in response"))?;
        parsed.usage = response.usage;
        Ok(parsed)
    }

    async fn judge(&self, request: &JudgeRequest) -> OracleResult<JudgeResponse> {
        let prompt = judge_prompt(request);
        let response = self
            .send("judge", prompt, &request.role, &request.model)
            .await?;

        let mut parsed: JudgeResponse = extract_json(&response.text)
            .ok_or_else(|| OracleError::malformed("judge", "no match JSON in response"))?;
        parsed.usage = response.usage;
        Ok(parsed)
    }

    async fn comment(&self, request: &CommentaryRequest) -> OracleResult<CommentaryResponse> {
        let prompt = format!(
            "Here are consistency metrics from a text-generation experiment:\n\n{}\n\n\
             In two or three sentences, interpret what these numbers say about how \
             stable the generation and evaluation process is. Do not restate every number.",
            request.summary
        );
        let response = self
            .send("comment", prompt, COMMENTATOR_SYSTEM, &request.model)
            .await?;

        Ok(CommentaryResponse {
            text: response.text.trim().to_string(),
            usage: response.usage,
        })
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}

#[derive(Debug, Deserialize)]
struct RawEvaluation {
    #[serde(default, alias = "candidates", alias = "annotationCandidates")]
    annotations: Vec<AnnotationCandidate>,
    #[serde(default)]
    scores: BTreeMap<String, serde_json::Value>,
}

// ── Prompts ──────────────────────────────────────────────────────────────

const EVALUATOR_SYSTEM: &str =
    "You are a meticulous reviewer. You answer only with the JSON object you are asked for.";

const HIGHLIGHTER_SYSTEM: &str =
    "You compare several versions of a text. You answer only with the JSON object you are asked for.";

const COMMENTATOR_SYSTEM: &str = "You explain experiment metrics plainly to a researcher.";

fn push_categories(prompt: &mut String, categories: &[Category]) {
    if categories.is_empty() {
        return;
    }
    prompt.push_str("\nCategories:\n");
    for c in categories {
        let _ = writeln!(prompt, "- {} ({}): {}", c.name, c.id, c.description);
    }
}

fn push_resources(prompt: &mut String, resources: &[Resource]) {
    if resources.is_empty() {
        return;
    }
    prompt.push_str("\nReference material:\n");
    for r in resources {
        let _ = writeln!(prompt, "[{}] {}\n{}\n", r.id, r.title, r.content);
    }
}

fn evaluation_prompt(request: &EvaluationRequest) -> String {
    let mut prompt = String::new();
    if !request.prompt_template.trim().is_empty() {
        prompt.push_str(request.prompt_template.trim());
        prompt.push('\n');
    }
    push_categories(&mut prompt, &request.categories);
    push_resources(&mut prompt, &request.resources);
    let _ = write!(
        prompt,
        "\nText to evaluate:\n\"\"\"\n{}\n\"\"\"\n\n\
         Respond with JSON of the form:\n\
         {{\"annotations\": [{{\"quote\": \"verbatim passage\", \"categoryLabel\": \"category name\", \
         \"comment\": \"...\", \"sourceId\": \"resource id or null\", \"sourceQuote\": \"passage or null\"}}], \
         \"scores\": {{\"<category>\": 0-100}}}}",
        request.text
    );
    prompt
}

fn highlight_prompt(request: &HighlightRequest) -> String {
    let mut prompt = format!(
        "Original task:\n\"\"\"\n{}\n\"\"\"\n\nVariants:\n",
        request.original_text
    );
    for variant in &request.variants {
        let _ = writeln!(prompt, "--- {} ---\n{}\n", variant.label, variant.text);
    }
    prompt.push_str(
        "For each variant, mark passages that DIFF from another variant, are an ADDITION \
         no other variant has, or trace back to the SOURCE task. Respond with JSON:\n\
         {\"variants\": [{\"label\": \"...\", \"annotations\": [{\"type\": \"DIFF|ADDITION|SOURCE\", \
         \"quote\": \"...\", \"comment\": \"...\", \"relatedVariant\": \"...\", \"relatedQuote\": \"...\"}]}]}",
    );
    prompt
}

fn judge_prompt(request: &JudgeRequest) -> String {
    format!(
        "List A:\n{}\n\nList B:\n{}\n\n\
         Pair annotations from A and B that make the same point about the same passage. \
         Each annotation may be used at most once. Respond with JSON:\n\
         {{\"matches\": [{{\"aIndex\": 0, \"bIndex\": 0, \"reason\": \"...\"}}]}}",
        request.listing_a, request.listing_b
    )
}
