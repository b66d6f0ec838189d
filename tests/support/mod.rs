// Shared test doubles: a scripted oracle and a recording observer

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

use draftbench::config::ExperimentConfig;
use draftbench::graph::DocumentVersion;
use draftbench::oracle::{
    AnnotationCandidate, CommentaryRequest, CommentaryResponse, EvaluationRequest,
    EvaluationResponse, GenerationRequest, GenerationResponse, HighlightRequest,
    HighlightResponse, JudgeRequest, JudgeResponse, Oracle, OracleError, OracleResult,
};
use draftbench::protocol::{ProtocolObserver, RunStatus};
use draftbench::usage::TokenUsage;

/// One oracle call as seen by the double
#[derive(Debug, Clone)]
pub enum Call {
    Generate(GenerationRequest),
    Evaluate(EvaluationRequest),
    Highlight(HighlightRequest),
    Judge(JudgeRequest),
    Comment(CommentaryRequest),
}

#[derive(Default)]
struct Script {
    generations: VecDeque<String>,
    evaluations: VecDeque<OracleResult<EvaluationResponse>>,
    highlights: VecDeque<OracleResult<HighlightResponse>>,
    judgements: VecDeque<OracleResult<JudgeResponse>>,
    fail_generate_at: Option<usize>,
    generated: usize,
}

/// Deterministic oracle. Unscripted generations return `draft N`, unscripted
/// evaluations return one annotation quoting the text, and unscripted
/// highlight/judge calls return empty answers.
#[derive(Default)]
pub struct ScriptedOracle {
    script: Mutex<Script>,
    calls: Mutex<Vec<(Instant, Call)>>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_generations<I, S>(self, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script
            .lock()
            .unwrap()
            .generations
            .extend(texts.into_iter().map(Into::into));
        self
    }

    pub fn with_evaluation(self, result: OracleResult<EvaluationResponse>) -> Self {
        self.script.lock().unwrap().evaluations.push_back(result);
        self
    }

    pub fn with_highlight(self, result: OracleResult<HighlightResponse>) -> Self {
        self.script.lock().unwrap().highlights.push_back(result);
        self
    }

    pub fn with_judgement(self, result: OracleResult<JudgeResponse>) -> Self {
        self.script.lock().unwrap().judgements.push_back(result);
        self
    }

    /// Fail the `n`th generate call (1-based) with a request error.
    pub fn failing_generate_at(self, n: usize) -> Self {
        self.script.lock().unwrap().fail_generate_at = Some(n);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().iter().map(|(_, c)| c.clone()).collect()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn generate_calls(&self) -> Vec<GenerationRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Generate(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn evaluate_calls(&self) -> Vec<EvaluationRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Evaluate(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn judge_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Judge(_)))
            .count()
    }

    pub fn highlight_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Highlight(_)))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push((Instant::now(), call));
    }
}

pub fn usage(prompt: u64, output: u64) -> Option<TokenUsage> {
    Some(TokenUsage::from_counts(prompt, output))
}

pub fn candidate(quote: &str, category: &str, comment: &str) -> AnnotationCandidate {
    AnnotationCandidate {
        quote: quote.to_string(),
        category: category.to_string(),
        comment: comment.to_string(),
        source_id: None,
        source_quote: None,
    }
}

pub fn evaluation(candidates: Vec<AnnotationCandidate>, scores: &[(&str, i64)]) -> EvaluationResponse {
    EvaluationResponse {
        candidates,
        scores: scores
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::json!(v)))
            .collect::<BTreeMap<_, _>>(),
        usage: usage(10, 5),
    }
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn generate(&self, request: &GenerationRequest) -> OracleResult<GenerationResponse> {
        self.record(Call::Generate(request.clone()));
        let mut script = self.script.lock().unwrap();
        script.generated += 1;
        if script.fail_generate_at == Some(script.generated) {
            return Err(OracleError::request("generate", "connection reset"));
        }
        let n = script.generated;
        let text = script
            .generations
            .pop_front()
            .unwrap_or_else(|| format!("draft {n}"));
        Ok(GenerationResponse {
            text,
            reasoning: None,
            usage: usage(100, 50),
        })
    }

    async fn evaluate(&self, request: &EvaluationRequest) -> OracleResult<EvaluationResponse> {
        self.record(Call::Evaluate(request.clone()));
        let scripted = self.script.lock().unwrap().evaluations.pop_front();
        scripted.unwrap_or_else(|| {
            Ok(evaluation(
                vec![candidate(&request.text, "clarity", "could be tighter")],
                &[],
            ))
        })
    }

    async fn highlight(&self, request: &HighlightRequest) -> OracleResult<HighlightResponse> {
        self.record(Call::Highlight(request.clone()));
        let scripted = self.script.lock().unwrap().highlights.pop_front();
        scripted.unwrap_or_else(|| Ok(HighlightResponse::default()))
    }

    async fn judge(&self, request: &JudgeRequest) -> OracleResult<JudgeResponse> {
        self.record(Call::Judge(request.clone()));
        let scripted = self.script.lock().unwrap().judgements.pop_front();
        scripted.unwrap_or_else(|| Ok(JudgeResponse::default()))
    }

    async fn comment(&self, request: &CommentaryRequest) -> OracleResult<CommentaryResponse> {
        self.record(Call::Comment(request.clone()));
        Ok(CommentaryResponse {
            text: "The variants broadly agree.".to_string(),
            usage: usage(20, 10),
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Observer event, in delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Appended { run_id: String, node_id: String },
    Status { run_id: String, status: RunStatus },
    Log(String),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn statuses_for(&self, run_id: &str) -> Vec<RunStatus> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status { run_id: id, status } if id == run_id => Some(status),
                _ => None,
            })
            .collect()
    }

    pub fn appended(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Appended { run_id, node_id } => Some((run_id, node_id)),
                _ => None,
            })
            .collect()
    }
}

impl ProtocolObserver for RecordingObserver {
    fn on_step_appended(&self, run_id: &str, node: &DocumentVersion) {
        self.events.lock().unwrap().push(Event::Appended {
            run_id: run_id.to_string(),
            node_id: node.id().to_string(),
        });
    }

    fn on_run_status_changed(&self, run_id: &str, status: RunStatus) {
        self.events.lock().unwrap().push(Event::Status {
            run_id: run_id.to_string(),
            status,
        });
    }

    fn on_log_line(&self, message: &str) {
        self.events.lock().unwrap().push(Event::Log(message.to_string()));
    }

    fn resolve_run_id(&self, _label: &str, index: usize) -> String {
        format!("run-{index}")
    }
}

/// Experiment with zero pacing and one category, overridden by `extra` TOML.
pub fn experiment(protocol: &str, runs: usize, iterations: usize, extra: &str) -> ExperimentConfig {
    ExperimentConfig::from_toml_str(&format!(
        r#"
name = "test"
protocol = "{protocol}"
runs = {runs}
iterations = {iterations}
pacing_ms = 0
{extra}

[models]
generator = "gen-model"
evaluator = "eval-model"

[prompts]
system_instruction = "You write short essays."
task = "Write about rivers."

[[resources]]
id = "r1"
title = "Field notes"
content = "Rivers carve valleys."

[[categories]]
id = "clarity"
name = "Clarity"
"#
    ))
    .unwrap()
}
