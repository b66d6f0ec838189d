// Protocol runner — sequences generation steps into runs and runs into a
// protocol, publishing every node and status change as it happens
//
// All oracle calls are awaited one after another. The graph lock is taken
// only to read a predecessor or append a node, never across an oracle call.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::sync::Arc;

use super::observer::ProtocolObserver;
use super::plan::{ExperimentRun, ResourceScope, RunKind, RunPlan};
use super::status::RunStatus;
use crate::config::{ExperimentConfig, ProtocolType, Resource};
use crate::consistency::{
    AnnotationMatcher, CommentaryConfig, ConsistencyReport, GreedyMatcher, JudgeConfig,
    MatchStrategy, ReportBuilder, ReportMode, ReportVariant,
};
use crate::graph::{Annotation, AnnotationAuthor, DocumentVersion, SharedGraph};
use crate::oracle::{HighlightRequest, LabeledText, Oracle};
use crate::pipeline::{DefaultPromptAssembler, GenerationStep, PromptAssembler, StepInput};
use crate::usage::TokenUsage;

/// What a completed protocol hands back
#[derive(Debug, Clone, Serialize)]
pub struct ProtocolOutcome {
    pub runs: Vec<ExperimentRun>,
    /// Usage of every oracle call made during the execution
    pub usage: TokenUsage,
    /// Present for consistency protocols only
    pub report: Option<ConsistencyReport>,
}

pub struct ProtocolRunner {
    oracle: Arc<dyn Oracle>,
    assembler: Arc<dyn PromptAssembler>,
    matcher: Arc<dyn MatchStrategy>,
    graph: SharedGraph,
    observer: Arc<dyn ProtocolObserver>,
}

impl ProtocolRunner {
    pub fn new(oracle: Arc<dyn Oracle>, graph: SharedGraph, observer: Arc<dyn ProtocolObserver>) -> Self {
        Self {
            oracle,
            assembler: Arc::new(DefaultPromptAssembler),
            matcher: Arc::new(GreedyMatcher::default()),
            graph,
            observer,
        }
    }

    pub fn with_assembler(mut self, assembler: Arc<dyn PromptAssembler>) -> Self {
        self.assembler = assembler;
        self
    }

    pub fn with_match_strategy(mut self, matcher: Arc<dyn MatchStrategy>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Execute the experiment's protocol to completion.
    ///
    /// On failure the current run is marked failed, the remaining runs stay
    /// pending, nodes already appended stay in the graph, and no report is
    /// built.
    pub async fn execute(&self, config: &ExperimentConfig) -> Result<ProtocolOutcome> {
        let plan = RunPlan::for_experiment(config);
        for note in &plan.notes {
            tracing::warn!("{note}");
            self.observer.on_log_line(note);
        }

        let mut runs: Vec<ExperimentRun> = plan
            .runs
            .iter()
            .enumerate()
            .map(|(index, planned)| {
                let id = self.observer.resolve_run_id(&planned.label, index);
                ExperimentRun::pending(id, planned)
            })
            .collect();
        for run in &runs {
            self.observer.on_run_status_changed(&run.id, run.status);
        }

        self.observer.on_log_line(&format!(
            "Starting '{}' ({:?}): {} run(s) via {}",
            config.name,
            config.protocol,
            runs.len(),
            self.oracle.name()
        ));

        let step = GenerationStep::new(config, self.oracle.as_ref(), self.assembler.as_ref());
        let configured_resources = config.enabled_resources();
        let mut usage = TokenUsage::default();
        let mut base_node_id: Option<String> = None;

        for run in runs.iter_mut() {
            self.set_status(run, RunStatus::Running)?;
            self.observer.on_log_line(&format!("Run '{}' started", run.label));

            let result = match run.kind {
                RunKind::Chain {
                    steps,
                    resources,
                    method_override,
                } => {
                    let resources: &[Resource] = match resources {
                        ResourceScope::Configured => &configured_resources,
                        ResourceScope::Empty => &[],
                    };
                    self.run_chain(&step, run, steps, resources, method_override, &mut usage)
                        .await
                }
                RunKind::BaseDocument => {
                    let result = self
                        .run_base(&step, run, &configured_resources, &mut usage)
                        .await;
                    base_node_id = run.last_node_id().map(str::to_string);
                    result
                }
                RunKind::Reevaluation => match base_node_id.as_deref() {
                    Some(base_id) => {
                        self.run_reevaluation(&step, run, base_id, &configured_resources, &mut usage)
                            .await
                    }
                    None => Err(anyhow!("no base document to re-evaluate")),
                },
            };

            if let Err(e) = result {
                self.set_status(run, RunStatus::Failed)?;
                let message = format!("Run '{}' failed: {e:#}", run.label);
                tracing::error!("{message}");
                self.observer.on_log_line(&message);
                return Err(e.context(format!(
                    "Protocol '{}' aborted in run '{}'",
                    config.name, run.label
                )));
            }

            self.set_status(run, RunStatus::Completed)?;
            self.observer.on_log_line(&format!(
                "Run '{}' completed with {} node(s)",
                run.label,
                run.node_ids.len()
            ));
        }

        let report = match config.protocol {
            ProtocolType::ConsistencyText => {
                usage.absorb(&self.merge_highlights(config, &runs).await?);
                Some(self.build_report(config, &runs, ReportMode::Full, &mut usage).await?)
            }
            ProtocolType::ConsistencyAnnotation => {
                let evaluations: Vec<ExperimentRun> = runs
                    .iter()
                    .filter(|r| r.kind == RunKind::Reevaluation)
                    .cloned()
                    .collect();
                Some(
                    self.build_report(config, &evaluations, ReportMode::AnnotationOnly, &mut usage)
                        .await?,
                )
            }
            _ => None,
        };

        if let Some(report) = &report {
            self.observer.on_log_line(&report.summary);
        }

        Ok(ProtocolOutcome {
            runs,
            usage,
            report,
        })
    }

    fn set_status(&self, run: &mut ExperimentRun, status: RunStatus) -> Result<()> {
        run.transition(status)?;
        self.observer.on_run_status_changed(&run.id, status);
        Ok(())
    }

    async fn append(&self, run: &mut ExperimentRun, node: DocumentVersion, usage: &mut TokenUsage) -> Result<()> {
        usage.absorb(node.usage());
        {
            let mut graph = self.graph.write().await;
            graph.append(node.clone())?;
        }
        run.node_ids.push(node.id().to_string());
        self.observer.on_step_appended(&run.id, &node);
        Ok(())
    }

    async fn read_node(&self, id: &str) -> Result<DocumentVersion> {
        let graph = self.graph.read().await;
        graph
            .get(id)
            .cloned()
            .with_context(|| format!("node {id} vanished from the graph"))
    }

    async fn run_chain(
        &self,
        step: &GenerationStep<'_>,
        run: &mut ExperimentRun,
        steps: usize,
        resources: &[Resource],
        method_override: Option<crate::graph::GenerationMethod>,
        usage: &mut TokenUsage,
    ) -> Result<()> {
        for index in 0..steps {
            // Re-read so reviewer edits made since the last step are seen
            let predecessor = match run.last_node_id() {
                Some(id) => Some(self.read_node(id).await?),
                None => None,
            };

            let node = step
                .run(StepInput {
                    run_id: &run.id,
                    run_label: &run.label,
                    predecessor: predecessor.as_ref(),
                    step: index,
                    iteration: index,
                    resources,
                    method_override,
                    evaluate: true,
                })
                .await?;
            self.append(run, node, usage).await?;
        }
        Ok(())
    }

    async fn run_base(
        &self,
        step: &GenerationStep<'_>,
        run: &mut ExperimentRun,
        resources: &[Resource],
        usage: &mut TokenUsage,
    ) -> Result<()> {
        let node = step
            .run(StepInput {
                run_id: &run.id,
                run_label: &run.label,
                predecessor: None,
                step: 0,
                iteration: 0,
                resources,
                method_override: None,
                evaluate: false,
            })
            .await?;
        self.append(run, node, usage).await
    }

    async fn run_reevaluation(
        &self,
        step: &GenerationStep<'_>,
        run: &mut ExperimentRun,
        base_id: &str,
        resources: &[Resource],
        usage: &mut TokenUsage,
    ) -> Result<()> {
        let base = self.read_node(base_id).await?;
        let node = step
            .reevaluate(
                &base,
                StepInput {
                    run_id: &run.id,
                    run_label: &run.label,
                    predecessor: Some(&base),
                    step: 0,
                    iteration: 0,
                    resources,
                    method_override: None,
                    evaluate: true,
                },
            )
            .await?;
        self.append(run, node, usage).await
    }

    /// Ask the highlighting oracle for cross-variant annotations and attach
    /// them to each variant's node. Unparsable output adds nothing.
    async fn merge_highlights(&self, config: &ExperimentConfig, runs: &[ExperimentRun]) -> Result<TokenUsage> {
        let mut variants = Vec::with_capacity(runs.len());
        for run in runs {
            let node_id = run
                .last_node_id()
                .with_context(|| format!("run '{}' produced no node", run.label))?;
            let node = self.read_node(node_id).await?;
            variants.push((run, node_id.to_string(), node.content().to_string()));
        }

        let request = HighlightRequest {
            original_text: config.prompts.task.clone(),
            variants: variants
                .iter()
                .map(|(run, _, text)| LabeledText {
                    label: run.label.clone(),
                    text: text.clone(),
                })
                .collect(),
            model: config.models.highlighter_model().to_string(),
        };

        let result = self.oracle.highlight(&request).await;
        let pacing = config.pacing();
        if !pacing.is_zero() {
            tokio::time::sleep(pacing).await;
        }

        let response = match result {
            Ok(response) => response,
            Err(e) if e.is_malformed() => {
                let message = format!("{e}; no cross-variant highlights added");
                tracing::warn!("{message}");
                self.observer.on_log_line(&message);
                return Ok(TokenUsage::default());
            }
            Err(e) => return Err(anyhow!(e).context("Cross-variant highlighting failed")),
        };

        let mut added = 0;
        {
            let mut graph = self.graph.write().await;
            for (run, node_id, _) in &variants {
                let annotations: Vec<Annotation> = response
                    .for_label(&run.label)
                    .iter()
                    .map(|h| {
                        Annotation::new(
                            h.quote.clone(),
                            h.kind.as_str(),
                            h.comment.clone(),
                            AnnotationAuthor::Highlighter,
                        )
                        .with_relation(h.related_variant.clone(), h.related_quote.clone())
                    })
                    .collect();
                added += annotations.len();
                graph.add_annotations(node_id, annotations)?;
            }
        }

        self.observer
            .on_log_line(&format!("Merged {added} cross-variant highlight(s)"));
        Ok(response.usage.unwrap_or_default())
    }

    async fn build_report(
        &self,
        config: &ExperimentConfig,
        runs: &[ExperimentRun],
        mode: ReportMode,
        usage: &mut TokenUsage,
    ) -> Result<ConsistencyReport> {
        let mut variants = Vec::with_capacity(runs.len());
        for run in runs {
            let node_id = run
                .last_node_id()
                .with_context(|| format!("run '{}' produced no node", run.label))?;
            let node = self.read_node(node_id).await?;
            variants.push(ReportVariant::from_node(run.label.clone(), &node));
        }

        let pacing = config.pacing();
        let mut matcher = AnnotationMatcher::new(self.matcher.as_ref());
        if config.consistency.use_judge {
            matcher = matcher.with_judge(
                JudgeConfig {
                    oracle: self.oracle.as_ref(),
                    model: config.models.judge_model(),
                },
                pacing,
            );
        }

        let mut builder = ReportBuilder::new(matcher);
        if config.consistency.commentary {
            builder = builder.with_commentary(
                CommentaryConfig {
                    oracle: self.oracle.as_ref(),
                    model: config.models.commentary_model(),
                },
                pacing,
            );
        }

        let (report, report_usage) = builder
            .build(&variants, mode, config.consistency.baseline)
            .await;
        usage.absorb(&report_usage);
        Ok(report)
    }
}
