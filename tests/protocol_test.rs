// Protocol runner integration tests against a scripted oracle

mod support;

use std::sync::Arc;
use std::time::Duration;

use draftbench::consistency::ReportMode;
use draftbench::graph::{AnnotationAuthor, GenerationMethod, VersionGraph, AI_RATER};
use draftbench::oracle::{
    HighlightAnnotation, HighlightKind, HighlightResponse, OracleError, VariantHighlights,
};
use draftbench::protocol::{ProtocolRunner, RunStatus};

use support::{candidate, evaluation, experiment, Event, RecordingObserver, ScriptedOracle};

fn runner(oracle: &Arc<ScriptedOracle>, observer: &Arc<RecordingObserver>) -> ProtocolRunner {
    ProtocolRunner::new(oracle.clone(), VersionGraph::shared(), observer.clone())
}

#[tokio::test]
async fn test_convergence_without_iterations_is_one_root() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner.execute(&experiment("convergence", 1, 0, "")).await.unwrap();

    let graph = runner.graph().read().await;
    assert_eq!(graph.len(), 1);
    let node = &graph.nodes()[0];
    assert!(node.parent_id().is_none());
    assert!(node.diff().is_none());
    assert_eq!(node.method(), GenerationMethod::Standard);

    assert_eq!(outcome.runs.len(), 1);
    assert_eq!(outcome.runs[0].status, RunStatus::Completed);
    assert!(outcome.report.is_none());
    assert_eq!(
        observer.statuses_for("run-0"),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Completed]
    );
}

#[tokio::test]
async fn test_convergence_chains_are_linear() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner.execute(&experiment("convergence", 2, 2, "")).await.unwrap();

    let graph = runner.graph().read().await;
    assert_eq!(graph.len(), 6);
    for run in &outcome.runs {
        assert_eq!(run.node_ids.len(), 3);
        let lineage: Vec<&str> = graph
            .lineage(run.last_node_id().unwrap())
            .iter()
            .map(|n| n.id())
            .collect();
        assert_eq!(lineage, run.node_ids.iter().map(String::as_str).collect::<Vec<_>>());

        let methods: Vec<GenerationMethod> = run
            .node_ids
            .iter()
            .map(|id| graph.get(id).unwrap().method())
            .collect();
        assert_eq!(
            methods,
            vec![
                GenerationMethod::Standard,
                GenerationMethod::RefineLoop,
                GenerationMethod::RefineLoop
            ]
        );
        for id in &run.node_ids[1..] {
            assert!(graph.get(id).unwrap().diff().is_some());
        }
    }

    // 6 generations at 150 tokens, 6 evaluations at 15
    assert_eq!(outcome.usage.total_tokens, 6 * 165);
    assert_eq!(observer.appended().len(), 6);
}

#[tokio::test]
async fn test_refinement_prompt_carries_prior_text_and_critique() {
    let oracle = Arc::new(ScriptedOracle::new().with_generations(["The river bends twice."]));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    runner.execute(&experiment("convergence", 1, 1, "")).await.unwrap();

    let generations = oracle.generate_calls();
    assert_eq!(generations.len(), 2);
    assert_eq!(generations[0].method, GenerationMethod::Standard);
    assert_eq!(generations[1].method, GenerationMethod::RefineLoop);
    assert!(generations[1].full_prompt.contains("The river bends twice."));
    assert!(generations[1].full_prompt.contains("could be tighter"));
    assert_eq!(generations[0].system_instruction, "You write short essays.");
}

#[tokio::test]
async fn test_comparative_run_order() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner.execute(&experiment("comparative", 1, 1, "")).await.unwrap();

    let labels: Vec<&str> = outcome.runs.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Step-by-Step", "Refinement Loop"]);
    assert_eq!(outcome.runs[0].node_ids.len(), 1);
    assert_eq!(outcome.runs[1].node_ids.len(), 2);

    let methods: Vec<GenerationMethod> = oracle.generate_calls().iter().map(|g| g.method).collect();
    assert_eq!(
        methods,
        vec![
            GenerationMethod::StepByStep,
            GenerationMethod::Standard,
            GenerationMethod::RefineLoop
        ]
    );
}

#[tokio::test]
async fn test_ablation_zero_context_sees_no_resources() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner.execute(&experiment("ablation", 1, 0, "")).await.unwrap();

    let labels: Vec<&str> = outcome.runs.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Full Context", "Zero Context"]);

    let generations = oracle.generate_calls();
    assert!(generations[0].full_prompt.contains("Rivers carve valleys."));
    assert!(!generations[1].full_prompt.contains("Rivers carve valleys."));

    let evaluations = oracle.evaluate_calls();
    assert_eq!(evaluations[0].resources.len(), 1);
    assert!(evaluations[1].resources.is_empty());
}

#[tokio::test]
async fn test_consistency_text_compares_every_pair() {
    let highlights = HighlightResponse {
        variants: vec![VariantHighlights {
            label: "Variant A".to_string(),
            annotations: vec![HighlightAnnotation {
                kind: HighlightKind::Addition,
                quote: "draft 1".to_string(),
                comment: "only this variant says so".to_string(),
                related_variant: Some("Variant B".to_string()),
                related_quote: None,
            }],
        }],
        usage: None,
    };
    let oracle = Arc::new(ScriptedOracle::new().with_highlight(Ok(highlights)));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner
        .execute(&experiment("consistency_text", 3, 0, ""))
        .await
        .unwrap();

    assert_eq!(outcome.runs.len(), 3);
    assert!(outcome.runs.iter().all(|r| r.node_ids.len() == 1));
    assert_eq!(oracle.highlight_count(), 1);
    assert_eq!(oracle.judge_count(), 0);

    let report = outcome.report.unwrap();
    assert_eq!(report.mode, ReportMode::Full);
    assert_eq!(report.variant_labels, vec!["Variant A", "Variant B", "Variant C"]);
    assert_eq!(report.pairwise.len(), 3);
    assert!(report.pairwise.iter().all(|p| p.text.is_some()));
    assert_eq!(report.variants.len(), 3);

    let graph = runner.graph().read().await;
    let a = graph.get(outcome.runs[0].last_node_id().unwrap()).unwrap();
    let highlighted: Vec<_> = a
        .annotations()
        .iter()
        .filter(|ann| ann.author == AnnotationAuthor::Highlighter)
        .collect();
    assert_eq!(highlighted.len(), 1);
    assert_eq!(highlighted[0].category, "ADDITION");
    assert_eq!(highlighted[0].related_variant.as_deref(), Some("Variant B"));

    let b = graph.get(outcome.runs[1].last_node_id().unwrap()).unwrap();
    assert!(b.annotations().iter().all(|ann| ann.author == AnnotationAuthor::Evaluator));
}

#[tokio::test]
async fn test_consistency_text_judge_and_commentary() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let config = experiment(
        "consistency_text",
        3,
        0,
        "[consistency]\nuse_judge = true\ncommentary = true\nbaseline = 0\n",
    );
    let outcome = runner.execute(&config).await.unwrap();

    // Every variant carries one evaluator annotation, so every pair is judged
    assert_eq!(oracle.judge_count(), 3);
    let report = outcome.report.unwrap();
    assert_eq!(report.commentary.as_deref(), Some("The variants broadly agree."));

    let baseline = report.baseline.unwrap();
    assert_eq!(baseline.baseline_label, "Variant A");
    assert_eq!(baseline.comparisons.len(), 2);
    assert!(baseline.comparisons.iter().all(|c| c.a_label == "Variant A"));
}

#[tokio::test]
async fn test_malformed_highlights_add_nothing() {
    let oracle = Arc::new(
        ScriptedOracle::new().with_highlight(Err(OracleError::malformed("highlight", "not json"))),
    );
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner
        .execute(&experiment("consistency_text", 2, 0, ""))
        .await
        .unwrap();

    assert!(outcome.report.is_some());
    let graph = runner.graph().read().await;
    assert!(graph
        .nodes()
        .iter()
        .flat_map(|n| n.annotations())
        .all(|a| a.author != AnnotationAuthor::Highlighter));
}

#[tokio::test]
async fn test_consistency_annotation_reevaluates_one_document() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner
        .execute(&experiment("consistency_annotation", 2, 0, ""))
        .await
        .unwrap();

    let labels: Vec<&str> = outcome.runs.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["Base Document", "Evaluation 1", "Evaluation 2"]);
    assert_eq!(oracle.generate_calls().len(), 1);
    assert_eq!(oracle.evaluate_calls().len(), 2);

    let graph = runner.graph().read().await;
    let base_id = outcome.runs[0].last_node_id().unwrap();
    let base = graph.get(base_id).unwrap();
    assert!(base.annotations().is_empty());

    for run in &outcome.runs[1..] {
        let node = graph.get(run.last_node_id().unwrap()).unwrap();
        assert_eq!(node.parent_id(), Some(base_id));
        assert_eq!(node.content(), base.content());
        assert!(node.diff().unwrap().is_unchanged());
        assert_eq!(node.annotations().len(), 1);
    }

    let report = outcome.report.unwrap();
    assert_eq!(report.mode, ReportMode::AnnotationOnly);
    assert_eq!(report.variant_labels, vec!["Evaluation 1", "Evaluation 2"]);
    assert_eq!(report.pairwise.len(), 1);
    assert!(report.pairwise[0].text.is_none());
    assert_eq!(report.pairwise[0].annotations.shared, 1);
}

#[tokio::test]
async fn test_failure_marks_run_failed_and_keeps_nodes() {
    let oracle = Arc::new(ScriptedOracle::new().failing_generate_at(3));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let err = runner
        .execute(&experiment("convergence", 3, 1, ""))
        .await
        .unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("aborted in run 'Chain 2'"), "{message}");
    assert!(message.contains("connection reset"), "{message}");

    assert_eq!(runner.graph().read().await.len(), 2);
    assert_eq!(
        observer.statuses_for("run-0"),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Completed]
    );
    assert_eq!(
        observer.statuses_for("run-1"),
        vec![RunStatus::Pending, RunStatus::Running, RunStatus::Failed]
    );
    assert_eq!(observer.statuses_for("run-2"), vec![RunStatus::Pending]);
    assert!(observer
        .events()
        .iter()
        .any(|e| matches!(e, Event::Log(line) if line.starts_with("Run 'Chain 2' failed"))));
}

#[tokio::test]
async fn test_evaluation_request_failure_aborts() {
    let oracle = Arc::new(
        ScriptedOracle::new().with_evaluation(Err(OracleError::request("evaluate", "timeout"))),
    );
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    assert!(runner.execute(&experiment("convergence", 1, 0, "")).await.is_err());
    assert!(runner.graph().read().await.is_empty());
    assert_eq!(observer.statuses_for("run-0").last(), Some(&RunStatus::Failed));
}

#[tokio::test]
async fn test_malformed_evaluation_yields_bare_node() {
    let oracle = Arc::new(
        ScriptedOracle::new().with_evaluation(Err(OracleError::malformed("evaluate", "no JSON found"))),
    );
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let outcome = runner.execute(&experiment("convergence", 1, 0, "")).await.unwrap();

    assert_eq!(outcome.runs[0].status, RunStatus::Completed);
    let graph = runner.graph().read().await;
    let node = &graph.nodes()[0];
    assert!(node.annotations().is_empty());
    assert!(node.scores().is_empty());
}

#[tokio::test]
async fn test_scores_are_normalized_onto_category_ids() {
    let oracle = Arc::new(ScriptedOracle::new().with_evaluation(Ok(evaluation(
        vec![candidate("Rivers", "Clarity", "vague opening")],
        &[("Clarity", 87), ("Unknown", 40)],
    ))));
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    runner.execute(&experiment("convergence", 1, 0, "")).await.unwrap();

    let graph = runner.graph().read().await;
    let node = &graph.nodes()[0];
    assert_eq!(node.score("clarity", AI_RATER), Some(87));
    assert_eq!(node.ai_scores().len(), 1);
    assert_eq!(node.annotations()[0].category, "clarity");
}

#[tokio::test(start_paused = true)]
async fn test_pacing_follows_every_oracle_call() {
    let oracle = Arc::new(ScriptedOracle::new());
    let observer = Arc::new(RecordingObserver::default());
    let runner = runner(&oracle, &observer);

    let mut config = experiment("convergence", 1, 1, "");
    config.pacing_ms = 1500;

    let started = tokio::time::Instant::now();
    runner.execute(&config).await.unwrap();

    let times = oracle.call_times();
    assert_eq!(times.len(), 4);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(1500));
    }
    assert!(started.elapsed() >= Duration::from_millis(6000));
}
