// Run plan — the full list of runs a protocol will execute, fixed up front

use serde::{Deserialize, Serialize};

use super::status::{validate_transition, RunStatus, RunStatusError};
use crate::config::constants::MIN_CONSISTENCY_VARIANTS;
use crate::config::{ExperimentConfig, ProtocolType};
use crate::graph::GenerationMethod;

/// Which resources a run's steps see
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceScope {
    /// The experiment's enabled resources
    Configured,
    /// No resources at all
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunKind {
    /// A seed followed by `steps - 1` refinements
    Chain {
        steps: usize,
        resources: ResourceScope,
        method_override: Option<GenerationMethod>,
    },
    /// A single generation without evaluation, re-evaluated by later runs
    BaseDocument,
    /// One fresh evaluation of the base document
    Reevaluation,
}

impl RunKind {
    /// Oracle calls this run will make.
    pub fn oracle_calls(&self) -> usize {
        match self {
            Self::Chain { steps, .. } => steps * 2,
            Self::BaseDocument | Self::Reevaluation => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRun {
    pub label: String,
    pub kind: RunKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunPlan {
    pub protocol: ProtocolType,
    pub runs: Vec<PlannedRun>,
    /// Adjustments made while planning, e.g. clamped counts
    pub notes: Vec<String>,
}

impl RunPlan {
    pub fn for_experiment(config: &ExperimentConfig) -> Self {
        let mut notes = Vec::new();
        let chain_steps = config.iterations + 1;
        let chain = |resources, method_override| RunKind::Chain {
            steps: chain_steps,
            resources,
            method_override,
        };

        let repetitions = if config.runs == 0 && !config.protocol.is_consistency() {
            notes.push("runs = 0 requested; running 1".to_string());
            1
        } else {
            config.runs
        };

        let mut runs = Vec::new();
        match config.protocol {
            ProtocolType::Convergence => {
                for i in 1..=repetitions {
                    runs.push(PlannedRun {
                        label: format!("Chain {i}"),
                        kind: chain(ResourceScope::Configured, None),
                    });
                }
            }
            ProtocolType::Comparative => {
                for _ in 0..repetitions {
                    runs.push(PlannedRun {
                        label: "Step-by-Step".to_string(),
                        kind: RunKind::Chain {
                            steps: 1,
                            resources: ResourceScope::Configured,
                            method_override: Some(GenerationMethod::StepByStep),
                        },
                    });
                    runs.push(PlannedRun {
                        label: "Refinement Loop".to_string(),
                        kind: chain(ResourceScope::Configured, None),
                    });
                }
            }
            ProtocolType::Ablation => {
                for _ in 0..repetitions {
                    runs.push(PlannedRun {
                        label: "Full Context".to_string(),
                        kind: chain(ResourceScope::Configured, None),
                    });
                    runs.push(PlannedRun {
                        label: "Zero Context".to_string(),
                        kind: chain(ResourceScope::Empty, None),
                    });
                }
            }
            ProtocolType::ConsistencyText => {
                let variants = clamp_variants(config.runs, &mut notes);
                if config.iterations > 0 {
                    notes.push(format!(
                        "iterations = {} ignored; consistency variants are single-step",
                        config.iterations
                    ));
                }
                for i in 0..variants {
                    runs.push(PlannedRun {
                        label: format!("Variant {}", variant_letter(i)),
                        kind: RunKind::Chain {
                            steps: 1,
                            resources: ResourceScope::Configured,
                            method_override: None,
                        },
                    });
                }
            }
            ProtocolType::ConsistencyAnnotation => {
                let evaluations = clamp_variants(config.runs, &mut notes);
                runs.push(PlannedRun {
                    label: "Base Document".to_string(),
                    kind: RunKind::BaseDocument,
                });
                for i in 1..=evaluations {
                    runs.push(PlannedRun {
                        label: format!("Evaluation {i}"),
                        kind: RunKind::Reevaluation,
                    });
                }
            }
            ProtocolType::Custom => {
                for i in 1..=repetitions {
                    runs.push(PlannedRun {
                        label: format!("Run {i}"),
                        kind: chain(ResourceScope::Configured, None),
                    });
                }
            }
        }

        Self {
            protocol: config.protocol,
            runs,
            notes,
        }
    }

    /// Upper bound on oracle calls, counting optional judge, highlight and
    /// commentary calls.
    pub fn oracle_call_estimate(&self, config: &ExperimentConfig) -> usize {
        let mut calls: usize = self.runs.iter().map(|r| r.kind.oracle_calls()).sum();
        if self.protocol.is_consistency() {
            let compared = self.compared_runs();
            if self.protocol == ProtocolType::ConsistencyText {
                calls += 1;
            }
            if config.consistency.use_judge {
                calls += compared * compared.saturating_sub(1) / 2;
            }
            if config.consistency.commentary {
                calls += 1;
            }
        }
        calls
    }

    /// Runs that take part in the consistency report.
    pub fn compared_runs(&self) -> usize {
        match self.protocol {
            ProtocolType::ConsistencyText => self.runs.len(),
            ProtocolType::ConsistencyAnnotation => self
                .runs
                .iter()
                .filter(|r| r.kind == RunKind::Reevaluation)
                .count(),
            _ => 0,
        }
    }
}

fn clamp_variants(requested: usize, notes: &mut Vec<String>) -> usize {
    if requested < MIN_CONSISTENCY_VARIANTS {
        notes.push(format!(
            "runs = {requested} is below the minimum of {MIN_CONSISTENCY_VARIANTS} for consistency protocols; using {MIN_CONSISTENCY_VARIANTS}"
        ));
        MIN_CONSISTENCY_VARIANTS
    } else {
        requested
    }
}

/// A, B, ..., Z, AA, AB, ...
fn variant_letter(index: usize) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(char::from(b'A' + rem as u8));
        n = (n - 1) / 26;
    }
    letters.iter().rev().collect()
}

/// One labeled branch of a protocol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentRun {
    pub id: String,
    pub label: String,
    pub kind: RunKind,
    pub status: RunStatus,
    /// Node ids in creation order
    pub node_ids: Vec<String>,
}

impl ExperimentRun {
    pub fn pending(id: String, planned: &PlannedRun) -> Self {
        Self {
            id,
            label: planned.label.clone(),
            kind: planned.kind,
            status: RunStatus::Pending,
            node_ids: Vec::new(),
        }
    }

    pub fn transition(&mut self, to: RunStatus) -> Result<(), RunStatusError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }

    pub fn last_node_id(&self) -> Option<&str> {
        self.node_ids.last().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(protocol: &str, runs: usize, iterations: usize) -> ExperimentConfig {
        ExperimentConfig::from_toml_str(&format!(
            "name = \"t\"\nprotocol = \"{protocol}\"\nruns = {runs}\niterations = {iterations}\n[prompts]\ntask = \"x\"\n"
        ))
        .unwrap()
    }

    fn labels(plan: &RunPlan) -> Vec<&str> {
        plan.runs.iter().map(|r| r.label.as_str()).collect()
    }

    #[test]
    fn test_convergence_plan() {
        let plan = RunPlan::for_experiment(&config("convergence", 2, 3));
        assert_eq!(labels(&plan), vec!["Chain 1", "Chain 2"]);
        assert_eq!(
            plan.runs[0].kind,
            RunKind::Chain {
                steps: 4,
                resources: ResourceScope::Configured,
                method_override: None
            }
        );
    }

    #[test]
    fn test_comparative_plan_interleaves() {
        let plan = RunPlan::for_experiment(&config("comparative", 2, 1));
        assert_eq!(
            labels(&plan),
            vec!["Step-by-Step", "Refinement Loop", "Step-by-Step", "Refinement Loop"]
        );
        assert_eq!(plan.runs[0].kind.oracle_calls(), 2);
        assert_eq!(plan.runs[1].kind.oracle_calls(), 4);
    }

    #[test]
    fn test_ablation_plan_scopes() {
        let plan = RunPlan::for_experiment(&config("ablation", 1, 0));
        assert_eq!(labels(&plan), vec!["Full Context", "Zero Context"]);
        assert!(matches!(
            plan.runs[1].kind,
            RunKind::Chain {
                resources: ResourceScope::Empty,
                ..
            }
        ));
    }

    #[test]
    fn test_consistency_text_clamps_variants() {
        let plan = RunPlan::for_experiment(&config("consistency_text", 1, 2));
        assert_eq!(labels(&plan), vec!["Variant A", "Variant B"]);
        assert_eq!(plan.notes.len(), 2);
    }

    #[test]
    fn test_consistency_annotation_plan() {
        let mut cfg = config("consistency_annotation", 3, 0);
        cfg.consistency.use_judge = true;
        cfg.consistency.commentary = true;
        let plan = RunPlan::for_experiment(&cfg);
        assert_eq!(
            labels(&plan),
            vec!["Base Document", "Evaluation 1", "Evaluation 2", "Evaluation 3"]
        );
        assert_eq!(plan.compared_runs(), 3);
        // base 1 + 3 evaluations + 3 judge pairs + commentary
        assert_eq!(plan.oracle_call_estimate(&cfg), 8);
    }

    #[test]
    fn test_zero_runs_for_chain_protocols() {
        let plan = RunPlan::for_experiment(&config("custom", 0, 0));
        assert_eq!(labels(&plan), vec!["Run 1"]);
        assert_eq!(plan.notes.len(), 1);
    }

    #[test]
    fn test_variant_letters() {
        assert_eq!(variant_letter(0), "A");
        assert_eq!(variant_letter(25), "Z");
        assert_eq!(variant_letter(26), "AA");
    }

    #[test]
    fn test_run_transitions() {
        let planned = PlannedRun {
            label: "Run 1".into(),
            kind: RunKind::BaseDocument,
        };
        let mut run = ExperimentRun::pending("r1".into(), &planned);
        assert!(run.transition(RunStatus::Completed).is_err());
        run.transition(RunStatus::Running).unwrap();
        run.transition(RunStatus::Failed).unwrap();
        assert!(run.transition(RunStatus::Running).is_err());
        assert_eq!(run.status, RunStatus::Failed);
    }
}
