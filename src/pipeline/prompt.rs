// Prompt assembly
//
// The assembler turns a task, the enabled resources and (when refining) the
// previous version's feedback into the single prompt string sent to the
// generator. It is a trait so callers can supply their own wording.

use std::fmt::Write as _;

use crate::config::{FeedbackToggles, PromptSet, Resource};
use crate::graph::{AnnotationAuthor, DocumentVersion, GenerationMethod};

const DEFAULT_STEP_BY_STEP: &str = "Work in steps. For each step, write your reasoning inside \
<thought>...</thought> and the resulting passage inside <text>...</text>. Only the <text> \
passages form the final document.";

const DEFAULT_REFINEMENT: &str =
    "Revise the previous version. Address the feedback where it is valid and keep what works.";

/// Feedback carried from a predecessor into a refinement prompt
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefinementFeedback {
    pub prior_text: Option<String>,
    /// Unrefuted automated annotations
    pub ai_critique: Vec<String>,
    /// Reviewer annotations and reviewer objections to automated ones
    pub human_notes: Vec<String>,
}

impl RefinementFeedback {
    /// Collect feedback from a node, honoring the inclusion toggles.
    pub fn from_node(node: &DocumentVersion, toggles: &FeedbackToggles) -> Self {
        let mut feedback = Self::default();

        if toggles.include_prior_text {
            feedback.prior_text = Some(node.content().to_string());
        }

        for annotation in node.annotations() {
            match &annotation.author {
                AnnotationAuthor::Reviewer(reviewer) => {
                    if toggles.include_human_notes {
                        feedback.human_notes.push(format!(
                            "{reviewer} on \"{}\": {}",
                            annotation.quote, annotation.comment
                        ));
                    }
                }
                _ => {
                    if toggles.include_ai_critique && !annotation.is_refuted() {
                        feedback.ai_critique.push(format!(
                            "\"{}\" [{}]: {}",
                            annotation.quote, annotation.category, annotation.comment
                        ));
                    }
                    if toggles.include_human_notes {
                        for refutation in &annotation.refutations {
                            feedback.human_notes.push(format!(
                                "{} rejected the critique \"{}\": {}",
                                refutation.reviewer, annotation.comment, refutation.reason
                            ));
                        }
                    }
                }
            }
        }

        feedback
    }

    pub fn is_empty(&self) -> bool {
        self.prior_text.is_none() && self.ai_critique.is_empty() && self.human_notes.is_empty()
    }
}

/// Everything an assembler may draw on
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub prompts: &'a PromptSet,
    pub method: GenerationMethod,
    pub resources: &'a [Resource],
    pub feedback: Option<&'a RefinementFeedback>,
}

pub trait PromptAssembler: Send + Sync {
    fn assemble(&self, context: &PromptContext<'_>) -> String;
}

/// Plain sectioned prompt: task, reference material, feedback, method instructions
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPromptAssembler;

impl PromptAssembler for DefaultPromptAssembler {
    fn assemble(&self, context: &PromptContext<'_>) -> String {
        let mut prompt = String::new();
        prompt.push_str(context.prompts.task.trim());
        prompt.push('\n');

        if !context.resources.is_empty() {
            prompt.push_str("\n## Reference material\n");
            for resource in context.resources {
                let title = if resource.title.is_empty() {
                    &resource.id
                } else {
                    &resource.title
                };
                let _ = writeln!(prompt, "\n### {title}\n{}", resource.content.trim());
            }
        }

        if let Some(feedback) = context.feedback {
            if let Some(prior) = &feedback.prior_text {
                let _ = writeln!(prompt, "\n## Previous version\n{}", prior.trim());
            }
            if !feedback.ai_critique.is_empty() {
                prompt.push_str("\n## Reviewer AI critique\n");
                for line in &feedback.ai_critique {
                    let _ = writeln!(prompt, "- {line}");
                }
            }
            if !feedback.human_notes.is_empty() {
                prompt.push_str("\n## Human notes\n");
                for line in &feedback.human_notes {
                    let _ = writeln!(prompt, "- {line}");
                }
            }
        }

        match context.method {
            GenerationMethod::RefineLoop => {
                let instruction = non_blank(&context.prompts.refinement).unwrap_or(DEFAULT_REFINEMENT);
                let _ = writeln!(prompt, "\n{instruction}");
            }
            GenerationMethod::StepByStep => {
                let instruction =
                    non_blank(&context.prompts.step_by_step).unwrap_or(DEFAULT_STEP_BY_STEP);
                let _ = writeln!(prompt, "\n{instruction}");
            }
            GenerationMethod::Standard => {}
        }

        prompt.trim_end().to_string()
    }
}

fn non_blank(s: &str) -> Option<&str> {
    let trimmed = s.trim();
    (!trimmed.is_empty()).then_some(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Annotation, NewDocument, Refutation};
    use chrono::Utc;

    fn prompts() -> PromptSet {
        PromptSet {
            task: "Describe Venice.".into(),
            ..PromptSet::default()
        }
    }

    fn node_with_annotations() -> DocumentVersion {
        let mut refuted = Annotation::new("canals", "Accuracy", "too many canals", AnnotationAuthor::Evaluator);
        refuted.refutations.push(Refutation {
            reviewer: "ana".into(),
            reason: "the count is right".into(),
            timestamp: Utc::now(),
        });
        DocumentVersion::create(NewDocument {
            parent_id: None,
            content: "Venice has canals.".into(),
            reasoning: None,
            method: GenerationMethod::Standard,
            prompts: Default::default(),
            annotations: vec![
                Annotation::new("Venice", "Style", "flat opening", AnnotationAuthor::Evaluator),
                refuted,
                Annotation::new("has", "Style", "weak verb", AnnotationAuthor::Reviewer("ben".into())),
            ],
            scores: Default::default(),
            usage: Default::default(),
            diff: None,
            protocol: None,
        })
    }

    #[test]
    fn test_feedback_all_toggles_on() {
        let feedback = RefinementFeedback::from_node(&node_with_annotations(), &FeedbackToggles::default());
        assert_eq!(feedback.prior_text.as_deref(), Some("Venice has canals."));
        assert_eq!(feedback.ai_critique, vec!["\"Venice\" [Style]: flat opening".to_string()]);
        assert_eq!(feedback.human_notes.len(), 2);
        assert!(feedback.human_notes[0].contains("the count is right"));
        assert!(feedback.human_notes[1].starts_with("ben on"));
    }

    #[test]
    fn test_feedback_toggles_filter() {
        let toggles = FeedbackToggles {
            include_prior_text: false,
            include_ai_critique: true,
            include_human_notes: false,
        };
        let feedback = RefinementFeedback::from_node(&node_with_annotations(), &toggles);
        assert!(feedback.prior_text.is_none());
        assert_eq!(feedback.ai_critique.len(), 1);
        assert!(feedback.human_notes.is_empty());

        let none = FeedbackToggles {
            include_prior_text: false,
            include_ai_critique: false,
            include_human_notes: false,
        };
        assert!(RefinementFeedback::from_node(&node_with_annotations(), &none).is_empty());
    }

    #[test]
    fn test_standard_prompt_has_resources() {
        let resources = vec![Resource {
            id: "r1".into(),
            title: String::new(),
            content: "Gondolas are black.".into(),
            enabled: true,
        }];
        let set = prompts();
        let prompt = DefaultPromptAssembler.assemble(&PromptContext {
            prompts: &set,
            method: GenerationMethod::Standard,
            resources: &resources,
            feedback: None,
        });
        assert!(prompt.starts_with("Describe Venice."));
        assert!(prompt.contains("### r1\nGondolas are black."));
        assert!(!prompt.contains("<thought>"));
    }

    #[test]
    fn test_method_instructions() {
        let set = prompts();
        let step = DefaultPromptAssembler.assemble(&PromptContext {
            prompts: &set,
            method: GenerationMethod::StepByStep,
            resources: &[],
            feedback: None,
        });
        assert!(step.contains("<thought>"));

        let feedback = RefinementFeedback {
            prior_text: Some("Old draft.".into()),
            ..Default::default()
        };
        let refine = DefaultPromptAssembler.assemble(&PromptContext {
            prompts: &set,
            method: GenerationMethod::RefineLoop,
            resources: &[],
            feedback: Some(&feedback),
        });
        assert!(refine.contains("## Previous version\nOld draft."));
        assert!(refine.ends_with(DEFAULT_REFINEMENT));
    }
}
