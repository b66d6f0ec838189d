// Generation-step pipeline: prompt assembly plus the per-node oracle sequence

mod prompt;
mod step;

pub use prompt::{DefaultPromptAssembler, PromptAssembler, PromptContext, RefinementFeedback};
pub use step::{normalize_scores, GenerationStep, StepInput};
