// Oracle — the injected capability behind every model call
//
// Generation, evaluation, cross-variant highlighting, annotation judging and
// commentary all go through one trait object so tests can swap in a
// deterministic double.

use async_trait::async_trait;

mod error;
mod llm;
pub mod parse;
pub mod trace;
mod types;

pub use error::OracleError;
pub use llm::LlmOracle;
pub use trace::{parse_trace, ParsedTrace};
pub use types::{
    AnnotationCandidate, CommentaryRequest, CommentaryResponse, EvaluationRequest,
    EvaluationResponse, GenerationRequest, GenerationResponse, HighlightAnnotation,
    HighlightKind, HighlightRequest, HighlightResponse, JudgeMatch, JudgeRequest, JudgeResponse,
    LabeledText, VariantHighlights,
};

pub type OracleResult<T> = std::result::Result<T, OracleError>;

/// External generation/evaluation service
///
/// Implementations never retry. `OracleError::Request` means the call
/// failed outright; `OracleError::Malformed` means the service answered but
/// the answer could not be understood.
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> OracleResult<GenerationResponse>;

    async fn evaluate(&self, request: &EvaluationRequest) -> OracleResult<EvaluationResponse>;

    async fn highlight(&self, request: &HighlightRequest) -> OracleResult<HighlightResponse>;

    async fn judge(&self, request: &JudgeRequest) -> OracleResult<JudgeResponse>;

    async fn comment(&self, request: &CommentaryRequest) -> OracleResult<CommentaryResponse>;

    /// Name for logs
    fn name(&self) -> &str;
}
