// Cross-variant consistency analysis: annotation alignment and report metrics

pub mod matching;
pub mod report;

pub use matching::{
    filter_judge_matches, AnnotationMatcher, GreedyMatcher, JudgeConfig, MatchOutcome,
    MatchSource, MatchStrategy, MatchedPair,
};
pub use report::{
    BaselineComparison, CategoryDelta, CommentaryConfig, ConsistencyReport, PairwiseComparison,
    ReportBuilder, ReportMode, ReportVariant, TextMetrics, VariantBreakdown,
};
