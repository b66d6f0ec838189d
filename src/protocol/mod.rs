// Protocol execution: run planning, the status state machine, observer
// callbacks and the runner that ties them to the generation pipeline

mod observer;
mod plan;
mod runner;
mod status;

pub use observer::{ProtocolObserver, TracingObserver};
pub use plan::{ExperimentRun, PlannedRun, ResourceScope, RunKind, RunPlan};
pub use runner::{ProtocolOutcome, ProtocolRunner};
pub use status::{allowed_transitions, validate_transition, RunStatus, RunStatusError};
