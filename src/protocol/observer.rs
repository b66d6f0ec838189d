// Protocol observer — how a caller watches a protocol execute

use super::status::RunStatus;
use crate::graph::DocumentVersion;

/// Callbacks invoked synchronously by the runner, in execution order.
pub trait ProtocolObserver: Send + Sync {
    /// A node was appended to the graph for `run_id`.
    fn on_step_appended(&self, run_id: &str, node: &DocumentVersion);

    fn on_run_status_changed(&self, run_id: &str, status: RunStatus);

    /// Human-readable progress line.
    fn on_log_line(&self, message: &str);

    /// Choose the id for a planned run. `index` is the run's position in the plan.
    fn resolve_run_id(&self, label: &str, index: usize) -> String {
        let _ = label;
        format!("run-{}-{}", index, uuid::Uuid::new_v4().simple())
    }
}

/// Observer that turns every callback into a tracing event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl ProtocolObserver for TracingObserver {
    fn on_step_appended(&self, run_id: &str, node: &DocumentVersion) {
        tracing::info!(
            run_id,
            node = node.id(),
            method = node.method().as_str(),
            annotations = node.annotations().len(),
            "Step appended"
        );
    }

    fn on_run_status_changed(&self, run_id: &str, status: RunStatus) {
        tracing::info!(run_id, %status, "Run status changed");
    }

    fn on_log_line(&self, message: &str) {
        tracing::info!("{message}");
    }
}
