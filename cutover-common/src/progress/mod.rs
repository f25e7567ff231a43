use serde_json::Value;

/// Seam between data-plane workers and the progress tracker.
/// ---
/// Workers report percent-complete for their phase through this trait
/// instead of calling tracker internals, so they can be unit-tested
/// against a recording fake. Implementations must be cheap and must
/// never block on network I/O.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, phase_id: &str, percent: f64, metadata: Option<Value>);
}

/// Reporter that discards everything; used by dry-run planning.
#[derive(Debug, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _phase_id: &str, _percent: f64, _metadata: Option<Value>) {}
}
