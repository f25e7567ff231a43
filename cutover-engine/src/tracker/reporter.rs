use std::{collections::BTreeMap, sync::Arc};

use serde_json::Value;
use tracing::warn;

use cutover_common::progress::ProgressReporter;

use super::ProgressTracker;

/// Reporter handed to data-plane workers, forwarding their progress
/// into the tracker. Workers stay decoupled from tracker internals and
/// can be tested against a recording fake instead.
pub struct TrackerReporter {
    tracker: Arc<ProgressTracker>,
}

impl TrackerReporter {
    pub fn new(tracker: Arc<ProgressTracker>) -> Self {
        Self { tracker }
    }
}

impl ProgressReporter for TrackerReporter {
    fn report(&self, phase_id: &str, percent: f64, metadata: Option<Value>) {
        let metadata = metadata.and_then(|value| match value {
            Value::Object(map) => Some(map.into_iter().collect::<BTreeMap<String, Value>>()),
            _ => None,
        });

        // A report racing a phase transition is dropped, not escalated:
        // progress reporting is advisory.
        if let Err(e) = self.tracker.update_phase_progress(phase_id, percent, metadata) {
            warn!(phase_id, error = %e, "Dropped progress report");
        }
    }
}
