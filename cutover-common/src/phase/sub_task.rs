use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::PhaseStatus;
use crate::plan::SubTaskSpec;

/// A named, trackable piece of work inside a phase.
/// ---
/// Sub-tasks do not nest and carry no dependencies; ordering within a
/// phase is the responsibility of the worker executing it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SubTask {
    pub id: String,
    pub name: String,
    pub status: PhaseStatus,
    pub progress: f64,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl SubTask {
    pub fn from_spec(spec: &SubTaskSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            status: PhaseStatus::Pending,
            progress: 0.0,
            metadata: spec.metadata.clone(),
        }
    }
}
