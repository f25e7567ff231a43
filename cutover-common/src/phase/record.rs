use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{PhaseKind, PhaseStatus, SubTask};
use crate::plan::PhaseSpec;

/// Runtime record for one top-level migration phase.
/// ---
/// Created from a `PhaseSpec` at `initialize_migration` time and mutated
/// only through the progress tracker. `errors` and `warnings` are
/// append-only; history is never rewritten.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationPhase {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub kind: PhaseKind,
    pub status: PhaseStatus,
    /// Percent complete in [0, 100], non-decreasing while not failed.
    pub progress: f64,
    pub sub_tasks: Vec<SubTask>,
    pub depends_on: Vec<String>,
    pub estimated_duration_minutes: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl MigrationPhase {
    pub fn from_spec(spec: &PhaseSpec) -> Self {
        Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            kind: spec.kind,
            status: PhaseStatus::Pending,
            progress: 0.0,
            sub_tasks: spec.sub_tasks.iter().map(SubTask::from_spec).collect(),
            depends_on: spec.depends_on.clone(),
            estimated_duration_minutes: spec.estimated_duration_minutes,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: spec.metadata.clone(),
            start_time: None,
            end_time: None,
        }
    }

    /// Mean of sub-task progresses, when any sub-tasks exist.
    pub fn derived_progress(&self) -> Option<f64> {
        if self.sub_tasks.is_empty() {
            return None;
        }

        let sum: f64 = self.sub_tasks.iter().map(|st| st.progress).sum();
        Some(sum / self.sub_tasks.len() as f64)
    }

    pub fn sub_task(&self, sub_task_id: &str) -> Option<&SubTask> {
        self.sub_tasks.iter().find(|st| st.id == sub_task_id)
    }

    pub fn sub_task_mut(&mut self, sub_task_id: &str) -> Option<&mut SubTask> {
        self.sub_tasks.iter_mut().find(|st| st.id == sub_task_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::SubTaskSpec;

    fn phase_with_sub_progress(progresses: &[f64]) -> MigrationPhase {
        let spec = PhaseSpec {
            id: "db".to_string(),
            name: "Database migration".to_string(),
            description: None,
            kind: PhaseKind::RelationalData,
            depends_on: vec![],
            estimated_duration_minutes: 60,
            sub_tasks: progresses
                .iter()
                .enumerate()
                .map(|(i, _)| SubTaskSpec {
                    id: format!("st-{i}"),
                    name: format!("sub task {i}"),
                    metadata: BTreeMap::new(),
                })
                .collect(),
            metadata: BTreeMap::new(),
        };

        let mut phase = MigrationPhase::from_spec(&spec);
        for (st, p) in phase.sub_tasks.iter_mut().zip(progresses) {
            st.progress = *p;
        }
        phase
    }

    #[test]
    fn test_derived_progress_is_mean_of_sub_tasks() {
        let phase = phase_with_sub_progress(&[100.0, 50.0, 0.0]);
        assert_eq!(phase.derived_progress(), Some(50.0));
    }

    #[test]
    fn test_derived_progress_absent_without_sub_tasks() {
        let phase = phase_with_sub_progress(&[]);
        assert_eq!(phase.derived_progress(), None);
    }
}
