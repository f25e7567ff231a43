use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl PhaseStatus {
    /// Whether a dependency in this state lets a dependent phase start.
    pub fn satisfies_dependency(self) -> bool {
        matches!(self, PhaseStatus::Completed | PhaseStatus::Skipped)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PhaseStatus::Completed | PhaseStatus::Failed | PhaseStatus::Skipped
        )
    }
}

/// Selects which data-plane worker executes a phase.
/// ---
/// `Manual` phases (application cutover, DNS flips) are operator-driven
/// and are never executed by the orchestrator.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    ObjectStorage,
    CacheRebuild,
    RelationalData,
    Manual,
}
