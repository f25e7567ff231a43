use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cutover_common::{
    alert::Alert,
    metrics::MetricsSnapshot,
    phase::PhaseStatus,
    run::{MigrationRun, RunStatus},
};

/// How many alerts the dashboard surfaces, newest first.
const RECENT_ALERTS: usize = 10;

/// Immutable dashboard snapshot assembled from a consistent view of the
/// run. Reads never block writers; this is a plain value.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Dashboard {
    pub overview: DashboardOverview,
    pub recent_alerts: Vec<Alert>,
    pub metrics: MetricsSnapshot,
    pub timeline: Vec<PhaseTimelineEntry>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DashboardOverview {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub overall_progress: f64,
    /// First phase in declared order that is not completed or skipped.
    pub current_phase: Option<String>,
    pub total_phases: usize,
    pub completed_phases: usize,
    pub in_progress_phases: usize,
    pub failed_phases: usize,
    pub skipped_phases: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PhaseTimelineEntry {
    pub phase_id: String,
    pub name: String,
    pub status: PhaseStatus,
    pub progress: f64,
    /// Offset from run start assuming phases run back to back in
    /// declared order; a planning aid, not a schedule.
    pub estimated_start_offset_minutes: u64,
    pub estimated_duration_minutes: u64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Dashboard {
    pub fn from_run(run: &MigrationRun) -> Self {
        let count = |status: PhaseStatus| run.phases.iter().filter(|p| p.status == status).count();

        let current_phase = run
            .phases
            .iter()
            .find(|p| !matches!(p.status, PhaseStatus::Completed | PhaseStatus::Skipped))
            .map(|p| p.id.clone());

        let mut timeline = Vec::with_capacity(run.phases.len());
        let mut offset_minutes = 0;
        for phase in &run.phases {
            timeline.push(PhaseTimelineEntry {
                phase_id: phase.id.clone(),
                name: phase.name.clone(),
                status: phase.status,
                progress: phase.progress,
                estimated_start_offset_minutes: offset_minutes,
                estimated_duration_minutes: phase.estimated_duration_minutes,
                start_time: phase.start_time,
                end_time: phase.end_time,
            });
            offset_minutes += phase.estimated_duration_minutes;
        }

        let recent_alerts = run
            .alerts
            .iter()
            .rev()
            .take(RECENT_ALERTS)
            .cloned()
            .collect();

        Self {
            overview: DashboardOverview {
                run_id: run.id,
                status: run.status,
                overall_progress: run.overall_progress,
                current_phase,
                total_phases: run.phases.len(),
                completed_phases: count(PhaseStatus::Completed),
                in_progress_phases: count(PhaseStatus::InProgress),
                failed_phases: count(PhaseStatus::Failed),
                skipped_phases: count(PhaseStatus::Skipped),
            },
            recent_alerts,
            metrics: run.metrics.clone(),
            timeline,
            generated_at: Utc::now(),
        }
    }
}
