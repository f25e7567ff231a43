use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::{
    alert::Alert,
    metrics::MetricsSnapshot,
    phase::{MigrationPhase, PhaseStatus},
    plan::MigrationPlan,
};

pub const DEFAULT_ALERT_CAPACITY: usize = 100;

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// The single shared record for one migration attempt.
/// ---
/// All mutation goes through the progress tracker; nothing outside it
/// touches phase or sub-task fields directly. Persisted as one JSON
/// document keyed by the run id.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MigrationRun {
    pub id: Uuid,
    pub plan_version: String,
    pub plan_name: Option<String>,
    pub dry_run: bool,
    pub status: RunStatus,
    /// Simple mean of phase progresses; phases not yet started contribute 0.
    pub overall_progress: f64,
    pub phases: Vec<MigrationPhase>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub alerts: VecDeque<Alert>,
    #[serde(default = "default_alert_capacity")]
    pub alert_capacity: usize,
    pub metrics: MetricsSnapshot,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_alert_capacity() -> usize {
    DEFAULT_ALERT_CAPACITY
}

impl MigrationRun {
    pub fn new(plan: &MigrationPlan, phases: Vec<MigrationPhase>, alert_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            plan_version: plan.version.clone(),
            plan_name: plan.name.clone(),
            dry_run: false,
            status: RunStatus::Pending,
            overall_progress: 0.0,
            phases,
            start_time: None,
            end_time: None,
            alerts: VecDeque::new(),
            alert_capacity: alert_capacity.max(1),
            metrics: MetricsSnapshot::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn phase(&self, phase_id: &str) -> Option<&MigrationPhase> {
        self.phases.iter().find(|p| p.id == phase_id)
    }

    pub fn phase_mut(&mut self, phase_id: &str) -> Option<&mut MigrationPhase> {
        self.phases.iter_mut().find(|p| p.id == phase_id)
    }

    pub fn phase_statuses(&self) -> HashMap<String, PhaseStatus> {
        self.phases
            .iter()
            .map(|p| (p.id.clone(), p.status))
            .collect()
    }

    /// Appends an alert, evicting the oldest once capacity is reached.
    pub fn push_alert(&mut self, alert: Alert) {
        while self.alerts.len() >= self.alert_capacity {
            self.alerts.pop_front();
        }
        self.alerts.push_back(alert);
    }

    /// Recomputes `overall_progress` as the mean over all phases,
    /// taken from a consistent view of the whole phase list.
    pub fn recompute_overall_progress(&mut self) {
        if self.phases.is_empty() {
            self.overall_progress = 0.0;
            return;
        }

        let sum: f64 = self.phases.iter().map(|p| p.progress).sum();
        self.overall_progress = sum / self.phases.len() as f64;
    }

    pub fn total_estimated_duration_minutes(&self) -> u64 {
        self.phases
            .iter()
            .map(|p| p.estimated_duration_minutes)
            .sum()
    }
}
