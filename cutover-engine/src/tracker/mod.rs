mod dashboard;
mod reporter;

pub use dashboard::{Dashboard, DashboardOverview, PhaseTimelineEntry};
pub use reporter::TrackerReporter;

use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::Duration,
};

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use cutover_common::{
    alert::{Alert, AlertSeverity, AlertSink},
    error::Error,
    metrics::MetricsUpdate,
    phase::{MigrationPhase, PhaseStatus},
    plan::MigrationPlan,
    run::{DEFAULT_ALERT_CAPACITY, MigrationRun, RunStatus},
};
use uuid::Uuid;

use crate::{graph::PhaseGraph, workers::MigrationProgress};

struct TrackerState {
    run: MigrationRun,
    graph: PhaseGraph,
}

/// Owner of all migration run state.
/// ---
/// Every phase and sub-task transition goes through this type, giving a
/// single choke point for the state-machine invariants. Writers take the
/// lock briefly and never across an await; readers get a consistent
/// snapshot taken under the same lock. Alert sinks are notified after
/// the lock is released.
pub struct ProgressTracker {
    state: RwLock<TrackerState>,
    alert_sink: Arc<dyn AlertSink>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker").finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Validates the plan (dependency ids, acyclicity) and creates the
    /// run record. Fails fast with a configuration error before any
    /// work starts.
    pub fn initialize_migration(
        plan: &MigrationPlan,
        alert_sink: Arc<dyn AlertSink>,
    ) -> Result<Self, Error> {
        let phases: Vec<MigrationPhase> =
            plan.phases.iter().map(MigrationPhase::from_spec).collect();
        let graph = PhaseGraph::new(&phases)?;
        let run = MigrationRun::new(plan, phases, DEFAULT_ALERT_CAPACITY);

        info!(
            run_id = %run.id,
            phases = run.phases.len(),
            "Initialized migration run"
        );

        Ok(Self {
            state: RwLock::new(TrackerState { run, graph }),
            alert_sink,
        })
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, TrackerState>, Error> {
        self.state
            .read()
            .map_err(|_| Error::Internal("Tracker state lock poisoned".to_string()))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, TrackerState>, Error> {
        self.state
            .write()
            .map_err(|_| Error::Internal("Tracker state lock poisoned".to_string()))
    }

    pub fn run_id(&self) -> Result<Uuid, Error> {
        Ok(self.read_state()?.run.id)
    }

    /// Consistent copy of the full run record, for persistence.
    pub fn snapshot(&self) -> Result<MigrationRun, Error> {
        Ok(self.read_state()?.run.clone())
    }

    pub fn dashboard(&self) -> Result<Dashboard, Error> {
        Ok(Dashboard::from_run(&self.read_state()?.run))
    }

    pub fn mark_dry_run(&self) -> Result<(), Error> {
        let mut state = self.write_state()?;
        state.run.dry_run = true;
        Ok(())
    }

    pub fn is_ready(&self, phase_id: &str) -> Result<bool, Error> {
        let state = self.read_state()?;
        let statuses = state.run.phase_statuses();
        Ok(state.graph.is_ready(phase_id, &statuses))
    }

    /// All pending phases whose dependencies are completed or skipped.
    pub fn next_ready_phases(&self) -> Result<Vec<String>, Error> {
        let state = self.read_state()?;
        let statuses = state.run.phase_statuses();
        Ok(state.graph.ready_phases(&statuses))
    }

    pub fn start_phase(&self, phase_id: &str) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let statuses = state.run.phase_statuses();

        if !state.graph.contains(phase_id) {
            return Err(not_found(phase_id));
        }
        if statuses.get(phase_id) != Some(&PhaseStatus::Pending) {
            return Err(Error::StateTransition(format!(
                "Phase {phase_id} cannot start: not pending"
            )));
        }
        if !state.graph.is_ready(phase_id, &statuses) {
            return Err(Error::StateTransition(format!(
                "Phase {phase_id} cannot start: dependencies not satisfied"
            )));
        }

        let now = Utc::now();
        let phase = phase_mut(&mut state.run, phase_id)?;
        phase.status = PhaseStatus::InProgress;
        phase.start_time = Some(now);

        state.run.status = RunStatus::Running;
        state.run.start_time.get_or_insert(now);
        state.run.updated_at = now;

        info!(phase_id, "Phase started");
        Ok(())
    }

    /// Applies a progress update to an in-progress phase.
    /// ---
    /// Progress is clamped to [0, 100] and monotone: a stale lower value
    /// is ignored. Metadata merges last-write-wins per key. Reaching 100
    /// completes the phase implicitly.
    pub fn update_phase_progress(
        &self,
        phase_id: &str,
        progress: f64,
        metadata: Option<BTreeMap<String, Value>>,
    ) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let now = Utc::now();

        let phase = phase_mut(&mut state.run, phase_id)?;
        if phase.status != PhaseStatus::InProgress {
            return Err(Error::StateTransition(format!(
                "Phase {phase_id} is not in progress"
            )));
        }

        let clamped = progress.clamp(0.0, 100.0);
        if clamped > phase.progress {
            phase.progress = clamped;
        }
        if let Some(metadata) = metadata {
            for (key, value) in metadata {
                phase.metadata.insert(key, value);
            }
        }
        if phase.progress >= 100.0 {
            phase.status = PhaseStatus::Completed;
            phase.end_time = Some(now);
            info!(phase_id, "Phase completed");
        }

        state.run.recompute_overall_progress();
        state.run.updated_at = now;

        debug!(phase_id, progress = clamped, "Phase progress updated");
        Ok(())
    }

    pub fn complete_phase(&self, phase_id: &str) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let now = Utc::now();

        let phase = phase_mut(&mut state.run, phase_id)?;
        if phase.status != PhaseStatus::InProgress {
            return Err(Error::StateTransition(format!(
                "Phase {phase_id} cannot complete: not in progress"
            )));
        }

        phase.status = PhaseStatus::Completed;
        phase.progress = 100.0;
        phase.end_time = Some(now);

        state.run.recompute_overall_progress();
        state.run.updated_at = now;

        info!(phase_id, "Phase completed");
        Ok(())
    }

    /// Marks an in-progress phase failed and raises an error alert.
    /// Dependent phases are not failed automatically; they simply never
    /// become ready. The operator decides whether independent branches
    /// continue.
    pub fn fail_phase(&self, phase_id: &str, error: &str) -> Result<(), Error> {
        let alert;
        {
            let mut state = self.write_state()?;
            let now = Utc::now();

            let phase = phase_mut(&mut state.run, phase_id)?;
            if phase.status != PhaseStatus::InProgress {
                return Err(Error::StateTransition(format!(
                    "Phase {phase_id} cannot fail: not in progress"
                )));
            }

            phase.status = PhaseStatus::Failed;
            phase.errors.push(error.to_string());
            phase.end_time = Some(now);

            alert = Alert::new(
                AlertSeverity::Error,
                format!("Phase {phase_id} failed: {error}"),
                Some(phase_id),
            );
            state.run.push_alert(alert.clone());
            state.run.recompute_overall_progress();
            state.run.updated_at = now;
        }

        self.alert_sink.notify(&alert);
        Ok(())
    }

    /// Manual override reachable only from `pending` (e.g. a feature
    /// disabled for this environment). A skipped phase counts as done
    /// for both readiness and the overall mean.
    pub fn skip_phase(&self, phase_id: &str) -> Result<(), Error> {
        let alert;
        {
            let mut state = self.write_state()?;
            let now = Utc::now();

            let phase = phase_mut(&mut state.run, phase_id)?;
            if phase.status != PhaseStatus::Pending {
                return Err(Error::StateTransition(format!(
                    "Phase {phase_id} cannot be skipped: not pending"
                )));
            }

            phase.status = PhaseStatus::Skipped;
            phase.progress = 100.0;

            alert = Alert::new(
                AlertSeverity::Info,
                format!("Phase {phase_id} skipped"),
                Some(phase_id),
            );
            state.run.push_alert(alert.clone());
            state.run.recompute_overall_progress();
            state.run.updated_at = now;
        }

        self.alert_sink.notify(&alert);
        Ok(())
    }

    pub fn start_sub_task(&self, phase_id: &str, sub_task_id: &str) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let phase = phase_mut(&mut state.run, phase_id)?;
        if phase.status != PhaseStatus::InProgress {
            return Err(Error::StateTransition(format!(
                "Cannot start sub-task {sub_task_id}: phase {phase_id} is not in progress"
            )));
        }

        let sub_task = sub_task_mut(phase, phase_id, sub_task_id)?;
        if sub_task.status != PhaseStatus::Pending {
            return Err(Error::StateTransition(format!(
                "Sub-task {sub_task_id} of phase {phase_id} is not pending"
            )));
        }

        sub_task.status = PhaseStatus::InProgress;
        state.run.updated_at = Utc::now();
        Ok(())
    }

    pub fn update_sub_task_progress(
        &self,
        phase_id: &str,
        sub_task_id: &str,
        progress: f64,
    ) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let now = Utc::now();

        let phase = phase_mut(&mut state.run, phase_id)?;
        let sub_task = sub_task_mut(phase, phase_id, sub_task_id)?;
        if sub_task.status != PhaseStatus::InProgress {
            return Err(Error::StateTransition(format!(
                "Sub-task {sub_task_id} of phase {phase_id} is not in progress"
            )));
        }

        let clamped = progress.clamp(0.0, 100.0);
        if clamped > sub_task.progress {
            sub_task.progress = clamped;
        }
        if sub_task.progress >= 100.0 {
            sub_task.status = PhaseStatus::Completed;
        }

        derive_phase_progress(phase, now);
        state.run.recompute_overall_progress();
        state.run.updated_at = now;
        Ok(())
    }

    pub fn complete_sub_task(&self, phase_id: &str, sub_task_id: &str) -> Result<(), Error> {
        let mut state = self.write_state()?;
        let now = Utc::now();

        let phase = phase_mut(&mut state.run, phase_id)?;
        let sub_task = sub_task_mut(phase, phase_id, sub_task_id)?;
        if sub_task.status != PhaseStatus::InProgress {
            return Err(Error::StateTransition(format!(
                "Sub-task {sub_task_id} of phase {phase_id} is not in progress"
            )));
        }

        sub_task.status = PhaseStatus::Completed;
        sub_task.progress = 100.0;

        derive_phase_progress(phase, now);
        state.run.recompute_overall_progress();
        state.run.updated_at = now;
        Ok(())
    }

    /// A failed sub-task is recorded as a phase-level warning; it does
    /// not fail the phase (aggregation policy, not propagation).
    pub fn fail_sub_task(
        &self,
        phase_id: &str,
        sub_task_id: &str,
        error: &str,
    ) -> Result<(), Error> {
        let alert;
        {
            let mut state = self.write_state()?;
            let now = Utc::now();

            let phase = phase_mut(&mut state.run, phase_id)?;
            let sub_task = sub_task_mut(phase, phase_id, sub_task_id)?;
            if sub_task.status != PhaseStatus::InProgress {
                return Err(Error::StateTransition(format!(
                    "Sub-task {sub_task_id} of phase {phase_id} is not in progress"
                )));
            }

            sub_task.status = PhaseStatus::Failed;
            phase
                .warnings
                .push(format!("Sub-task {sub_task_id} failed: {error}"));

            alert = Alert::new(
                AlertSeverity::Warning,
                format!("Sub-task {sub_task_id} of phase {phase_id} failed: {error}"),
                Some(phase_id),
            );
            state.run.push_alert(alert.clone());
            state.run.updated_at = now;
        }

        self.alert_sink.notify(&alert);
        Ok(())
    }

    pub fn record_phase_warning(&self, phase_id: &str, message: &str) -> Result<(), Error> {
        let alert;
        {
            let mut state = self.write_state()?;
            let phase = phase_mut(&mut state.run, phase_id)?;
            phase.warnings.push(message.to_string());

            alert = Alert::new(AlertSeverity::Warning, message, Some(phase_id));
            state.run.push_alert(alert.clone());
            state.run.updated_at = Utc::now();
        }

        self.alert_sink.notify(&alert);
        Ok(())
    }

    pub fn create_alert(
        &self,
        severity: AlertSeverity,
        message: &str,
        phase_id: Option<&str>,
    ) -> Result<(), Error> {
        let alert = Alert::new(severity, message, phase_id);
        {
            let mut state = self.write_state()?;
            state.run.push_alert(alert.clone());
            state.run.updated_at = Utc::now();
        }

        self.alert_sink.notify(&alert);
        Ok(())
    }

    pub fn update_metrics(&self, update: MetricsUpdate) -> Result<(), Error> {
        let mut state = self.write_state()?;
        state.run.metrics.merge(update);
        state.run.updated_at = Utc::now();
        Ok(())
    }

    /// Folds a finished worker pass into the run: monotonic operation
    /// counters, throughput, and the phase's recorded errors/warnings.
    pub fn record_worker_outcome(
        &self,
        phase_id: &str,
        progress: &MigrationProgress,
        elapsed: Duration,
    ) -> Result<(), Error> {
        let mut alerts = Vec::new();
        {
            let mut state = self.write_state()?;
            let now = Utc::now();

            let metrics = &mut state.run.metrics;
            metrics.successful_operations += progress.migrated_units;
            metrics.failed_operations += progress.failed_units;
            metrics.total_data_migrated_bytes += progress.migrated_size_bytes;

            let attempted = metrics.successful_operations + metrics.failed_operations;
            if attempted > 0 {
                metrics.error_rate_pct = metrics.failed_operations as f64 * 100.0 / attempted as f64;
            }

            let elapsed_secs = elapsed.as_secs_f64();
            if elapsed_secs > 0.0 {
                metrics.migration_speed_bps = progress.migrated_size_bytes as f64 / elapsed_secs;
                let pass_units = progress.migrated_units + progress.failed_units;
                metrics.average_operation_time_ms =
                    elapsed.as_millis() as f64 / pass_units.max(1) as f64;
            }
            metrics.updated_at = Some(now);

            let phase = phase_mut(&mut state.run, phase_id)?;
            for failure in &progress.errors {
                phase
                    .errors
                    .push(format!("{}: {}", failure.unit_id, failure.message));
            }
            for warning in &progress.warnings {
                phase.warnings.push(warning.clone());
                alerts.push(Alert::new(AlertSeverity::Warning, warning, Some(phase_id)));
            }

            for alert in &alerts {
                state.run.push_alert(alert.clone());
            }
            state.run.updated_at = now;
        }

        for alert in &alerts {
            self.alert_sink.notify(alert);
        }
        Ok(())
    }

    /// Settles the run status once no more work will be scheduled.
    /// All-terminal phases give the graph outcome; otherwise any failed
    /// phase marks the run failed, and a run stalled on manual or
    /// blocked phases stays `running`.
    pub fn finalize(&self) -> Result<RunStatus, Error> {
        let mut state = self.write_state()?;
        let now = Utc::now();
        let statuses = state.run.phase_statuses();

        let status = match state.graph.run_outcome(&statuses) {
            Some(outcome) => outcome,
            None if statuses.values().any(|s| *s == PhaseStatus::Failed) => RunStatus::Failed,
            None => RunStatus::Running,
        };

        state.run.status = status;
        if matches!(status, RunStatus::Completed | RunStatus::Failed) {
            state.run.end_time = Some(now);
        }
        state.run.updated_at = now;

        info!(status = %status, "Migration run finalized");
        Ok(status)
    }
}

fn not_found(phase_id: &str) -> Error {
    Error::NotFound {
        resource_type: "phase".to_string(),
        resource_id: phase_id.to_string(),
    }
}

fn phase_mut<'a>(run: &'a mut MigrationRun, phase_id: &str) -> Result<&'a mut MigrationPhase, Error> {
    run.phase_mut(phase_id).ok_or_else(|| not_found(phase_id))
}

fn sub_task_mut<'a>(
    phase: &'a mut MigrationPhase,
    phase_id: &str,
    sub_task_id: &str,
) -> Result<&'a mut cutover_common::phase::SubTask, Error> {
    phase.sub_task_mut(sub_task_id).ok_or_else(|| Error::NotFound {
        resource_type: "sub-task".to_string(),
        resource_id: format!("{phase_id}/{sub_task_id}"),
    })
}

/// Phase progress follows the sub-task mean once sub-tasks exist,
/// subject to the same monotone rule as explicit updates.
fn derive_phase_progress(phase: &mut MigrationPhase, now: chrono::DateTime<Utc>) {
    if phase.status != PhaseStatus::InProgress {
        return;
    }

    if let Some(derived) = phase.derived_progress() {
        if derived > phase.progress {
            phase.progress = derived;
        }
        if phase.progress >= 100.0 {
            phase.status = PhaseStatus::Completed;
            phase.end_time = Some(now);
        }
    }
}

#[cfg(test)]
mod tests;
