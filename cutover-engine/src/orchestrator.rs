use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};
use uuid::Uuid;

use cutover_common::{
    alert::AlertSeverity,
    error::Error,
    phase::PhaseStatus,
    progress::ProgressReporter,
    run::RunStatus,
    store::RunStore,
};

use crate::{
    batch::{CancelFlag, DEFAULT_CONCURRENCY, DEFAULT_UNIT_TIMEOUT},
    tracker::{ProgressTracker, TrackerReporter},
    workers::{MigrationWorker, VerificationMode, WorkerContext},
};

pub const DEFAULT_VERIFY_SAMPLE: usize = 100;

/// Final percent withheld from worker reports so a phase cannot finish
/// before its verification pass has ruled.
const VERIFY_HOLDBACK_PCT: f64 = 99.0;

#[derive(Clone, Debug)]
pub struct OrchestratorOptions {
    pub dry_run: bool,
    pub concurrency: usize,
    pub unit_timeout: Duration,
    pub skip_verification: bool,
    pub verify_sample: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
            skip_verification: false,
            verify_sample: DEFAULT_VERIFY_SAMPLE,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub overall_progress: f64,
    pub failed_phases: Vec<String>,
    /// Phases whose data moved but whose verification did not pass;
    /// left in progress for the operator. A run with entries here is
    /// not clean even when `status` is still `running`.
    pub verification_failed: Vec<String>,
    pub total_failed_units: u64,
}

impl RunSummary {
    /// False when any phase failed or was left blocked by verification.
    pub fn is_clean(&self) -> bool {
        self.status != RunStatus::Failed
            && self.failed_phases.is_empty()
            && self.verification_failed.is_empty()
    }
}

struct PhaseOutcome {
    failed_units: u64,
    verification_blocked: bool,
}

/// Drives a migration run to quiescence.
/// ---
/// Repeatedly asks the tracker for ready phases, launches their workers
/// concurrently, and persists the run after every wave. Phases are
/// attempted at most once per run; anything left non-terminal (manual
/// phases, failed verification, blocked dependents) keeps the run in
/// `running` for an operator to resolve.
pub struct Orchestrator {
    tracker: Arc<ProgressTracker>,
    run_store: Arc<dyn RunStore>,
    workers: HashMap<String, Arc<dyn MigrationWorker>>,
    options: OrchestratorOptions,
    cancel: CancelFlag,
}

/// Caps forwarded progress just below completion; the held-back
/// remainder is granted by `complete_phase` after verification.
struct HoldbackReporter {
    inner: Arc<dyn ProgressReporter>,
}

impl ProgressReporter for HoldbackReporter {
    fn report(&self, phase_id: &str, percent: f64, metadata: Option<Value>) {
        self.inner
            .report(phase_id, percent.min(VERIFY_HOLDBACK_PCT), metadata);
    }
}

impl Orchestrator {
    pub fn new(
        tracker: Arc<ProgressTracker>,
        run_store: Arc<dyn RunStore>,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            tracker,
            run_store,
            workers: HashMap::new(),
            options,
            cancel: CancelFlag::new(),
        }
    }

    /// Binds a worker to the phase id it will execute. Phases with no
    /// worker (manual steps) are announced and left pending.
    pub fn register_worker(&mut self, phase_id: impl Into<String>, worker: Arc<dyn MigrationWorker>) {
        self.workers.insert(phase_id.into(), worker);
    }

    /// Handle for stopping the run from another task.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub async fn run(&self) -> Result<RunSummary, Error> {
        if self.options.dry_run {
            self.tracker.mark_dry_run()?;
        }
        self.persist().await;

        let mut attempted: HashSet<String> = HashSet::new();
        let mut total_failed_units = 0u64;
        let mut verification_failed: Vec<String> = Vec::new();

        loop {
            if self.cancel.is_cancelled() {
                self.tracker.create_alert(
                    AlertSeverity::Warning,
                    "Run cancelled; no further phases will be scheduled",
                    None,
                )?;
                break;
            }

            // Empty wave means every ready phase was already attempted
            // or is manual; nothing further can unblock on its own.
            let wave = self.next_wave(&mut attempted)?;
            if wave.is_empty() {
                break;
            }

            let outcomes = future::join_all(wave.into_iter().map(|(phase_id, worker)| async move {
                let outcome = self.execute_phase(&phase_id, worker).await;
                (phase_id, outcome)
            }))
            .await;
            for (phase_id, outcome) in outcomes {
                total_failed_units += outcome.failed_units;
                if outcome.verification_blocked {
                    verification_failed.push(phase_id);
                }
            }

            self.persist().await;
        }

        let status = self.tracker.finalize()?;
        self.persist().await;

        let run = self.tracker.snapshot()?;
        let failed_phases = run
            .phases
            .iter()
            .filter(|p| p.status == PhaseStatus::Failed)
            .map(|p| p.id.clone())
            .collect();

        info!(run_id = %run.id, status = %status, "Orchestration finished");
        Ok(RunSummary {
            run_id: run.id,
            status,
            overall_progress: run.overall_progress,
            failed_phases,
            verification_failed,
            total_failed_units,
        })
    }

    /// Ready phases not yet attempted, split into executable work and
    /// manual announcements.
    fn next_wave(
        &self,
        attempted: &mut HashSet<String>,
    ) -> Result<Vec<(String, Arc<dyn MigrationWorker>)>, Error> {
        let mut wave = Vec::new();
        for phase_id in self.tracker.next_ready_phases()? {
            if !attempted.insert(phase_id.clone()) {
                continue;
            }
            match self.workers.get(&phase_id) {
                Some(worker) => wave.push((phase_id, worker.clone())),
                None => {
                    self.tracker.create_alert(
                        AlertSeverity::Warning,
                        &format!("Phase {phase_id} has no registered worker; awaiting manual execution"),
                        Some(phase_id.as_str()),
                    )?;
                }
            }
        }
        Ok(wave)
    }

    /// Runs one phase start-to-settlement. Infrastructure errors fail
    /// the phase rather than the run.
    async fn execute_phase(&self, phase_id: &str, worker: Arc<dyn MigrationWorker>) -> PhaseOutcome {
        let mut outcome = PhaseOutcome {
            failed_units: 0,
            verification_blocked: false,
        };
        if let Err(e) = self.tracker.start_phase(phase_id) {
            warn!(phase_id, error = %e, "Could not start ready phase");
            return outcome;
        }

        let reporter = Arc::new(HoldbackReporter {
            inner: Arc::new(TrackerReporter::new(self.tracker.clone())),
        });
        let mut ctx = WorkerContext::new(phase_id, reporter);
        ctx.dry_run = self.options.dry_run;
        ctx.concurrency = self.options.concurrency;
        ctx.unit_timeout = self.options.unit_timeout;
        ctx.cancel = self.cancel.clone();

        info!(phase_id, worker = worker.name(), dry_run = ctx.dry_run, "Executing phase");
        let started = Instant::now();

        let progress = match worker.execute(&ctx).await {
            Ok(progress) => progress,
            Err(e) => {
                error!(phase_id, error = %e, "Worker execution errored");
                let _ = self.tracker.fail_phase(phase_id, &e.to_string());
                return outcome;
            }
        };

        if let Err(e) = self
            .tracker
            .record_worker_outcome(phase_id, &progress, started.elapsed())
        {
            warn!(phase_id, error = %e, "Could not record worker outcome");
        }

        if progress.failed_units > 0 {
            let _ = self.tracker.fail_phase(
                phase_id,
                &format!(
                    "{} of {} units failed",
                    progress.failed_units, progress.total_units
                ),
            );
            outcome.failed_units = progress.failed_units;
            return outcome;
        }

        outcome.verification_blocked = !self.settle(phase_id, worker).await;
        outcome
    }

    /// Grants completion, gated on verification unless disabled.
    /// Returns false when verification did not pass: the phase is left
    /// in progress with an error alert, and dependents stay blocked
    /// until an operator intervenes.
    async fn settle(&self, phase_id: &str, worker: Arc<dyn MigrationWorker>) -> bool {
        if self.options.dry_run || self.options.skip_verification {
            if let Err(e) = self.tracker.complete_phase(phase_id) {
                warn!(phase_id, error = %e, "Could not complete phase");
            }
            return true;
        }

        match worker
            .verify(VerificationMode::Sample(self.options.verify_sample))
            .await
        {
            Ok(report) if report.passed => {
                if let Err(e) = self.tracker.complete_phase(phase_id) {
                    warn!(phase_id, error = %e, "Could not complete verified phase");
                }
                true
            }
            Ok(report) => {
                for mismatch in report.mismatches.iter().take(5) {
                    let _ = self.tracker.record_phase_warning(phase_id, mismatch);
                }
                let _ = self.tracker.create_alert(
                    AlertSeverity::Error,
                    &format!(
                        "Verification failed for phase {phase_id}: {} mismatches across {} checked units",
                        report.mismatches.len(),
                        report.checked_units
                    ),
                    Some(phase_id),
                );
                false
            }
            Err(e) => {
                let _ = self.tracker.create_alert(
                    AlertSeverity::Error,
                    &format!("Verification errored for phase {phase_id}: {e}"),
                    Some(phase_id),
                );
                false
            }
        }
    }

    async fn persist(&self) {
        let run = match self.tracker.snapshot() {
            Ok(run) => run,
            Err(e) => {
                warn!(error = %e, "Could not snapshot run for persistence");
                return;
            }
        };
        if let Err(e) = self.run_store.save(&run).await {
            warn!(run_id = %run.id, error = %e, "Could not persist run state");
        }
    }
}
