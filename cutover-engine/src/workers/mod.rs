mod cache;
mod object_store;
mod relational;

pub use cache::{CacheRebuildConfig, CacheRebuilder};
pub use object_store::{ObjectStorageConfig, ObjectStorageMigrator};
pub use relational::{RelationalConfig, RelationalDataMigrator};

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use cutover_common::{
    error::Error,
    progress::{NoopReporter, ProgressReporter},
};

use crate::batch::{CancelFlag, DEFAULT_CONCURRENCY, DEFAULT_UNIT_TIMEOUT, UnitFailure};

/// Default page size for workers that move rows or keys in pages.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Execution context injected into a worker for one pass.
pub struct WorkerContext {
    pub phase_id: String,
    /// Short-circuits only destination-mutating calls; enumeration and
    /// source reads still happen, so plan and execute cannot diverge.
    pub dry_run: bool,
    pub concurrency: usize,
    pub unit_timeout: Duration,
    pub reporter: Arc<dyn ProgressReporter>,
    pub cancel: CancelFlag,
}

impl WorkerContext {
    pub fn new(phase_id: impl Into<String>, reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            phase_id: phase_id.into(),
            dry_run: false,
            concurrency: DEFAULT_CONCURRENCY,
            unit_timeout: DEFAULT_UNIT_TIMEOUT,
            reporter,
            cancel: CancelFlag::new(),
        }
    }

    /// Context used by the default `plan` implementation: dry run with
    /// progress discarded.
    pub fn dry_run_probe(phase_id: impl Into<String>) -> Self {
        let mut ctx = Self::new(phase_id, Arc::new(NoopReporter));
        ctx.dry_run = true;
        ctx
    }
}

/// What a worker would move, without moving it.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MigrationEstimate {
    pub total_units: u64,
    pub total_size_bytes: u64,
    /// Unit counts keyed by a worker-specific category (file extension,
    /// table name, ...).
    pub categories: BTreeMap<String, u64>,
}

/// Outcome of one worker pass.
/// ---
/// `migrated_units` counts units accounted for, including those found
/// already correct at the destination (`skipped_units` of them), so a
/// re-run over a partial destination still reports the full total.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct MigrationProgress {
    pub total_units: u64,
    pub migrated_units: u64,
    pub skipped_units: u64,
    pub failed_units: u64,
    pub total_size_bytes: u64,
    pub migrated_size_bytes: u64,
    pub errors: Vec<UnitFailure>,
    pub warnings: Vec<String>,
    pub categories: BTreeMap<String, u64>,
}

impl MigrationProgress {
    /// Success requires zero failed units, not just progress at 100.
    pub fn is_fully_successful(&self) -> bool {
        self.failed_units == 0
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum VerificationMode {
    /// Check a bounded sample of units.
    Sample(usize),
    Full,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct VerificationReport {
    pub passed: bool,
    pub checked_units: u64,
    pub mismatches: Vec<String>,
}

/// Contract satisfied by every data-plane migration worker.
/// ---
/// Workers know nothing about phases beyond the id they report progress
/// against. Unit application must be idempotent: re-running `execute`
/// over a partially completed destination skips or overwrites
/// already-migrated units without error, and never deletes the source.
#[async_trait]
pub trait MigrationWorker: Send + Sync {
    fn name(&self) -> &str;

    /// Dry-run enumeration. Side-effect-free against the destination.
    async fn plan(&self) -> Result<MigrationEstimate, Error> {
        let ctx = WorkerContext::dry_run_probe("plan");
        let progress = self.execute(&ctx).await?;
        Ok(MigrationEstimate {
            total_units: progress.total_units,
            total_size_bytes: progress.total_size_bytes,
            categories: progress.categories,
        })
    }

    async fn execute(&self, ctx: &WorkerContext) -> Result<MigrationProgress, Error>;

    async fn verify(&self, mode: VerificationMode) -> Result<VerificationReport, Error>;
}

impl std::fmt::Debug for dyn MigrationWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("MigrationWorker").field(&self.name()).finish()
    }
}
