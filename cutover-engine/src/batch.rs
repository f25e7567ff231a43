use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{StreamExt, future, stream};
use serde::{Deserialize, Serialize};
use tracing::debug;

use cutover_common::error::Error;

pub const DEFAULT_CONCURRENCY: usize = 50;
pub const DEFAULT_UNIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Cooperative cancellation shared between the orchestrator and the
/// batch executor. Checked before each unit is scheduled; in-flight
/// units are allowed to finish.
#[derive(Clone, Debug, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The smallest idempotently-retriable item a worker moves.
pub trait MigrationUnit: Send {
    /// Stable identity, used for retries and failure reporting.
    fn unit_id(&self) -> String;
}

/// One failed unit. Unit failures are data collected into the batch
/// result, never errors propagated past the executor boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitFailure {
    pub unit_id: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct BatchResult {
    pub succeeded: u64,
    pub failed: u64,
    pub errors: Vec<UnitFailure>,
}

/// Bounded-concurrency runner for a list of migration units.
/// ---
/// Pure utility: no knowledge of phases or progress. One failing unit
/// never aborts the batch; all outcomes are collected before returning.
/// A timed-out unit counts as failed, not as a crash of the batch.
pub struct BatchExecutor {
    concurrency: usize,
    unit_timeout: Duration,
    cancel: CancelFlag,
}

impl BatchExecutor {
    pub fn new(concurrency: usize, unit_timeout: Duration, cancel: CancelFlag) -> Self {
        Self {
            concurrency: concurrency.max(1),
            unit_timeout,
            cancel,
        }
    }

    pub async fn run<T, F, Fut>(&self, units: Vec<T>, op: F) -> BatchResult
    where
        T: MigrationUnit,
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<(), Error>> + Send,
    {
        let cancel = &self.cancel;
        let unit_timeout = self.unit_timeout;
        let total = units.len();

        let mut outcomes = stream::iter(units)
            .take_while(|_| future::ready(!cancel.is_cancelled()))
            .map(|unit| {
                let unit_id = unit.unit_id();
                let unit_fut = op(unit);
                async move {
                    match tokio::time::timeout(unit_timeout, unit_fut).await {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(UnitFailure {
                            unit_id,
                            message: e.to_string(),
                        }),
                        Err(_) => Err(UnitFailure {
                            unit_id,
                            message: format!("Unit timed out after {unit_timeout:?}"),
                        }),
                    }
                }
            })
            .buffer_unordered(self.concurrency);

        let mut result = BatchResult::default();
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(()) => result.succeeded += 1,
                Err(failure) => {
                    result.failed += 1;
                    result.errors.push(failure);
                }
            }
        }

        debug!(
            total,
            succeeded = result.succeeded,
            failed = result.failed,
            "Batch complete"
        );

        result
    }
}
