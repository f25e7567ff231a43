use chrono::{DateTime, Duration, Utc};

use cutover_common::run::MigrationRun;

/// Projects a completion timestamp for an in-flight run.
/// ---
/// Two projections are available. When a data transfer is active
/// (bytes moved and a measured speed) the remaining byte volume is
/// extrapolated from overall progress and divided by the observed
/// throughput. Otherwise the estimate falls back to the unfinished
/// share of the planned phase durations.
#[derive(Clone, Copy, Debug, Default)]
pub struct CompletionEstimator;

impl CompletionEstimator {
    pub fn estimate(run: &MigrationRun, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if run.start_time.is_none() || run.overall_progress <= 0.0 {
            return None;
        }
        if run.overall_progress >= 100.0 {
            return Some(now);
        }

        let remaining_ms = Self::throughput_remaining_ms(run)
            .unwrap_or_else(|| Self::planned_remaining_ms(run));
        Some(now + Duration::milliseconds(remaining_ms))
    }

    fn throughput_remaining_ms(run: &MigrationRun) -> Option<i64> {
        let metrics = &run.metrics;
        let moved = metrics.total_data_migrated_bytes as f64;
        if moved <= 0.0 || metrics.migration_speed_bps <= 0.0 {
            return None;
        }

        let projected_total = moved / (run.overall_progress / 100.0);
        let remaining_bytes = (projected_total - moved).max(0.0);
        Some((remaining_bytes / metrics.migration_speed_bps * 1_000.0) as i64)
    }

    fn planned_remaining_ms(run: &MigrationRun) -> i64 {
        let planned_ms = run.total_estimated_duration_minutes() as f64 * 60_000.0;
        (planned_ms * (100.0 - run.overall_progress) / 100.0) as i64
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use cutover_common::{
        phase::{MigrationPhase, PhaseKind},
        plan::{MigrationPlan, PhaseSpec},
        run::{DEFAULT_ALERT_CAPACITY, MigrationRun},
    };

    use super::*;

    fn run_with_phases(estimated_minutes: &[u64]) -> MigrationRun {
        let phases: Vec<MigrationPhase> = estimated_minutes
            .iter()
            .enumerate()
            .map(|(i, minutes)| {
                MigrationPhase::from_spec(&PhaseSpec {
                    id: format!("p{i}"),
                    name: format!("phase {i}"),
                    description: None,
                    kind: PhaseKind::Manual,
                    depends_on: vec![],
                    estimated_duration_minutes: *minutes,
                    sub_tasks: vec![],
                    metadata: BTreeMap::new(),
                })
            })
            .collect();
        let plan = MigrationPlan {
            version: "1".to_string(),
            name: None,
            phases: vec![],
        };
        MigrationRun::new(&plan, phases, DEFAULT_ALERT_CAPACITY)
    }

    #[test]
    fn test_no_estimate_before_any_progress() {
        let mut run = run_with_phases(&[30, 30]);
        assert_eq!(CompletionEstimator::estimate(&run, Utc::now()), None);

        // Started but still at zero progress.
        run.start_time = Some(Utc::now());
        assert_eq!(CompletionEstimator::estimate(&run, Utc::now()), None);
    }

    #[test]
    fn test_planned_duration_fallback_scales_with_remaining_share() {
        let mut run = run_with_phases(&[40, 20]);
        run.start_time = Some(Utc::now());
        run.overall_progress = 50.0;

        let now = Utc::now();
        let eta = CompletionEstimator::estimate(&run, now).unwrap();
        // Half of 60 planned minutes remains.
        assert_eq!((eta - now).num_minutes(), 30);
    }

    #[test]
    fn test_throughput_projection_under_constant_speed() {
        let mut run = run_with_phases(&[600]);
        run.start_time = Some(Utc::now());
        run.overall_progress = 25.0;
        run.metrics.total_data_migrated_bytes = 250_000_000;
        run.metrics.migration_speed_bps = 1_000_000.0;

        let now = Utc::now();
        let eta = CompletionEstimator::estimate(&run, now).unwrap();
        // 750 MB left at 1 MB/s: 750 seconds.
        assert_eq!((eta - now).num_seconds(), 750);
    }

    #[test]
    fn test_finished_run_estimates_now() {
        let mut run = run_with_phases(&[30]);
        run.start_time = Some(Utc::now());
        run.overall_progress = 100.0;

        let now = Utc::now();
        assert_eq!(CompletionEstimator::estimate(&run, now), Some(now));
    }
}
