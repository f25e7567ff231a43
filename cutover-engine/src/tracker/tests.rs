use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use cutover_common::{
    alert::{Alert, AlertSeverity, AlertSink},
    error::Error,
    phase::{PhaseKind, PhaseStatus},
    plan::{MigrationPlan, PhaseSpec, SubTaskSpec},
};

use super::ProgressTracker;

#[derive(Default)]
struct RecordingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl AlertSink for RecordingSink {
    fn notify(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

fn spec(id: &str, deps: &[&str]) -> PhaseSpec {
    PhaseSpec {
        id: id.to_string(),
        name: id.to_string(),
        description: None,
        kind: PhaseKind::Manual,
        depends_on: deps.iter().map(|d| d.to_string()).collect(),
        estimated_duration_minutes: 30,
        sub_tasks: vec![],
        metadata: BTreeMap::new(),
    }
}

fn plan(phases: Vec<PhaseSpec>) -> MigrationPlan {
    MigrationPlan {
        version: "1".to_string(),
        name: None,
        phases,
    }
}

fn tracker(phases: Vec<PhaseSpec>) -> (ProgressTracker, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let tracker = ProgressTracker::initialize_migration(&plan(phases), sink.clone()).unwrap();
    (tracker, sink)
}

fn abc_tracker() -> (ProgressTracker, Arc<RecordingSink>) {
    tracker(vec![spec("a", &[]), spec("b", &["a"]), spec("c", &["a"])])
}

#[test]
fn test_initialize_rejects_cyclic_plan() {
    let sink = Arc::new(RecordingSink::default());
    let cyclic = plan(vec![spec("a", &["b"]), spec("b", &["a"])]);
    let err = ProgressTracker::initialize_migration(&cyclic, sink).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_starting_phase_before_dependency_completes_is_rejected() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();

    let err = tracker.start_phase("b").unwrap_err();
    assert!(matches!(err, Error::StateTransition(_)));

    // No state change: b is still pending and unready.
    let run = tracker.snapshot().unwrap();
    assert_eq!(run.phase("b").unwrap().status, PhaseStatus::Pending);
}

#[test]
fn test_completing_dependency_readies_both_branches() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.update_phase_progress("a", 100.0, None).unwrap();

    assert_eq!(tracker.snapshot().unwrap().phase("a").unwrap().status, PhaseStatus::Completed);
    assert_eq!(tracker.next_ready_phases().unwrap(), vec!["b", "c"]);
}

#[test]
fn test_overall_progress_is_mean_and_update_is_idempotent() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.update_phase_progress("a", 60.0, None).unwrap();

    let run = tracker.snapshot().unwrap();
    assert!((run.overall_progress - 20.0).abs() < 1e-9);

    // Same value again: no change.
    tracker.update_phase_progress("a", 60.0, None).unwrap();
    let run = tracker.snapshot().unwrap();
    assert!((run.overall_progress - 20.0).abs() < 1e-9);
}

#[test]
fn test_progress_is_monotone_while_not_failed() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.update_phase_progress("a", 60.0, None).unwrap();
    tracker.update_phase_progress("a", 40.0, None).unwrap();

    assert_eq!(tracker.snapshot().unwrap().phase("a").unwrap().progress, 60.0);
}

#[test]
fn test_progress_clamps_out_of_range_values() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.update_phase_progress("a", 150.0, None).unwrap();

    let run = tracker.snapshot().unwrap();
    let a = run.phase("a").unwrap();
    assert_eq!(a.progress, 100.0);
    assert_eq!(a.status, PhaseStatus::Completed);
}

#[test]
fn test_metadata_merges_last_write_wins() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();

    let mut first = BTreeMap::new();
    first.insert("region".to_string(), serde_json::json!("us-east-1"));
    first.insert("attempt".to_string(), serde_json::json!(1));
    tracker.update_phase_progress("a", 10.0, Some(first)).unwrap();

    let mut second = BTreeMap::new();
    second.insert("attempt".to_string(), serde_json::json!(2));
    tracker.update_phase_progress("a", 20.0, Some(second)).unwrap();

    let run = tracker.snapshot().unwrap();
    let metadata = &run.phase("a").unwrap().metadata;
    assert_eq!(metadata["region"], serde_json::json!("us-east-1"));
    assert_eq!(metadata["attempt"], serde_json::json!(2));
}

#[test]
fn test_failed_phase_emits_error_alert_and_blocks_dependents() {
    let (tracker, sink) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.fail_phase("a", "copy exploded").unwrap();

    let alerts = sink.alerts.lock().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].severity, AlertSeverity::Error);
    drop(alerts);

    assert!(tracker.next_ready_phases().unwrap().is_empty());
    let run = tracker.snapshot().unwrap();
    assert_eq!(run.phase("a").unwrap().errors, vec!["copy exploded"]);
}

#[test]
fn test_skip_is_only_reachable_from_pending() {
    let (tracker, _) = abc_tracker();
    tracker.skip_phase("b").unwrap();

    let err = tracker.skip_phase("b").unwrap_err();
    assert!(matches!(err, Error::StateTransition(_)));

    tracker.start_phase("a").unwrap();
    let err = tracker.skip_phase("a").unwrap_err();
    assert!(matches!(err, Error::StateTransition(_)));
}

#[test]
fn test_skipped_dependency_satisfies_readiness() {
    let (tracker, _) = tracker(vec![spec("a", &[]), spec("b", &["a"])]);
    tracker.skip_phase("a").unwrap();
    assert_eq!(tracker.next_ready_phases().unwrap(), vec!["b"]);
}

#[test]
fn test_sub_task_failure_records_phase_warning_not_failure() {
    let mut phase = spec("a", &[]);
    phase.sub_tasks = vec![
        SubTaskSpec {
            id: "st1".to_string(),
            name: "first".to_string(),
            metadata: BTreeMap::new(),
        },
        SubTaskSpec {
            id: "st2".to_string(),
            name: "second".to_string(),
            metadata: BTreeMap::new(),
        },
    ];
    let (tracker, sink) = tracker(vec![phase]);

    tracker.start_phase("a").unwrap();
    tracker.start_sub_task("a", "st1").unwrap();
    tracker.fail_sub_task("a", "st1", "smoke test red").unwrap();

    let run = tracker.snapshot().unwrap();
    let a = run.phase("a").unwrap();
    assert_eq!(a.status, PhaseStatus::InProgress);
    assert_eq!(a.warnings.len(), 1);
    assert_eq!(a.sub_task("st1").unwrap().status, PhaseStatus::Failed);

    let alerts = sink.alerts.lock().unwrap();
    assert_eq!(alerts[0].severity, AlertSeverity::Warning);
}

#[test]
fn test_phase_progress_derives_from_sub_task_mean() {
    let mut phase = spec("a", &[]);
    phase.sub_tasks = vec![
        SubTaskSpec {
            id: "st1".to_string(),
            name: "first".to_string(),
            metadata: BTreeMap::new(),
        },
        SubTaskSpec {
            id: "st2".to_string(),
            name: "second".to_string(),
            metadata: BTreeMap::new(),
        },
    ];
    let (tracker, _) = tracker(vec![phase]);

    tracker.start_phase("a").unwrap();
    tracker.start_sub_task("a", "st1").unwrap();
    tracker.start_sub_task("a", "st2").unwrap();
    tracker.update_sub_task_progress("a", "st1", 100.0).unwrap();

    let run = tracker.snapshot().unwrap();
    assert_eq!(run.phase("a").unwrap().progress, 50.0);

    tracker.update_sub_task_progress("a", "st2", 100.0).unwrap();
    let run = tracker.snapshot().unwrap();
    let a = run.phase("a").unwrap();
    assert_eq!(a.progress, 100.0);
    assert_eq!(a.status, PhaseStatus::Completed);
}

#[test]
fn test_alert_ring_keeps_most_recent_at_capacity() {
    let (tracker, _) = abc_tracker();
    for i in 0..150 {
        tracker
            .create_alert(AlertSeverity::Info, &format!("alert {i}"), None)
            .unwrap();
    }

    let run = tracker.snapshot().unwrap();
    assert_eq!(run.alerts.len(), run.alert_capacity);
    assert_eq!(run.alerts.back().unwrap().message, "alert 149");
    assert_eq!(run.alerts.front().unwrap().message, "alert 50");
}

#[test]
fn test_update_progress_requires_in_progress_phase() {
    let (tracker, _) = abc_tracker();
    let err = tracker.update_phase_progress("a", 10.0, None).unwrap_err();
    assert!(matches!(err, Error::StateTransition(_)));

    let err = tracker.update_phase_progress("ghost", 10.0, None).unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[test]
fn test_dashboard_reports_current_phase_and_counts() {
    let (tracker, _) = abc_tracker();
    tracker.start_phase("a").unwrap();
    tracker.update_phase_progress("a", 100.0, None).unwrap();
    tracker.start_phase("b").unwrap();

    let dashboard = tracker.dashboard().unwrap();
    assert_eq!(dashboard.overview.current_phase.as_deref(), Some("b"));
    assert_eq!(dashboard.overview.completed_phases, 1);
    assert_eq!(dashboard.overview.in_progress_phases, 1);
    assert_eq!(dashboard.timeline.len(), 3);
    assert_eq!(dashboard.timeline[1].estimated_start_offset_minutes, 30);
}
