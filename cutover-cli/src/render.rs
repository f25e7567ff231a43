use byte_unit::{Byte, UnitType};
use chrono::{DateTime, Utc};

use cutover_common::plan::{MigrationPlan, PhaseSpec};
use cutover_engine::{
    orchestrator::RunSummary,
    tracker::Dashboard,
    workers::MigrationEstimate,
};

pub fn human_bytes(bytes: u64) -> String {
    format!(
        "{:.2}",
        Byte::from_u64(bytes).get_appropriate_unit(UnitType::Decimal)
    )
}

pub fn print_plan(plan: &MigrationPlan, estimates: &[(PhaseSpec, Option<MigrationEstimate>)]) {
    println!(
        "Plan {} ({} phases)",
        plan.name.as_deref().unwrap_or(&plan.version),
        plan.phases.len()
    );
    for (spec, estimate) in estimates {
        let deps = if spec.depends_on.is_empty() {
            "none".to_string()
        } else {
            spec.depends_on.join(", ")
        };
        println!("\n  {} [{}]: {}", spec.id, spec.kind, spec.name);
        println!("    depends on: {deps}");
        println!("    estimated duration: {} min", spec.estimated_duration_minutes);

        match estimate {
            None => println!("    manual phase; nothing to enumerate"),
            Some(estimate) => {
                println!(
                    "    would move {} units, {}",
                    estimate.total_units,
                    human_bytes(estimate.total_size_bytes)
                );
                for (category, count) in &estimate.categories {
                    println!("      {category}: {count}");
                }
            }
        }
    }
}

pub fn print_summary(summary: &RunSummary) {
    println!("\nRun {} finished: {}", summary.run_id, summary.status);
    println!("  overall progress: {:.1}%", summary.overall_progress);
    if !summary.failed_phases.is_empty() {
        println!(
            "  failed phases: {} ({} failed units)",
            summary.failed_phases.join(", "),
            summary.total_failed_units
        );
    }
    if !summary.verification_failed.is_empty() {
        println!(
            "  verification failed: {} (phases left in progress)",
            summary.verification_failed.join(", ")
        );
    }
}

pub fn print_dashboard(dashboard: &Dashboard, eta: Option<DateTime<Utc>>) {
    let overview = &dashboard.overview;
    println!("Run {}: {}", overview.run_id, overview.status);
    println!(
        "  progress: {:.1}% | phases: {} total, {} completed, {} in progress, {} failed, {} skipped",
        overview.overall_progress,
        overview.total_phases,
        overview.completed_phases,
        overview.in_progress_phases,
        overview.failed_phases,
        overview.skipped_phases,
    );
    if let Some(current) = &overview.current_phase {
        println!("  current phase: {current}");
    }
    match eta {
        Some(eta) => println!("  estimated completion: {}", eta.to_rfc3339()),
        None => println!("  estimated completion: unavailable"),
    }

    let metrics = &dashboard.metrics;
    println!(
        "  moved {} at {}/s | operations: {} ok, {} failed ({:.2}% error rate)",
        human_bytes(metrics.total_data_migrated_bytes),
        human_bytes(metrics.migration_speed_bps as u64),
        metrics.successful_operations,
        metrics.failed_operations,
        metrics.error_rate_pct,
    );

    println!("\n  Timeline:");
    for entry in &dashboard.timeline {
        println!(
            "    +{:>4} min  {:<24} {:<12} {:>5.1}%",
            entry.estimated_start_offset_minutes, entry.phase_id, entry.status, entry.progress
        );
    }

    if !dashboard.recent_alerts.is_empty() {
        println!("\n  Recent alerts:");
        for alert in &dashboard.recent_alerts {
            let scope = alert.phase_id.as_deref().unwrap_or("run");
            println!(
                "    [{}] {} ({}) {}",
                alert.severity,
                alert.timestamp.to_rfc3339(),
                scope,
                alert.message
            );
        }
    }
}
