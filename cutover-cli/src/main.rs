mod fixture;
mod render;

use std::{path::PathBuf, sync::Arc, time::Duration};

use chrono::Utc;
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use tracing::error;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use cutover_common::{
    alert::LogAlertSink,
    error::Error,
    plan::{MigrationPlan, parse_yaml},
    run::MigrationRun,
    store::{RunStore, default::LocalFsRunStore},
};
use cutover_engine::{
    batch::{DEFAULT_CONCURRENCY, DEFAULT_UNIT_TIMEOUT},
    estimator::CompletionEstimator,
    orchestrator::{Orchestrator, OrchestratorOptions, RunSummary},
    tracker::{Dashboard, ProgressTracker},
    workers::DEFAULT_BATCH_SIZE,
};

use fixture::DemoStores;

const DEFAULT_STATE_DIR: &str = ".cutover";

fn plan_arg() -> Arg {
    Arg::new("plan")
        .long("plan")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .required(true)
        .help("Path to the migration plan YAML")
}

fn state_dir_arg() -> Arg {
    Arg::new("state-dir")
        .long("state-dir")
        .value_name("DIR")
        .default_value(DEFAULT_STATE_DIR)
        .help("Directory holding persisted run documents")
}

fn cli() -> Command {
    Command::new("cutover")
        .about("Plan, rehearse and track platform migration runs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("plan")
                .about("Validate a plan and enumerate what each phase would move")
                .arg(plan_arg()),
        )
        .subcommand(
            Command::new("run")
                .about("Execute a migration plan")
                .arg(plan_arg())
                .arg(state_dir_arg())
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Enumerate and report without writing to any destination"),
                )
                .arg(
                    Arg::new("batch-size")
                        .long("batch-size")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Rows or keys moved per page where a phase does not set its own"),
                )
                .arg(
                    Arg::new("concurrency")
                        .long("concurrency")
                        .value_name("N")
                        .value_parser(value_parser!(usize))
                        .help("Units in flight per phase"),
                )
                .arg(
                    Arg::new("unit-timeout-secs")
                        .long("unit-timeout-secs")
                        .value_name("SECS")
                        .value_parser(value_parser!(u64))
                        .help("Per-unit timeout; a timed-out unit counts as failed"),
                )
                .arg(
                    Arg::new("skip-verification")
                        .long("skip-verification")
                        .action(ArgAction::SetTrue)
                        .help("Complete phases without the post-execution verification pass"),
                ),
        )
        .subcommand(
            Command::new("status")
                .about("Show the dashboard for a persisted run")
                .arg(state_dir_arg())
                .arg(
                    Arg::new("run-id")
                        .long("run-id")
                        .value_name("UUID")
                        .help("Run to inspect; defaults to the most recently updated"),
                ),
        )
}

async fn load_plan(matches: &ArgMatches) -> Result<MigrationPlan, Error> {
    let path = matches
        .get_one::<PathBuf>("plan")
        .ok_or_else(|| Error::Config("Missing --plan".to_string()))?;
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|io_err| Error::Config(format!("Cannot read {}: {io_err}", path.display())))?;
    parse_yaml(&raw)
}

async fn cmd_plan(matches: &ArgMatches) -> Result<i32, Error> {
    let plan = load_plan(matches).await?;

    // Validates dependency ids and acyclicity before any enumeration.
    ProgressTracker::initialize_migration(&plan, Arc::new(LogAlertSink))?;

    let stores = DemoStores::provision(&plan).await?;
    let mut estimates = Vec::with_capacity(plan.phases.len());
    for spec in &plan.phases {
        let estimate = match stores.worker_for(spec, DEFAULT_BATCH_SIZE)? {
            Some(worker) => Some(worker.plan().await?),
            None => None,
        };
        estimates.push((spec.clone(), estimate));
    }

    render::print_plan(&plan, &estimates);
    Ok(0)
}

async fn cmd_run(matches: &ArgMatches) -> Result<i32, Error> {
    let plan = load_plan(matches).await?;
    let state_dir = matches
        .get_one::<String>("state-dir")
        .map(String::as_str)
        .unwrap_or(DEFAULT_STATE_DIR);

    let options = OrchestratorOptions {
        dry_run: matches.get_flag("dry-run"),
        concurrency: matches
            .get_one::<usize>("concurrency")
            .copied()
            .unwrap_or(DEFAULT_CONCURRENCY),
        unit_timeout: matches
            .get_one::<u64>("unit-timeout-secs")
            .map(|secs| Duration::from_secs(*secs))
            .unwrap_or(DEFAULT_UNIT_TIMEOUT),
        skip_verification: matches.get_flag("skip-verification"),
        ..Default::default()
    };
    let batch_size = matches
        .get_one::<usize>("batch-size")
        .copied()
        .unwrap_or(DEFAULT_BATCH_SIZE);

    let stores = DemoStores::provision(&plan).await?;
    let tracker = Arc::new(ProgressTracker::initialize_migration(
        &plan,
        Arc::new(LogAlertSink),
    )?);
    let run_store = Arc::new(LocalFsRunStore::new(state_dir));

    let mut orchestrator = Orchestrator::new(tracker.clone(), run_store, options);
    for spec in &plan.phases {
        if let Some(worker) = stores.worker_for(spec, batch_size)? {
            orchestrator.register_worker(spec.id.clone(), worker);
        }
    }

    let summary = orchestrator.run().await?;
    render::print_summary(&summary);

    let run = tracker.snapshot()?;
    render::print_dashboard(
        &Dashboard::from_run(&run),
        CompletionEstimator::estimate(&run, Utc::now()),
    );

    Ok(run_exit_code(&summary))
}

/// Exit 0 only for a clean run. Failed phases and phases blocked by
/// verification both exit 1, even though the latter leave the run
/// status at `running`.
fn run_exit_code(summary: &RunSummary) -> i32 {
    if summary.is_clean() { 0 } else { 1 }
}

async fn cmd_status(matches: &ArgMatches) -> Result<i32, Error> {
    let state_dir = matches
        .get_one::<String>("state-dir")
        .map(String::as_str)
        .unwrap_or(DEFAULT_STATE_DIR);
    let store = LocalFsRunStore::new(state_dir);

    let run = match matches.get_one::<String>("run-id") {
        Some(raw) => {
            let run_id = Uuid::parse_str(raw)
                .map_err(|_| Error::Config(format!("Invalid run id: {raw}")))?;
            store.load(run_id).await?.ok_or_else(|| Error::NotFound {
                resource_type: "run".to_string(),
                resource_id: run_id.to_string(),
            })?
        }
        None => latest_run(&store).await?.ok_or_else(|| Error::NotFound {
            resource_type: "run".to_string(),
            resource_id: state_dir.to_string(),
        })?,
    };

    render::print_dashboard(
        &Dashboard::from_run(&run),
        CompletionEstimator::estimate(&run, Utc::now()),
    );
    Ok(0)
}

async fn latest_run(store: &LocalFsRunStore) -> Result<Option<MigrationRun>, Error> {
    let mut latest: Option<MigrationRun> = None;
    for run_id in store.list_runs().await? {
        if let Some(run) = store.load(run_id).await?
            && latest.as_ref().is_none_or(|l| run.updated_at > l.updated_at)
        {
            latest = Some(run);
        }
    }
    Ok(latest)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let matches = cli().get_matches();
    let result = match matches.subcommand() {
        Some(("plan", sub)) => cmd_plan(sub).await,
        Some(("run", sub)) => cmd_run(sub).await,
        Some(("status", sub)) => cmd_status(sub).await,
        _ => unreachable!("subcommand is required"),
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            if e.is_configuration() { 2 } else { 3 }
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use cutover_common::run::RunStatus;
    use uuid::Uuid;

    use super::*;

    fn summary(status: RunStatus) -> RunSummary {
        RunSummary {
            run_id: Uuid::new_v4(),
            status,
            overall_progress: 75.0,
            failed_phases: vec![],
            verification_failed: vec![],
            total_failed_units: 0,
        }
    }

    #[test]
    fn test_clean_stall_on_manual_phases_exits_zero() {
        assert_eq!(run_exit_code(&summary(RunStatus::Running)), 0);
        assert_eq!(run_exit_code(&summary(RunStatus::Completed)), 0);
    }

    #[test]
    fn test_failed_run_exits_one() {
        let mut s = summary(RunStatus::Failed);
        s.failed_phases = vec!["database".to_string()];
        s.total_failed_units = 4;
        assert_eq!(run_exit_code(&s), 1);
    }

    #[test]
    fn test_verification_blocked_run_exits_one() {
        // Status stays `running` when verification blocks a phase; the
        // exit code must still distinguish it from a clean stall.
        let mut s = summary(RunStatus::Running);
        s.verification_failed = vec!["storage".to_string()];
        assert_eq!(run_exit_code(&s), 1);
    }
}
