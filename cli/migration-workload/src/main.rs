use std::process::ExitCode;

use clap::builder::{PossibleValuesParser, TypedValueParser};
use clap::Parser;
use migration_tests::config::WorkloadConfig;
use migration_tests::session::rest::run_task;
use migration_tests::WorkloadTask;
use tracing::info;

/// Run one phase of the catalog migration test against a live catalog.
///
/// Timeouts, credentials and storage overrides are read from `MIGRATION_TEST__*` environment
/// variables.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Task to run
    #[arg(value_parser = PossibleValuesParser::new(WorkloadTask::ALL.map(|t| t.as_str()))
        .try_map(|s| s.parse::<WorkloadTask>()))]
    task: WorkloadTask,

    /// Base URL of the Iceberg REST catalog, e.g. http://localhost:8181/catalog
    catalog_url: String,
}

fn main() -> ExitCode {
    common::init_tracing();
    common::exit_code(try_main())
}

fn try_main() -> migration_tests::Result<()> {
    let cli = Cli::parse();
    let config = WorkloadConfig::from_env(&cli.catalog_url)?;
    info!(task = %cli.task, ?config, "running migration workload");

    let report = run_task(cli.task, config)?;
    println!("{report}");
    Ok(())
}
