//! Plumbing shared by the migration test CLIs.

use std::fmt::Display;
use std::process::ExitCode;

use clap::Args;
use migration_tests::versions::DEFAULT_MANIFEST_PATH;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Args)]
pub struct ManifestArgs {
    /// Manifest declaring `package.metadata.migration-tests.versions`
    #[arg(long, default_value = DEFAULT_MANIFEST_PATH)]
    pub manifest_path: String,
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Stdout is left for program output.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Map the outcome of `try_main` to the process exit code, logging the failure.
pub fn exit_code<E: Display>(result: Result<(), E>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
