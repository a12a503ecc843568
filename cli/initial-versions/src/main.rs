use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use common::ManifestArgs;
use migration_tests::versions::VersionSpec;
use tracing::debug;

/// Print the catalog versions migration tests start from.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    manifest_args: ManifestArgs,

    /// Output shape
    #[arg(long, value_enum, default_value_t = Format::Matrix)]
    format: Format,

    /// Variable name for the assignment format
    #[arg(long, default_value = "initial-versions")]
    name: String,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    /// `{"versions":[...]}` for a CI fan-out matrix
    Matrix,
    /// `<name>=[...]` for direct variable assignment
    Assignment,
}

fn main() -> ExitCode {
    common::init_tracing();
    common::exit_code(try_main())
}

fn try_main() -> migration_tests::Result<()> {
    let cli = Cli::parse();
    let spec = VersionSpec::load(&cli.manifest_args.manifest_path)?;
    debug!(path = %cli.manifest_args.manifest_path, versions = spec.len(), "loaded versions");

    match cli.format {
        Format::Matrix => println!("{}", spec.as_matrix_json()?),
        Format::Assignment => println!("{}", spec.as_assignment_line(&cli.name)),
    }
    Ok(())
}
