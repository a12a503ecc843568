//! Cross-version migration tests for Iceberg REST catalogs.
//!
//! A migration test checks that state written by one catalog release is still served correctly
//! once the catalog has been upgraded in place. This crate provides the two pieces a CI pipeline
//! drives for that:
//!
//! - [`versions::VersionSpec`] lists the historical catalog releases to test against. The list
//!   lives in this crate's `Cargo.toml` under `package.metadata.migration-tests.versions`.
//! - [`workload::MigrationWorkload`] runs one phase of the write, drop and read protocol against a
//!   running catalog through a [`session::CatalogSession`].
//!
//! The pipeline starts a catalog at an old release, runs
//! [`WorkloadTask::WritePreMigration`](workload::WorkloadTask::WritePreMigration), upgrades the
//! catalog, and then runs [`WorkloadTask::Read`](workload::WorkloadTask::Read) (and optionally
//! [`WorkloadTask::WritePostMigration`](workload::WorkloadTask::WritePostMigration)) against the
//! same persisted state. Every phase is a separate process; nothing is carried over in memory.
//!
//! ```no_run
//! # #[cfg(feature = "rest-session")]
//! # fn main() -> migration_tests::Result<()> {
//! use migration_tests::config::WorkloadConfig;
//! use migration_tests::session::rest::IcebergRestSession;
//! use migration_tests::workload::{MigrationWorkload, WorkloadTask};
//!
//! let config = WorkloadConfig::builder("http://localhost:8181/catalog").build()?;
//! let session = IcebergRestSession::connect(&config)?;
//! let report = MigrationWorkload::try_new(session, config)?.run(WorkloadTask::Read)?;
//! println!("{report}");
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "rest-session"))]
//! # fn main() {}
//! ```

pub mod config;
pub mod error;
pub mod fixtures;
pub mod session;
pub mod versions;
pub mod workload;

pub use error::{DropFailure, Error, ReadFailure, Result};
pub use fixtures::{FixtureSet, TableFixture};
pub use session::{CatalogSession, SessionError, TableScan};
pub use versions::VersionSpec;
pub use workload::{MigrationWorkload, TaskReport, WorkloadTask};
