//! Definitions of errors that the migration workload can encounter

use std::fmt;

use itertools::Itertools;

use crate::fixtures::{DropMode, FixtureRow, TableSchema};
use crate::session::SessionError;

/// A [`std::result::Result`] that has the migration-test [`Error`] as the error variant
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All the types of errors that the version catalog and the migration workload can return.
///
/// None of them are retried internally. Every error ends the invocation with a non-zero exit
/// code; recovering from a flaky catalog is up to whatever orchestrates the test phases.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The metadata document or the environment configuration is missing or malformed.
    #[error("Invalid migration test configuration ({origin}): {reason}")]
    Config { origin: String, reason: String },

    /// The catalog could not be reached, or the session setup was rejected.
    #[error("Failed to set up a session against catalog {catalog_url}: {source}")]
    Connection {
        catalog_url: String,
        #[source]
        source: SessionError,
    },

    /// Creating or populating a table failed. Aborts the rest of the task.
    #[error("Failed to write table {table}: {source}")]
    Write {
        table: String,
        #[source]
        source: SessionError,
    },

    /// One or more drops failed. Every drop is attempted before this is reported.
    #[error(
        "Failed to drop {} table(s): {}",
        .0.len(),
        .0.iter().map(ToString::to_string).join("; ")
    )]
    Drop(Vec<DropFailure>),

    /// A maintained table did not come through the migration intact.
    #[error("Migration incompatibility in table {table}: {failure}")]
    Read { table: String, failure: ReadFailure },

    /// A fixture set violates one of its structural invariants.
    #[error("Invalid table fixtures: {0}")]
    InvalidFixtures(String),
}

impl Error {
    pub(crate) fn config(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Config {
            origin: origin.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn write(table: impl Into<String>, source: SessionError) -> Self {
        Self::Write {
            table: table.into(),
            source,
        }
    }

    pub(crate) fn read(table: impl Into<String>, failure: ReadFailure) -> Self {
        Self::Read {
            table: table.into(),
            failure,
        }
    }

    /// True for the errors that mean a migration broke previously written data.
    pub fn is_migration_incompatibility(&self) -> bool {
        matches!(self, Error::Read { .. })
    }
}

/// A single failed drop, kept so the remaining drops can still be attempted.
#[derive(Debug)]
pub struct DropFailure {
    pub table: String,
    pub mode: DropMode,
    pub source: SessionError,
}

impl fmt::Display for DropFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({} drop): {}", self.table, self.mode, self.source)
    }
}

/// Why a maintained table failed validation after migration.
#[derive(thiserror::Error, Debug)]
pub enum ReadFailure {
    #[error("table not found")]
    NotFound,

    #[error("table is unreadable: {0}")]
    Unreadable(#[source] SessionError),

    #[error("schema changed, expected {expected} but found {actual}")]
    SchemaMismatch {
        expected: TableSchema,
        actual: TableSchema,
    },

    #[error("rows changed, expected {expected:?} but found {actual:?}")]
    RowMismatch {
        expected: Vec<FixtureRow>,
        actual: Vec<FixtureRow>,
    },
}
