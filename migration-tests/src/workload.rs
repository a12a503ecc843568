//! One phase of the migration test protocol, run against one catalog.
//!
//! A [`MigrationWorkload`] owns its session for the duration of exactly one [`WorkloadTask`] and
//! releases it when the task returns. Nothing is kept between invocations: whatever the pre-
//! and post-migration phases share lives in the catalog.

use std::fmt;
use std::str::FromStr;
use std::thread;
use std::time::Duration;

use itertools::Itertools;
use tracing::{debug, info, instrument, warn};

use crate::config::WorkloadConfig;
use crate::error::{DropFailure, Error, ReadFailure, Result};
use crate::fixtures::{FixtureSet, TableFixture};
use crate::session::{CatalogSession, SessionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkloadTask {
    /// Create and populate every fixture table, drop the dropped ones and wait for soft-delete.
    WritePreMigration,
    /// Create and populate tables that only exist after the upgrade.
    WritePostMigration,
    /// Verify the maintained tables survived the upgrade intact.
    Read,
}

impl WorkloadTask {
    pub const ALL: [WorkloadTask; 3] = [
        WorkloadTask::WritePreMigration,
        WorkloadTask::WritePostMigration,
        WorkloadTask::Read,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkloadTask::WritePreMigration => "write_pre_migration",
            WorkloadTask::WritePostMigration => "write_post_migration",
            WorkloadTask::Read => "read",
        }
    }
}

impl fmt::Display for WorkloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "unknown task {:?}, expected one of: {}",
    .0,
    WorkloadTask::ALL.iter().join(", ")
)]
pub struct ParseTaskError(String);

impl FromStr for WorkloadTask {
    type Err = ParseTaskError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        WorkloadTask::ALL
            .into_iter()
            .find(|task| task.as_str() == s)
            .ok_or_else(|| ParseTaskError(s.to_string()))
    }
}

/// What a successful task did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
    pub task: WorkloadTask,
    /// Tables created and populated.
    pub written: Vec<String>,
    /// Tables dropped.
    pub dropped: Vec<String>,
    /// Tables scanned and found intact.
    pub verified: Vec<String>,
    /// Time spent blocking for soft-delete expiry.
    pub waited: Duration,
}

impl TaskReport {
    fn new(task: WorkloadTask) -> Self {
        Self {
            task,
            written: vec![],
            dropped: vec![],
            verified: vec![],
            waited: Duration::ZERO,
        }
    }
}

impl fmt::Display for TaskReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} succeeded", self.task)?;
        if !self.written.is_empty() {
            write!(f, "; wrote {}", self.written.join(", "))?;
        }
        if !self.dropped.is_empty() {
            write!(f, "; dropped {}", self.dropped.join(", "))?;
        }
        if !self.waited.is_zero() {
            write!(f, "; waited {:?}", self.waited)?;
        }
        if !self.verified.is_empty() {
            write!(f, "; verified {}", self.verified.join(", "))?;
        }
        Ok(())
    }
}

/// Runs a single [`WorkloadTask`] through a [`CatalogSession`].
pub struct MigrationWorkload<S> {
    session: S,
    config: WorkloadConfig,
}

impl<S: CatalogSession> MigrationWorkload<S> {
    /// Take ownership of an open session and make sure the fixture namespace exists.
    pub fn try_new(session: S, config: WorkloadConfig) -> Result<Self> {
        session
            .ensure_namespace(&config.namespace)
            .map_err(|source| Error::Connection {
                catalog_url: config.catalog_url.to_string(),
                source,
            })?;
        debug!(namespace = %config.namespace, "namespace ready");
        Ok(Self { session, config })
    }

    /// Run `task` on its default fixture set. The session is released when this returns.
    pub fn run(self, task: WorkloadTask) -> Result<TaskReport> {
        let fixtures = FixtureSet::for_task(task)?;
        self.run_with_fixtures(task, &fixtures)
    }

    /// Run `task` on a caller-provided fixture set.
    #[instrument(skip_all, fields(task = %task, catalog_url = %self.config.catalog_url))]
    pub fn run_with_fixtures(
        self,
        task: WorkloadTask,
        fixtures: &FixtureSet,
    ) -> Result<TaskReport> {
        info!("starting task");
        let report = match task {
            WorkloadTask::WritePreMigration => self.write_pre_migration(fixtures),
            WorkloadTask::WritePostMigration => self.write_post_migration(fixtures),
            WorkloadTask::Read => self.read(fixtures),
        }?;
        info!(%report, "task finished");
        Ok(report)
    }

    fn write_pre_migration(&self, fixtures: &FixtureSet) -> Result<TaskReport> {
        let mut report = TaskReport::new(WorkloadTask::WritePreMigration);
        report.written = self.write_tables(fixtures.all())?;

        if fixtures.dropped().is_empty() {
            return Ok(report);
        }

        let mut failures = vec![];
        for (table, mode) in fixtures.dropped() {
            let mode = *mode;
            match self.session.drop_table(&self.config.namespace, table, mode) {
                Ok(()) => {
                    info!(table = table.name(), %mode, "dropped table");
                    report.dropped.push(table.name().to_string());
                }
                Err(source) => {
                    warn!(table = table.name(), %mode, error = %source, "failed to drop table");
                    failures.push(DropFailure {
                        table: table.name().to_string(),
                        mode,
                        source,
                    });
                }
            }
        }

        let wait = self.config.soft_delete_wait;
        info!(?wait, "waiting for soft-deleted tables to expire");
        thread::sleep(wait);
        report.waited = wait;

        if failures.is_empty() {
            Ok(report)
        } else {
            Err(Error::Drop(failures))
        }
    }

    fn write_post_migration(&self, fixtures: &FixtureSet) -> Result<TaskReport> {
        let mut report = TaskReport::new(WorkloadTask::WritePostMigration);
        report.written = self.write_tables(fixtures.maintained())?;
        Ok(report)
    }

    fn read(&self, fixtures: &FixtureSet) -> Result<TaskReport> {
        let mut report = TaskReport::new(WorkloadTask::Read);
        for table in fixtures.maintained() {
            let scan = self
                .session
                .scan_table(&self.config.namespace, table)
                .map_err(|e| {
                    let failure = if e.is_not_found() {
                        ReadFailure::NotFound
                    } else {
                        ReadFailure::Unreadable(e)
                    };
                    Error::read(table.name(), failure)
                })?;
            info!(table = table.name(), "scanned\n{scan}");
            table
                .verify(&scan)
                .map_err(|failure| Error::read(table.name(), failure))?;
            info!(table = table.name(), rows = scan.rows.len(), "table intact");
            report.verified.push(table.name().to_string());
        }
        Ok(report)
    }

    /// Create, populate and read back every table. The first failure aborts.
    fn write_tables<'a>(
        &self,
        tables: impl IntoIterator<Item = &'a TableFixture>,
    ) -> Result<Vec<String>> {
        let namespace = &self.config.namespace;
        let mut written = vec![];
        for table in tables {
            self.session
                .create_or_replace_table(namespace, table)
                .map_err(|e| Error::write(table.name(), e))?;
            self.session
                .append_rows(namespace, table, &table.expected_rows())
                .map_err(|e| Error::write(table.name(), e))?;

            let scan = self
                .session
                .scan_table(namespace, table)
                .map_err(|e| Error::write(table.name(), e))?;
            info!(table = table.name(), "wrote table\n{scan}");
            table.verify(&scan).map_err(|failure| {
                Error::write(
                    table.name(),
                    SessionError::UnexpectedData(failure.to_string()),
                )
            })?;
            written.push(table.name().to_string());
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::rstest;

    use super::*;
    use crate::fixtures::{DropMode, FixtureRow, NAMESPACE};
    use crate::session::in_memory::InMemoryCatalog;

    fn config() -> WorkloadConfig {
        WorkloadConfig::builder("http://localhost:8181/catalog")
            .soft_delete_wait(Duration::from_millis(10))
            .build()
            .unwrap()
    }

    fn run(catalog: &Arc<InMemoryCatalog>, task: WorkloadTask) -> Result<TaskReport> {
        MigrationWorkload::try_new(catalog.session(), config())?.run(task)
    }

    #[rstest]
    #[case("write_pre_migration", WorkloadTask::WritePreMigration)]
    #[case("write_post_migration", WorkloadTask::WritePostMigration)]
    #[case("read", WorkloadTask::Read)]
    fn test_task_names_round_trip(#[case] name: &str, #[case] task: WorkloadTask) {
        assert_eq!(name.parse::<WorkloadTask>().unwrap(), task);
        assert_eq!(task.to_string(), name);
    }

    #[test]
    fn test_unknown_task() {
        let err = "write".parse::<WorkloadTask>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown task \"write\", expected one of: \
             write_pre_migration, write_post_migration, read"
        );
    }

    #[test_log::test]
    fn test_write_pre_migration_report() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let report = run(&catalog, WorkloadTask::WritePreMigration).unwrap();
        assert_eq!(
            report.written,
            ["my_table_0", "my_table_1", "my_table_2", "my_table_3"]
        );
        assert_eq!(report.dropped, ["my_table_2", "my_table_3"]);
        assert_eq!(report.waited, Duration::from_millis(10));
        assert_eq!(catalog.live_tables(NAMESPACE), ["my_table_0", "my_table_1"]);
        assert_eq!(
            report.to_string(),
            "write_pre_migration succeeded; wrote my_table_0, my_table_1, my_table_2, my_table_3; \
             dropped my_table_2, my_table_3; waited 10ms"
        );
    }

    #[test]
    fn test_write_pre_migration_drops_with_each_mode() {
        let catalog = Arc::new(InMemoryCatalog::new());
        run(&catalog, WorkloadTask::WritePreMigration).unwrap();
        let drops: Vec<_> = catalog
            .drop_log()
            .into_iter()
            .map(|record| (record.table, record.mode))
            .collect();
        assert_eq!(
            drops,
            [
                ("my_table_2".to_string(), DropMode::Soft),
                ("my_table_3".to_string(), DropMode::Purge),
            ]
        );
    }

    #[test]
    fn test_write_post_migration_only_touches_its_own_tables() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let report = run(&catalog, WorkloadTask::WritePostMigration).unwrap();
        assert_eq!(report.written, ["my_table_post_migration_0"]);
        assert!(report.dropped.is_empty());
        assert!(report.waited.is_zero());
        assert_eq!(catalog.live_tables(NAMESPACE), ["my_table_post_migration_0"]);
    }

    #[test]
    fn test_read_after_write() {
        let catalog = Arc::new(InMemoryCatalog::new());
        run(&catalog, WorkloadTask::WritePreMigration).unwrap();
        let report = run(&catalog, WorkloadTask::Read).unwrap();
        assert_eq!(report.verified, ["my_table_0", "my_table_1"]);
    }

    #[test]
    fn test_read_of_empty_catalog_is_not_found() {
        let catalog = Arc::new(InMemoryCatalog::new());
        let err = run(&catalog, WorkloadTask::Read).unwrap_err();
        assert!(matches!(
            err,
            Error::Read { ref table, failure: ReadFailure::NotFound } if table == "my_table_0"
        ));
        assert!(err.is_migration_incompatibility());
    }

    #[test]
    fn test_read_detects_changed_rows() {
        let catalog = Arc::new(InMemoryCatalog::new());
        run(&catalog, WorkloadTask::WritePreMigration).unwrap();
        catalog.replace_rows(
            NAMESPACE,
            "my_table_1",
            vec![FixtureRow::new(1, "a-string", 2.2)],
        );

        let err = run(&catalog, WorkloadTask::Read).unwrap_err();
        assert!(matches!(
            err,
            Error::Read { ref table, failure: ReadFailure::RowMismatch { .. } } if table == "my_table_1"
        ));
    }

    #[test]
    fn test_append_failure_aborts_the_task() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.fail_appends_to("my_table_1");

        let err = run(&catalog, WorkloadTask::WritePreMigration).unwrap_err();
        assert!(matches!(err, Error::Write { ref table, .. } if table == "my_table_1"));
        // nothing after the failing table was created, and nothing was dropped
        assert_eq!(catalog.live_tables(NAMESPACE), ["my_table_0", "my_table_1"]);
        assert!(catalog.drop_log().is_empty());
    }

    #[test]
    fn test_drop_failures_are_collected() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.fail_drops_of("my_table_2");

        let err = run(&catalog, WorkloadTask::WritePreMigration).unwrap_err();
        let failures = match err {
            Error::Drop(failures) => failures,
            other => panic!("expected a drop error, got {other}"),
        };
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].table, "my_table_2");
        assert!(matches!(failures[0].source, SessionError::Catalog(_)));
        // the purge drop after the failing one still happened
        assert_eq!(catalog.drop_log().len(), 1);
        assert_eq!(catalog.drop_log()[0].table, "my_table_3");
    }

    #[test]
    fn test_unreachable_catalog_fails_setup() {
        let catalog = Arc::new(InMemoryCatalog::new());
        catalog.set_unreachable(true);
        let result = MigrationWorkload::try_new(catalog.session(), config());
        assert!(matches!(
            result,
            Err(Error::Connection {
                source: SessionError::Unreachable(_),
                ..
            })
        ));
    }
}
