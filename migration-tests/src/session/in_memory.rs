//! In-memory implementation of [`CatalogSession`] for testing.
//!
//! An [`InMemoryCatalog`] plays the part of the catalog server: it outlives the sessions opened
//! against it, so several workload invocations sharing one catalog see the same persisted state
//! the way separate CI phases do against a real server.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::fixtures::{DropMode, FixtureRow, TableFixture, TableSchema};

use super::{CatalogSession, SessionError, SessionResult, TableScan};

/// How long a soft-dropped table stays recoverable unless configured otherwise.
pub const DEFAULT_SOFT_DELETE_RETENTION: Duration = Duration::from_secs(1);

type TableKey = (String, String);

fn key(namespace: &str, table: &str) -> TableKey {
    (namespace.to_string(), table.to_string())
}

#[derive(Debug, Clone)]
struct StoredTable {
    schema: TableSchema,
    rows: Vec<FixtureRow>,
}

#[derive(Debug, Clone)]
struct Tombstone {
    table: StoredTable,
    dropped_at: Instant,
}

/// A drop the catalog accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropRecord {
    pub namespace: String,
    pub table: String,
    pub mode: DropMode,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct CatalogState {
    namespaces: BTreeSet<String>,
    tables: BTreeMap<TableKey, StoredTable>,
    tombstones: BTreeMap<TableKey, Tombstone>,
    drops: Vec<DropRecord>,
    unreachable: bool,
    failing_appends: HashSet<String>,
    failing_drops: HashSet<String>,
}

/// A model of an Iceberg REST catalog: namespaces, live tables, soft-delete tombstones with a
/// retention window, and injectable faults.
#[derive(Debug)]
pub struct InMemoryCatalog {
    state: RwLock<CatalogState>,
    retention: Duration,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_SOFT_DELETE_RETENTION)
    }

    pub fn with_retention(retention: Duration) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            retention,
        }
    }

    /// Open a session against this catalog.
    pub fn session(self: &Arc<Self>) -> InMemorySession {
        InMemorySession {
            catalog: Arc::clone(self),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, CatalogState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CatalogState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate a catalog that does not answer: every session call fails with
    /// [`SessionError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.write().unreachable = unreachable;
    }

    /// Make every append to `table` fail.
    pub fn fail_appends_to(&self, table: impl Into<String>) {
        self.write().failing_appends.insert(table.into());
    }

    /// Make every drop of `table` fail.
    pub fn fail_drops_of(&self, table: impl Into<String>) {
        self.write().failing_drops.insert(table.into());
    }

    /// Overwrite the stored rows of a live table, as a broken migration might. Returns false if
    /// the table does not exist.
    pub fn replace_rows(&self, namespace: &str, table: &str, rows: Vec<FixtureRow>) -> bool {
        match self.write().tables.get_mut(&key(namespace, table)) {
            Some(stored) => {
                stored.rows = rows;
                true
            }
            None => false,
        }
    }

    /// Overwrite the schema of a live table. Returns false if the table does not exist.
    pub fn replace_schema(&self, namespace: &str, table: &str, schema: TableSchema) -> bool {
        match self.write().tables.get_mut(&key(namespace, table)) {
            Some(stored) => {
                stored.schema = schema;
                true
            }
            None => false,
        }
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.read().namespaces.contains(namespace)
    }

    /// Names of the live tables in `namespace`, sorted.
    pub fn live_tables(&self, namespace: &str) -> Vec<String> {
        self.read()
            .tables
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, table)| table.clone())
            .collect()
    }

    /// Names of the soft-dropped tables in `namespace` still inside their retention window.
    pub fn tombstoned_tables(&self, namespace: &str) -> Vec<String> {
        self.read()
            .tombstones
            .iter()
            .filter(|((ns, _), tombstone)| {
                ns == namespace && tombstone.dropped_at.elapsed() < self.retention
            })
            .map(|((_, table), _)| table.clone())
            .collect()
    }

    /// Bring a soft-dropped table back if its retention has not expired yet.
    pub fn undrop(&self, namespace: &str, table: &str) -> bool {
        let mut state = self.write();
        let table_key = key(namespace, table);
        match state.tombstones.remove(&table_key) {
            Some(tombstone) if tombstone.dropped_at.elapsed() < self.retention => {
                state.tables.insert(table_key, tombstone.table);
                true
            }
            _ => false,
        }
    }

    /// Every accepted drop, in the order it happened.
    pub fn drop_log(&self) -> Vec<DropRecord> {
        self.read().drops.clone()
    }

    fn check_reachable(&self) -> SessionResult<()> {
        if self.read().unreachable {
            return Err(SessionError::Unreachable(
                "in-memory catalog is offline".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

/// A session onto a shared [`InMemoryCatalog`].
#[derive(Debug, Clone)]
pub struct InMemorySession {
    catalog: Arc<InMemoryCatalog>,
}

impl CatalogSession for InMemorySession {
    fn ensure_namespace(&self, namespace: &str) -> SessionResult<()> {
        self.catalog.check_reachable()?;
        if self.catalog.write().namespaces.insert(namespace.to_string()) {
            debug!(namespace, "created namespace");
        }
        Ok(())
    }

    fn create_or_replace_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<()> {
        self.catalog.check_reachable()?;
        let mut state = self.catalog.write();
        if !state.namespaces.contains(namespace) {
            return Err(SessionError::NotFound(format!("namespace {namespace}")));
        }
        let replaced = state.tables.insert(
            key(namespace, table.name()),
            StoredTable {
                schema: table.schema().clone(),
                rows: vec![],
            },
        );
        debug!(namespace, table = table.name(), replaced = replaced.is_some(), "created table");
        Ok(())
    }

    fn append_rows(
        &self,
        namespace: &str,
        table: &TableFixture,
        rows: &[FixtureRow],
    ) -> SessionResult<()> {
        self.catalog.check_reachable()?;
        let mut state = self.catalog.write();
        if state.failing_appends.contains(table.name()) {
            return Err(SessionError::Catalog(format!(
                "commit to {namespace}.{} rejected",
                table.name()
            )));
        }
        let stored = state
            .tables
            .get_mut(&key(namespace, table.name()))
            .ok_or_else(|| SessionError::NotFound(format!("{namespace}.{}", table.name())))?;
        stored.rows.extend_from_slice(rows);
        Ok(())
    }

    fn scan_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<TableScan> {
        self.catalog.check_reachable()?;
        let state = self.catalog.read();
        let stored = state
            .tables
            .get(&key(namespace, table.name()))
            .ok_or_else(|| SessionError::NotFound(format!("{namespace}.{}", table.name())))?;
        Ok(TableScan::new(stored.schema.clone(), stored.rows.clone()))
    }

    fn drop_table(
        &self,
        namespace: &str,
        table: &TableFixture,
        mode: DropMode,
    ) -> SessionResult<()> {
        self.catalog.check_reachable()?;
        let mut state = self.catalog.write();
        if state.failing_drops.contains(table.name()) {
            return Err(SessionError::Catalog(format!(
                "drop of {namespace}.{} rejected",
                table.name()
            )));
        }
        let table_key = key(namespace, table.name());
        let stored = state
            .tables
            .remove(&table_key)
            .ok_or_else(|| SessionError::NotFound(format!("{namespace}.{}", table.name())))?;
        match mode {
            DropMode::Soft => {
                state.tombstones.insert(
                    table_key,
                    Tombstone {
                        table: stored,
                        dropped_at: Instant::now(),
                    },
                );
            }
            DropMode::Purge => {
                state.tombstones.remove(&table_key);
            }
        }
        state.drops.push(DropRecord {
            namespace: namespace.to_string(),
            table: table.name().to_string(),
            mode,
            at: Instant::now(),
        });
        Ok(())
    }
}
