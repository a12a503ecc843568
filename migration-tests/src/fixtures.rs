//! The tables the migration workload writes, drops and reads.
//!
//! Every table is an explicit [`TableFixture`] value carrying its name, its [`TableRole`] and its
//! [`TableSchema`]. Tasks work on a [`FixtureSet`], which checks its structural invariants once
//! at construction: the maintained set is never empty, names are unique, and the dropped set
//! exercises every [`DropMode`].

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;

use crate::error::{Error, ReadFailure, Result};
use crate::session::TableScan;
use crate::workload::WorkloadTask;

/// Namespace every fixture table lives in.
pub const NAMESPACE: &str = "my_namespace";

/// Warehouse the catalog stores fixture data in.
pub const WAREHOUSE: &str = "demo";

/// Number of maintained tables in the pre-migration set.
const PRE_MIGRATION_MAINTAINED: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Long,
    String,
    Float,
    /// A type the fixtures never create, as reported by the catalog.
    Other(String),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Long => write!(f, "long"),
            ColumnType::String => write!(f, "string"),
            ColumnType::Float => write!(f, "float"),
            ColumnType::Other(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

impl ColumnSpec {
    pub fn nullable(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
        }
    }

    pub fn not_null(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
        }
    }
}

impl fmt::Display for ColumnSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.data_type)?;
        if !self.nullable {
            write!(f, " not null")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableSchema {
    columns: Vec<ColumnSpec>,
}

impl TableSchema {
    pub fn new(columns: impl IntoIterator<Item = ColumnSpec>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
        }
    }

    /// `id: long, strings: string, floats: float`, all nullable.
    pub fn fixture() -> Self {
        Self::new([
            ColumnSpec::nullable("id", ColumnType::Long),
            ColumnSpec::nullable("strings", ColumnType::String),
            ColumnSpec::nullable("floats", ColumnType::Float),
        ])
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|column| column.name == name)
    }
}

impl fmt::Display for TableSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "struct<{}>", self.columns.iter().join(", "))
    }
}

/// One row of a fixture table. Every column is nullable, so every field is optional.
#[derive(Debug, Clone, PartialEq)]
pub struct FixtureRow {
    pub id: Option<i64>,
    pub strings: Option<String>,
    pub floats: Option<f32>,
}

impl FixtureRow {
    pub fn new(id: i64, strings: impl Into<String>, floats: f32) -> Self {
        Self {
            id: Some(id),
            strings: Some(strings.into()),
            floats: Some(floats),
        }
    }
}

/// The two rows appended to every fixture table.
pub fn fixture_rows() -> Vec<FixtureRow> {
    vec![
        FixtureRow::new(1, "a-string", 2.2),
        FixtureRow::new(2, "b-string", 3.3),
    ]
}

/// Rows ordered by `id` (nulls first), so scans can be compared regardless of file order.
pub fn sorted_rows(rows: &[FixtureRow]) -> Vec<FixtureRow> {
    rows.iter().cloned().sorted_by_key(|row| row.id).collect()
}

/// The drop semantics a catalog offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropMode {
    /// Tombstone the table; the catalog keeps it recoverable until its retention expires.
    Soft,
    /// Remove the table and its data right away.
    Purge,
}

impl DropMode {
    pub const ALL: [DropMode; 2] = [DropMode::Soft, DropMode::Purge];

    pub fn is_purge(&self) -> bool {
        matches!(self, DropMode::Purge)
    }
}

impl fmt::Display for DropMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropMode::Soft => write!(f, "soft"),
            DropMode::Purge => write!(f, "purge"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableRole {
    /// Never dropped; has to be readable after the migration.
    Maintained,
    /// Dropped before the migration with the given semantics.
    Dropped(DropMode),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableFixture {
    name: String,
    role: TableRole,
    schema: TableSchema,
}

impl TableFixture {
    pub fn new(name: impl Into<String>, role: TableRole, schema: TableSchema) -> Self {
        Self {
            name: name.into(),
            role,
            schema,
        }
    }

    pub fn maintained(name: impl Into<String>) -> Self {
        Self::new(name, TableRole::Maintained, TableSchema::fixture())
    }

    pub fn dropped(name: impl Into<String>, mode: DropMode) -> Self {
        Self::new(name, TableRole::Dropped(mode), TableSchema::fixture())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> TableRole {
        self.role
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn expected_rows(&self) -> Vec<FixtureRow> {
        fixture_rows()
    }

    /// Check a full scan of this table against the schema and rows it was written with.
    pub fn verify(&self, scan: &TableScan) -> Result<(), ReadFailure> {
        if scan.schema != self.schema {
            return Err(ReadFailure::SchemaMismatch {
                expected: self.schema.clone(),
                actual: scan.schema.clone(),
            });
        }
        let expected = sorted_rows(&self.expected_rows());
        let actual = scan.sorted_rows();
        if actual != expected {
            return Err(ReadFailure::RowMismatch { expected, actual });
        }
        Ok(())
    }
}

/// The tables a single task works on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureSet {
    maintained: Vec<TableFixture>,
    dropped: Vec<(TableFixture, DropMode)>,
}

impl FixtureSet {
    pub fn try_new(maintained: Vec<TableFixture>, dropped: Vec<TableFixture>) -> Result<Self> {
        if maintained.is_empty() {
            return Err(Error::InvalidFixtures(
                "at least one table has to be maintained".to_string(),
            ));
        }
        if let Some(table) = maintained
            .iter()
            .find(|t| t.role() != TableRole::Maintained)
        {
            return Err(Error::InvalidFixtures(format!(
                "table {} is in the maintained set but has role {:?}",
                table.name(),
                table.role()
            )));
        }
        let dropped = dropped
            .into_iter()
            .map(|table| match table.role() {
                TableRole::Dropped(mode) => Ok((table, mode)),
                TableRole::Maintained => Err(Error::InvalidFixtures(format!(
                    "table {} is in the dropped set but has no drop mode",
                    table.name()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut names = HashSet::new();
        if let Some(duplicate) = maintained
            .iter()
            .chain(dropped.iter().map(|(table, _)| table))
            .find(|t| !names.insert(t.name()))
        {
            return Err(Error::InvalidFixtures(format!(
                "table name {} is used more than once",
                duplicate.name()
            )));
        }

        if !dropped.is_empty() {
            let covered: HashSet<_> = dropped.iter().map(|(_, mode)| *mode).collect();
            let missing = DropMode::ALL
                .iter()
                .filter(|mode| !covered.contains(*mode))
                .join(", ");
            if !missing.is_empty() {
                return Err(Error::InvalidFixtures(format!(
                    "dropped tables never use drop mode(s): {missing}"
                )));
            }
        }

        Ok(Self {
            maintained,
            dropped,
        })
    }

    /// `my_table_0` and `my_table_1` are kept; `my_table_2` is soft-dropped and `my_table_3` is
    /// purged.
    pub fn pre_migration() -> Result<Self> {
        let maintained = (0..PRE_MIGRATION_MAINTAINED)
            .map(|i| TableFixture::maintained(format!("my_table_{i}")))
            .collect();
        let dropped = DropMode::ALL
            .iter()
            .enumerate()
            .map(|(i, mode)| {
                TableFixture::dropped(format!("my_table_{}", PRE_MIGRATION_MAINTAINED + i), *mode)
            })
            .collect();
        Self::try_new(maintained, dropped)
    }

    /// Only the maintained half of [`FixtureSet::pre_migration`]: what a read expects to find.
    pub fn read() -> Result<Self> {
        let pre_migration = Self::pre_migration()?;
        Self::try_new(pre_migration.maintained, vec![])
    }

    /// Tables created only once the catalog has been upgraded.
    pub fn post_migration() -> Result<Self> {
        Self::try_new(
            vec![TableFixture::maintained("my_table_post_migration_0")],
            vec![],
        )
    }

    pub fn for_task(task: WorkloadTask) -> Result<Self> {
        match task {
            WorkloadTask::WritePreMigration => Self::pre_migration(),
            WorkloadTask::WritePostMigration => Self::post_migration(),
            WorkloadTask::Read => Self::read(),
        }
    }

    pub fn maintained(&self) -> &[TableFixture] {
        &self.maintained
    }

    /// Tables dropped before the migration, each with the mode it is dropped with.
    pub fn dropped(&self) -> &[(TableFixture, DropMode)] {
        &self.dropped
    }

    /// Maintained tables first, then dropped tables.
    pub fn all(&self) -> impl Iterator<Item = &TableFixture> {
        self.maintained
            .iter()
            .chain(self.dropped.iter().map(|(table, _)| table))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn names(fixtures: &[TableFixture]) -> Vec<&str> {
        fixtures.iter().map(TableFixture::name).collect()
    }

    #[test]
    fn test_pre_migration_tables() {
        let set = FixtureSet::pre_migration().unwrap();
        assert_eq!(names(set.maintained()), ["my_table_0", "my_table_1"]);
        let dropped: Vec<_> = set
            .dropped()
            .iter()
            .map(|(table, mode)| (table.name(), *mode))
            .collect();
        assert_eq!(
            dropped,
            [("my_table_2", DropMode::Soft), ("my_table_3", DropMode::Purge)]
        );
        assert!(set
            .dropped()
            .iter()
            .all(|(table, mode)| table.role() == TableRole::Dropped(*mode)));
        assert_eq!(
            set.all().map(TableFixture::name).collect::<Vec<_>>(),
            ["my_table_0", "my_table_1", "my_table_2", "my_table_3"]
        );
    }

    #[rstest]
    #[case::pre(WorkloadTask::WritePreMigration)]
    #[case::post(WorkloadTask::WritePostMigration)]
    #[case::read(WorkloadTask::Read)]
    fn test_every_task_maintains_a_table(#[case] task: WorkloadTask) {
        let set = FixtureSet::for_task(task).unwrap();
        assert!(!set.maintained().is_empty());
        assert!(set
            .maintained()
            .iter()
            .all(|t| t.role() == TableRole::Maintained));
    }

    #[test]
    fn test_read_set_is_pre_migration_maintained_set() {
        assert_eq!(
            FixtureSet::read().unwrap().maintained(),
            FixtureSet::pre_migration().unwrap().maintained()
        );
        assert!(FixtureSet::read().unwrap().dropped().is_empty());
    }

    #[test]
    fn test_post_migration_tables_are_disjoint_from_pre_migration() {
        let pre = FixtureSet::pre_migration().unwrap();
        let post = FixtureSet::post_migration().unwrap();
        assert!(post
            .all()
            .all(|p| pre.all().all(|t| t.name() != p.name())));
    }

    #[test]
    fn test_empty_maintained_set_is_rejected() {
        let result = FixtureSet::try_new(
            vec![],
            vec![
                TableFixture::dropped("a", DropMode::Soft),
                TableFixture::dropped("b", DropMode::Purge),
            ],
        );
        assert!(matches!(result, Err(Error::InvalidFixtures(_))));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let result = FixtureSet::try_new(
            vec![TableFixture::maintained("t")],
            vec![
                TableFixture::dropped("t", DropMode::Soft),
                TableFixture::dropped("u", DropMode::Purge),
            ],
        );
        assert!(matches!(result, Err(Error::InvalidFixtures(msg)) if msg.contains("t")));
    }

    #[test]
    fn test_dropped_set_must_cover_every_drop_mode() {
        let result = FixtureSet::try_new(
            vec![TableFixture::maintained("t")],
            vec![TableFixture::dropped("u", DropMode::Soft)],
        );
        assert!(matches!(result, Err(Error::InvalidFixtures(msg)) if msg.contains("purge")));
    }

    #[test]
    fn test_roles_must_match_their_set() {
        let result = FixtureSet::try_new(
            vec![TableFixture::dropped("t", DropMode::Soft)],
            vec![],
        );
        assert!(matches!(result, Err(Error::InvalidFixtures(_))));

        let result = FixtureSet::try_new(
            vec![TableFixture::maintained("t")],
            vec![TableFixture::maintained("u")],
        );
        assert!(matches!(result, Err(Error::InvalidFixtures(_))));
    }

    #[test]
    fn test_only_purge_requests_purging() {
        assert!(!DropMode::Soft.is_purge());
        assert!(DropMode::Purge.is_purge());
    }

    #[test]
    fn test_fixture_schema_display() {
        assert_eq!(
            TableSchema::fixture().to_string(),
            "struct<id: long, strings: string, floats: float>"
        );
        let schema = TableSchema::new([ColumnSpec::not_null("id", ColumnType::Long)]);
        assert_eq!(schema.to_string(), "struct<id: long not null>");
    }

    #[test]
    fn test_verify_accepts_rows_in_any_order() {
        let fixture = TableFixture::maintained("my_table_0");
        let mut rows = fixture_rows();
        rows.reverse();
        let scan = TableScan::new(TableSchema::fixture(), rows);
        assert!(fixture.verify(&scan).is_ok());
    }

    #[test]
    fn test_verify_reports_schema_change_before_rows() {
        let fixture = TableFixture::maintained("my_table_0");
        let schema = TableSchema::new([
            ColumnSpec::nullable("id", ColumnType::Long),
            ColumnSpec::nullable("strings", ColumnType::String),
            ColumnSpec::nullable("floats", ColumnType::Other("double".to_string())),
        ]);
        let scan = TableScan::new(schema, vec![]);
        assert!(matches!(
            fixture.verify(&scan),
            Err(ReadFailure::SchemaMismatch { .. })
        ));
    }

    #[rstest]
    #[case::missing_row(vec![FixtureRow::new(1, "a-string", 2.2)])]
    #[case::extra_row({
        let mut rows = fixture_rows();
        rows.push(FixtureRow::new(3, "c-string", 4.4));
        rows
    })]
    #[case::changed_value(vec![
        FixtureRow::new(1, "a-string", 2.2),
        FixtureRow::new(2, "b-string", 3.4),
    ])]
    #[case::null_value(vec![
        FixtureRow::new(1, "a-string", 2.2),
        FixtureRow { id: Some(2), strings: None, floats: Some(3.3) },
    ])]
    fn test_verify_rejects_changed_rows(#[case] rows: Vec<FixtureRow>) {
        let fixture = TableFixture::maintained("my_table_0");
        let scan = TableScan::new(TableSchema::fixture(), rows);
        assert!(matches!(
            fixture.verify(&scan),
            Err(ReadFailure::RowMismatch { .. })
        ));
    }
}
