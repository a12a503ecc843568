//! The compute session the workload issues table operations through.
//!
//! [`CatalogSession`] is a blocking interface: one call, one catalog operation. The REST
//! implementation drives async libraries on a runtime it owns, the in-memory implementation is
//! a model of a catalog used for testing the workload itself.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{
    new_null_array, Array, ArrayRef, Float32Array, Int64Array, RecordBatch, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema as ArrowSchema};
use arrow::error::ArrowError;
use arrow::util::display::FormatOptions;
use arrow::util::pretty::pretty_format_batches_with_options;

use crate::fixtures::{
    sorted_rows, ColumnType, DropMode, FixtureRow, TableFixture, TableSchema,
};

#[cfg(any(test, feature = "test-utils"))]
pub mod in_memory;
#[cfg(feature = "rest-session")]
pub mod rest;

pub type SessionResult<T> = std::result::Result<T, SessionError>;

/// Errors a [`CatalogSession`] reports. The workload attaches the table they happened on.
#[derive(thiserror::Error, Debug)]
pub enum SessionError {
    /// The table or namespace does not exist (or has been dropped).
    #[error("{0} not found")]
    NotFound(String),

    /// The catalog could not be reached at all.
    #[error("Catalog unreachable: {0}")]
    Unreachable(String),

    #[error("{operation} did not finish within {limit:?}")]
    Timeout {
        operation: &'static str,
        limit: Duration,
    },

    /// The catalog or the storage behind it rejected the operation.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The table could be read but its contents are not representable as fixture rows.
    #[error("Unexpected table data: {0}")]
    UnexpectedData(String),
}

impl SessionError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SessionError::NotFound(_))
    }
}

/// Everything a full-table scan observed.
#[derive(Debug, Clone, PartialEq)]
pub struct TableScan {
    pub schema: TableSchema,
    pub rows: Vec<FixtureRow>,
}

impl TableScan {
    pub fn new(schema: TableSchema, rows: Vec<FixtureRow>) -> Self {
        Self { schema, rows }
    }

    /// Rows ordered by `id`, independent of the data-file order the scan returned them in.
    pub fn sorted_rows(&self) -> Vec<FixtureRow> {
        sorted_rows(&self.rows)
    }
}

impl TableScan {
    /// The scanned rows as one arrow batch ordered by `id`. Columns that hold no fixture values
    /// come out all null.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let rows = self.sorted_rows();
        let fields: Vec<Field> = self
            .schema
            .columns()
            .iter()
            .map(|column| Field::new(&column.name, arrow_type(&column.data_type), true))
            .collect();
        let columns = fields
            .iter()
            .map(|field| {
                fixture_column(field.name(), &rows)
                    .filter(|column| column.data_type() == field.data_type())
                    .unwrap_or_else(|| new_null_array(field.data_type(), rows.len()))
            })
            .collect();
        RecordBatch::try_new(Arc::new(ArrowSchema::new(fields)), columns)
    }
}

fn arrow_type(data_type: &ColumnType) -> DataType {
    match data_type {
        ColumnType::Long => DataType::Int64,
        ColumnType::String => DataType::Utf8,
        ColumnType::Float => DataType::Float32,
        ColumnType::Other(_) => DataType::Null,
    }
}

/// Values of the fixture column called `name`, if there is one.
pub(crate) fn fixture_column(name: &str, rows: &[FixtureRow]) -> Option<ArrayRef> {
    let column: ArrayRef = match name {
        "id" => Arc::new(rows.iter().map(|row| row.id).collect::<Int64Array>()),
        "strings" => Arc::new(
            rows.iter()
                .map(|row| row.strings.as_deref())
                .collect::<StringArray>(),
        ),
        "floats" => Arc::new(rows.iter().map(|row| row.floats).collect::<Float32Array>()),
        _ => return None,
    };
    Some(column)
}

impl fmt::Display for TableScan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let options = FormatOptions::default().with_null("NULL");
        match self
            .to_record_batch()
            .and_then(|batch| pretty_format_batches_with_options(&[batch], &options))
        {
            Ok(table) => write!(f, "{table}"),
            Err(e) => write!(f, "<{} scanned rows: {e}>", self.rows.len()),
        }
    }
}

/// A compute session bound to one catalog, warehouse and default namespace.
///
/// Every call blocks until the catalog has answered. Implementations never retry.
pub trait CatalogSession {
    /// Create the namespace unless it already exists.
    fn ensure_namespace(&self, namespace: &str) -> SessionResult<()>;

    /// Purge any existing table with the fixture's name, then create it empty with the fixture
    /// schema.
    fn create_or_replace_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<()>;

    /// Append `rows` to the table in a single commit.
    fn append_rows(
        &self,
        namespace: &str,
        table: &TableFixture,
        rows: &[FixtureRow],
    ) -> SessionResult<()>;

    /// Read the full table. Fails with [`SessionError::NotFound`] if it does not exist.
    fn scan_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<TableScan>;

    fn drop_table(&self, namespace: &str, table: &TableFixture, mode: DropMode)
        -> SessionResult<()>;
}

impl<S: CatalogSession + ?Sized> CatalogSession for Box<S> {
    fn ensure_namespace(&self, namespace: &str) -> SessionResult<()> {
        (**self).ensure_namespace(namespace)
    }

    fn create_or_replace_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<()> {
        (**self).create_or_replace_table(namespace, table)
    }

    fn append_rows(
        &self,
        namespace: &str,
        table: &TableFixture,
        rows: &[FixtureRow],
    ) -> SessionResult<()> {
        (**self).append_rows(namespace, table, rows)
    }

    fn scan_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<TableScan> {
        (**self).scan_table(namespace, table)
    }

    fn drop_table(
        &self,
        namespace: &str,
        table: &TableFixture,
        mode: DropMode,
    ) -> SessionResult<()> {
        (**self).drop_table(namespace, table, mode)
    }
}
