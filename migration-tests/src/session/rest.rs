//! [`CatalogSession`] against a live Iceberg REST catalog.
//!
//! Table creation, Parquet writes, commits and scans go through iceberg-rust's `RestCatalog`.
//! Existence probes and drops go through [`catalog_client`], because only the raw REST call lets
//! the workload choose between a soft drop and a purge.
//!
//! The session owns a current-thread tokio runtime and blocks on it for every call, so the
//! workload itself stays synchronous.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use arrow::array::{Array, Float32Array, Int64Array, RecordBatch, StringArray};
use catalog_client::{Authentication, ClientConfig, RestCatalogClient};
use futures::TryStreamExt;
use iceberg::arrow::schema_to_arrow_schema;
use iceberg::io::{
    S3_ACCESS_KEY_ID, S3_ENDPOINT, S3_PATH_STYLE_ACCESS, S3_REGION, S3_SECRET_ACCESS_KEY,
};
use iceberg::spec::{
    DataFile, DataFileFormat, NestedField, PrimitiveType, Schema, Type,
    PROPERTY_WRITE_TARGET_FILE_SIZE_BYTES_DEFAULT,
};
use iceberg::table::Table;
use iceberg::transaction::{ApplyTransactionAction, Transaction};
use iceberg::writer::base_writer::data_file_writer::DataFileWriterBuilder;
use iceberg::writer::file_writer::location_generator::{
    DefaultFileNameGenerator, DefaultLocationGenerator,
};
use iceberg::writer::file_writer::rolling_writer::RollingFileWriterBuilder;
use iceberg::writer::file_writer::ParquetWriterBuilder;
use iceberg::writer::{IcebergWriter, IcebergWriterBuilder};
use iceberg::{Catalog, CatalogBuilder, ErrorKind, NamespaceIdent, TableCreation, TableIdent};
use iceberg_catalog_rest::{
    RestCatalog, RestCatalogBuilder, REST_CATALOG_PROP_URI, REST_CATALOG_PROP_WAREHOUSE,
};
use parquet::file::properties::WriterProperties;
use tokio::runtime::Runtime;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::{Credentials, WorkloadConfig};
use crate::error::{Error, Result};
use crate::fixtures::{ColumnSpec, ColumnType, DropMode, FixtureRow, TableFixture, TableSchema};
use crate::workload::{MigrationWorkload, TaskReport, WorkloadTask};

use super::{fixture_column, CatalogSession, SessionError, SessionResult, TableScan};

/// Name the iceberg catalog is registered under. Only shows up in iceberg's own logs.
const CATALOG_NAME: &str = "migration-tests";

/// Prefix of every data file the session writes.
const DATA_FILE_PREFIX: &str = "migration-test";

/// Connect to the catalog at `config.catalog_url` and run `task` on its default fixtures.
pub fn run_task(task: WorkloadTask, config: WorkloadConfig) -> Result<TaskReport> {
    let session = IcebergRestSession::connect(&config)?;
    MigrationWorkload::try_new(session, config)?.run(task)
}

pub struct IcebergRestSession {
    runtime: Runtime,
    catalog: RestCatalog,
    client: RestCatalogClient,
    operation_timeout: Option<Duration>,
}

impl IcebergRestSession {
    /// Open a session: resolve the warehouse, authenticate and set up the REST catalog.
    #[instrument(skip_all, fields(catalog_url = %config.catalog_url))]
    pub fn connect(config: &WorkloadConfig) -> Result<Self> {
        let connection_error = |source| Error::Connection {
            catalog_url: config.catalog_url.to_string(),
            source,
        };

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| connection_error(SessionError::Catalog(e.to_string())))?;

        let client_config = ClientConfig::builder(config.catalog_url.as_str(), &config.warehouse)
            .authentication(authentication(&config.credentials))
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| connection_error(client_error(e)))?;
        let client = runtime
            .block_on(RestCatalogClient::connect(client_config))
            .map_err(|e| connection_error(client_error(e)))?;

        let catalog = runtime
            .block_on(
                RestCatalogBuilder::default().load(CATALOG_NAME, catalog_properties(config)),
            )
            .map_err(|e| connection_error(iceberg_error(e)))?;
        debug!(prefix = ?client.prefix(), "session ready");

        Ok(Self {
            runtime,
            catalog,
            client,
            operation_timeout: config.operation_timeout,
        })
    }

    /// Drive `future` to completion on the session runtime, bounded by the operation timeout.
    fn block_on<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = SessionResult<T>>,
    ) -> SessionResult<T> {
        match self.operation_timeout {
            Some(limit) => self.runtime.block_on(async {
                tokio::time::timeout(limit, future)
                    .await
                    .map_err(|_| SessionError::Timeout { operation, limit })?
            }),
            None => self.runtime.block_on(future),
        }
    }

    async fn load_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<Table> {
        if !self
            .client
            .table_exists(namespace, table.name())
            .await
            .map_err(client_error)?
        {
            return Err(SessionError::NotFound(format!("{namespace}.{}", table.name())));
        }
        self.catalog
            .load_table(&table_ident(namespace, table)?)
            .await
            .map_err(iceberg_error)
    }
}

impl CatalogSession for IcebergRestSession {
    #[instrument(skip(self))]
    fn ensure_namespace(&self, namespace: &str) -> SessionResult<()> {
        self.block_on("ensure_namespace", async {
            let ident = namespace_ident(namespace)?;
            if self
                .catalog
                .namespace_exists(&ident)
                .await
                .map_err(iceberg_error)?
            {
                return Ok(());
            }
            match self.catalog.create_namespace(&ident, HashMap::new()).await {
                Ok(_) => {
                    debug!("created namespace");
                    Ok(())
                }
                Err(e) if matches!(e.kind(), ErrorKind::NamespaceAlreadyExists) => Ok(()),
                Err(e) => Err(iceberg_error(e)),
            }
        })
    }

    #[instrument(skip_all, fields(table = table.name()))]
    fn create_or_replace_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<()> {
        self.block_on("create_or_replace_table", async {
            if self
                .client
                .table_exists(namespace, table.name())
                .await
                .map_err(client_error)?
            {
                debug!("purging existing table");
                self.client
                    .drop_table(namespace, table.name(), true)
                    .await
                    .map_err(client_error)?;
            }

            let creation = TableCreation::builder()
                .name(table.name().to_string())
                .schema(iceberg_schema(table.schema())?)
                .build();
            self.catalog
                .create_table(&namespace_ident(namespace)?, creation)
                .await
                .map_err(iceberg_error)?;
            Ok(())
        })
    }

    #[instrument(skip_all, fields(table = table.name(), rows = rows.len()))]
    fn append_rows(
        &self,
        namespace: &str,
        table: &TableFixture,
        rows: &[FixtureRow],
    ) -> SessionResult<()> {
        self.block_on("append_rows", async {
            let loaded = self.load_table(namespace, table).await?;
            let batch = record_batch(loaded.metadata().current_schema(), rows)?;
            let data_files = write_data_files(&loaded, batch)
                .await
                .map_err(iceberg_error)?;

            let tx = Transaction::new(&loaded);
            let tx = tx
                .fast_append()
                .add_data_files(data_files)
                .apply(tx)
                .map_err(iceberg_error)?;
            tx.commit(&self.catalog).await.map_err(iceberg_error)?;
            Ok(())
        })
    }

    #[instrument(skip_all, fields(table = table.name()))]
    fn scan_table(&self, namespace: &str, table: &TableFixture) -> SessionResult<TableScan> {
        self.block_on("scan_table", async {
            let loaded = self.load_table(namespace, table).await?;
            let schema = table_schema(loaded.metadata().current_schema());
            // rows are only decoded against the columns they were written with
            if &schema != table.schema() {
                return Ok(TableScan::new(schema, vec![]));
            }
            let Some(snapshot_id) = loaded.metadata().current_snapshot_id() else {
                return Ok(TableScan::new(schema, vec![]));
            };

            let batches: Vec<RecordBatch> = loaded
                .scan()
                .snapshot_id(snapshot_id)
                .select_all()
                .build()
                .map_err(iceberg_error)?
                .to_arrow()
                .await
                .map_err(iceberg_error)?
                .try_collect()
                .await
                .map_err(iceberg_error)?;

            let mut rows = vec![];
            for batch in &batches {
                rows.extend(rows_from_batch(batch)?);
            }
            Ok(TableScan::new(schema, rows))
        })
    }

    #[instrument(skip_all, fields(table = table.name(), %mode))]
    fn drop_table(
        &self,
        namespace: &str,
        table: &TableFixture,
        mode: DropMode,
    ) -> SessionResult<()> {
        self.block_on("drop_table", async {
            self.client
                .drop_table(namespace, table.name(), mode.is_purge())
                .await
                .map_err(client_error)
        })
    }
}

fn authentication(credentials: &Credentials) -> Authentication {
    match credentials {
        Credentials::None => Authentication::Anonymous,
        Credentials::Token(token) => Authentication::Token(token.clone()),
        Credentials::ClientCredentials {
            client_id,
            client_secret,
            token_endpoint,
            scope,
        } => Authentication::ClientCredentials {
            token_endpoint: token_endpoint.clone(),
            client_id: client_id.clone(),
            client_secret: client_secret.clone(),
            scope: scope.clone(),
        },
    }
}

/// Properties understood by `RestCatalogBuilder` and iceberg's S3 file IO.
fn catalog_properties(config: &WorkloadConfig) -> HashMap<String, String> {
    let mut props = HashMap::from([
        (
            REST_CATALOG_PROP_URI.to_string(),
            config.catalog_url.as_str().trim_end_matches('/').to_string(),
        ),
        (
            REST_CATALOG_PROP_WAREHOUSE.to_string(),
            config.warehouse.clone(),
        ),
    ]);

    match &config.credentials {
        Credentials::None => {}
        Credentials::Token(token) => {
            props.insert("token".to_string(), token.clone());
        }
        Credentials::ClientCredentials {
            client_id,
            client_secret,
            token_endpoint,
            scope,
        } => {
            props.insert(
                "credential".to_string(),
                format!("{client_id}:{client_secret}"),
            );
            if let Some(endpoint) = token_endpoint {
                props.insert("oauth2-server-uri".to_string(), endpoint.to_string());
            }
            if let Some(scope) = scope {
                props.insert("scope".to_string(), scope.clone());
            }
        }
    }

    let storage = &config.storage;
    for (key, value) in [
        (S3_ENDPOINT, &storage.s3_endpoint),
        (S3_ACCESS_KEY_ID, &storage.s3_access_key),
        (S3_SECRET_ACCESS_KEY, &storage.s3_secret_key),
        (S3_REGION, &storage.s3_region),
    ] {
        if let Some(value) = value {
            props.insert(key.to_string(), value.clone());
        }
    }
    if let Some(path_style) = storage.s3_path_style_access {
        props.insert(S3_PATH_STYLE_ACCESS.to_string(), path_style.to_string());
    }
    props
}

fn namespace_ident(namespace: &str) -> SessionResult<NamespaceIdent> {
    NamespaceIdent::from_strs(namespace.split('.')).map_err(iceberg_error)
}

fn table_ident(namespace: &str, table: &TableFixture) -> SessionResult<TableIdent> {
    Ok(TableIdent::new(
        namespace_ident(namespace)?,
        table.name().to_string(),
    ))
}

fn iceberg_schema(schema: &TableSchema) -> SessionResult<Schema> {
    let fields = schema
        .columns()
        .iter()
        .zip(1..)
        .map(|(column, id)| {
            let primitive = match &column.data_type {
                ColumnType::Long => PrimitiveType::Long,
                ColumnType::String => PrimitiveType::String,
                ColumnType::Float => PrimitiveType::Float,
                ColumnType::Other(name) => {
                    return Err(SessionError::UnexpectedData(format!(
                        "cannot create column {} of type {name}",
                        column.name
                    )))
                }
            };
            let field = if column.nullable {
                NestedField::optional(id, &column.name, Type::Primitive(primitive))
            } else {
                NestedField::required(id, &column.name, Type::Primitive(primitive))
            };
            Ok(Arc::new(field))
        })
        .collect::<SessionResult<Vec<_>>>()?;

    Schema::builder()
        .with_schema_id(0)
        .with_fields(fields)
        .build()
        .map_err(iceberg_error)
}

fn table_schema(schema: &Schema) -> TableSchema {
    TableSchema::new(schema.as_struct().fields().iter().map(|field| {
        let data_type = match &*field.field_type {
            Type::Primitive(PrimitiveType::Long) => ColumnType::Long,
            Type::Primitive(PrimitiveType::String) => ColumnType::String,
            Type::Primitive(PrimitiveType::Float) => ColumnType::Float,
            other => ColumnType::Other(other.to_string()),
        };
        ColumnSpec {
            name: field.name.clone(),
            data_type,
            nullable: !field.required,
        }
    }))
}

/// Lay `rows` out as a batch matching the table's current schema, field ids included.
fn record_batch(schema: &Schema, rows: &[FixtureRow]) -> SessionResult<RecordBatch> {
    let arrow_schema = Arc::new(schema_to_arrow_schema(schema).map_err(iceberg_error)?);
    let columns = arrow_schema
        .fields()
        .iter()
        .map(|field| {
            fixture_column(field.name(), rows).ok_or_else(|| {
                SessionError::UnexpectedData(format!(
                    "no fixture values for column {}",
                    field.name()
                ))
            })
        })
        .collect::<SessionResult<Vec<_>>>()?;

    RecordBatch::try_new(arrow_schema, columns)
        .map_err(|e| SessionError::UnexpectedData(e.to_string()))
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> SessionResult<&'a A> {
    batch
        .column_by_name(name)
        .and_then(|column| column.as_any().downcast_ref::<A>())
        .ok_or_else(|| {
            SessionError::UnexpectedData(format!(
                "column {name} is missing or has an unexpected type"
            ))
        })
}

fn rows_from_batch(batch: &RecordBatch) -> SessionResult<Vec<FixtureRow>> {
    let ids = column::<Int64Array>(batch, "id")?;
    let strings = column::<StringArray>(batch, "strings")?;
    let floats = column::<Float32Array>(batch, "floats")?;

    Ok((0..batch.num_rows())
        .map(|i| FixtureRow {
            id: ids.is_valid(i).then(|| ids.value(i)),
            strings: strings.is_valid(i).then(|| strings.value(i).to_string()),
            floats: floats.is_valid(i).then(|| floats.value(i)),
        })
        .collect())
}

async fn write_data_files(table: &Table, batch: RecordBatch) -> iceberg::Result<Vec<DataFile>> {
    let location_generator = DefaultLocationGenerator::new(table.metadata().clone())?;
    let file_name_generator = DefaultFileNameGenerator::new(
        DATA_FILE_PREFIX.to_string(),
        Some(Uuid::new_v4().to_string()),
        DataFileFormat::Parquet,
    );
    let parquet_writer_builder = ParquetWriterBuilder::new(
        WriterProperties::default(),
        table.metadata().current_schema().clone(),
        None,
        table.file_io().clone(),
        location_generator,
        file_name_generator,
    );
    let rolling_file_writer_builder = RollingFileWriterBuilder::new(
        parquet_writer_builder,
        PROPERTY_WRITE_TARGET_FILE_SIZE_BYTES_DEFAULT,
    );

    let mut writer = DataFileWriterBuilder::new(
        rolling_file_writer_builder,
        None,
        table.metadata().default_partition_spec_id(),
    )
    .build()
    .await?;
    writer.write(batch).await?;
    writer.close().await
}

fn iceberg_error(err: iceberg::Error) -> SessionError {
    match err.kind() {
        ErrorKind::TableNotFound | ErrorKind::NamespaceNotFound => {
            SessionError::NotFound(err.to_string())
        }
        _ => SessionError::Catalog(err.to_string()),
    }
}

fn client_error(err: catalog_client::Error) -> SessionError {
    match err {
        catalog_client::Error::TableNotFound(table) => SessionError::NotFound(table),
        err if err.is_connect() => SessionError::Unreachable(err.to_string()),
        err => SessionError::Catalog(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageOverrides;
    use crate::fixtures::fixture_rows;
    use iceberg::io::FileIOBuilder;
    use iceberg::spec::TableMetadataBuilder;

    fn config() -> WorkloadConfig {
        WorkloadConfig::builder("http://localhost:8181/catalog/")
            .build()
            .unwrap()
    }

    #[test]
    fn test_schema_conversion_keeps_names_types_and_nullability() {
        let fixture = TableSchema::fixture();
        let schema = iceberg_schema(&fixture).unwrap();
        assert_eq!(schema.as_struct().fields().len(), 3);
        assert!(schema.as_struct().fields().iter().all(|f| !f.required));
        assert_eq!(table_schema(&schema), fixture);
    }

    #[test]
    fn test_unknown_column_types_are_not_created() {
        let schema = TableSchema::new([ColumnSpec::nullable(
            "d",
            ColumnType::Other("double".to_string()),
        )]);
        assert!(matches!(
            iceberg_schema(&schema),
            Err(SessionError::UnexpectedData(_))
        ));
    }

    #[test]
    fn test_record_batch_round_trip() {
        let schema = iceberg_schema(&TableSchema::fixture()).unwrap();
        let mut rows = fixture_rows();
        rows.push(FixtureRow {
            id: Some(3),
            strings: None,
            floats: None,
        });

        let batch = record_batch(&schema, &rows).unwrap();
        assert_eq!(batch.num_rows(), 3);
        assert_eq!(rows_from_batch(&batch).unwrap(), rows);
    }

    fn local_table(dir: &std::path::Path) -> Table {
        let creation = TableCreation::builder()
            .name("my_table_0".to_string())
            .schema(iceberg_schema(&TableSchema::fixture()).unwrap())
            .location(dir.to_str().unwrap().to_string())
            .build();
        let metadata = TableMetadataBuilder::from_table_creation(creation)
            .unwrap()
            .build()
            .unwrap()
            .metadata;
        Table::builder()
            .file_io(FileIOBuilder::new_fs_io().build().unwrap())
            .metadata(metadata)
            .identifier(TableIdent::from_strs(["my_namespace", "my_table_0"]).unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_writer_stack_writes_one_parquet_file() {
        let dir = tempfile::tempdir().unwrap();
        let table = local_table(dir.path());
        let batch = record_batch(table.metadata().current_schema(), &fixture_rows()).unwrap();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let data_files = runtime.block_on(write_data_files(&table, batch)).unwrap();

        assert_eq!(data_files.len(), 1);
        let data_file = &data_files[0];
        assert_eq!(data_file.record_count(), 2);
        assert_eq!(data_file.file_format(), DataFileFormat::Parquet);
        assert!(data_file
            .file_path()
            .starts_with(dir.path().to_str().unwrap()));
        assert!(data_file.file_path().contains(DATA_FILE_PREFIX));
    }

    #[test]
    fn test_catalog_properties() {
        let props = catalog_properties(&config());
        assert_eq!(props[REST_CATALOG_PROP_URI], "http://localhost:8181/catalog");
        assert_eq!(props[REST_CATALOG_PROP_WAREHOUSE], "demo");
        assert_eq!(props.len(), 2);
    }

    #[test]
    fn test_catalog_properties_with_credentials_and_storage() {
        let config = WorkloadConfig::builder("http://localhost:8181/catalog")
            .credentials(Credentials::ClientCredentials {
                client_id: "spark".to_string(),
                client_secret: "hunter2".to_string(),
                token_endpoint: None,
                scope: Some("lakekeeper".to_string()),
            })
            .storage(StorageOverrides {
                s3_endpoint: Some("http://minio:9000".to_string()),
                s3_path_style_access: Some(true),
                ..Default::default()
            })
            .build()
            .unwrap();

        let props = catalog_properties(&config);
        assert_eq!(props["credential"], "spark:hunter2");
        assert_eq!(props["scope"], "lakekeeper");
        assert!(!props.contains_key("oauth2-server-uri"));
        assert_eq!(props[S3_ENDPOINT], "http://minio:9000");
        assert_eq!(props[S3_PATH_STYLE_ACCESS], "true");
        assert!(!props.contains_key(S3_SECRET_ACCESS_KEY));
    }

    #[test]
    fn test_client_errors_map_to_session_errors() {
        assert!(client_error(catalog_client::Error::TableNotFound("ns.t".into())).is_not_found());
        assert!(matches!(
            client_error(catalog_client::Error::ApiError {
                status: 500,
                message: "boom".into()
            }),
            SessionError::Catalog(_)
        ));
    }

    #[test]
    fn test_unreachable_catalog_is_a_connection_error() {
        let config = WorkloadConfig::builder("http://127.0.0.1:9/catalog")
            .connect_timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let Err(err) = IcebergRestSession::connect(&config) else {
            panic!("connected to a catalog that should not exist");
        };
        assert!(
            matches!(
                &err,
                Error::Connection {
                    source: SessionError::Unreachable(_),
                    ..
                }
            ),
            "unexpected error: {err}"
        );
    }
}
