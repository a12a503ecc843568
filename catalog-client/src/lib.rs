//! Iceberg REST catalog client for the migration tests
//!
//! The compute session talks to the catalog through `iceberg-catalog-rest` for everything that
//! reads or writes table data. This crate covers the handful of REST endpoints that session
//! doesn't expose: warehouse prefix discovery, table existence probes and drops with an explicit
//! `purgeRequested` flag, plus the OAuth2 client-credentials exchange those calls need.
//!
//! # Example
//!
//! ```no_run
//! use catalog_client::{ClientConfig, RestCatalogClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::builder("http://localhost:8181/catalog", "demo").build()?;
//!     let client = RestCatalogClient::connect(config).await?;
//!
//!     client.drop_table("my_namespace", "my_table_2", false).await?;
//!     assert!(!client.table_exists("my_namespace", "my_table_2").await?);
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;

pub use client::RestCatalogClient;
pub use config::{Authentication, ClientConfig, ClientConfigBuilder};
pub use error::{Error, Result};
