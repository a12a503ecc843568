//! Discovery of the catalog releases a migration test has to start from.
//!
//! The list is declared in this crate's `Cargo.toml`:
//!
//! ```toml
//! [package.metadata.migration-tests]
//! versions = ["0.7.4", "0.8.5"]
//! ```
//!
//! and handed to CI either as a fan-out matrix ([`VersionSpec::as_matrix_json`]) or as a single
//! `name=value` line ([`VersionSpec::as_assignment_line`]). Order is kept exactly as written.

use std::fs;
use std::path::Path;

use serde_json::json;

use crate::error::{Error, Result};

/// Where the CLI looks for the metadata document, relative to the workspace root.
pub const DEFAULT_MANIFEST_PATH: &str = "migration-tests/Cargo.toml";

/// Keys leading from the document root to the version list.
const VERSIONS_KEY_PATH: [&str; 4] = ["package", "metadata", "migration-tests", "versions"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionSpec {
    versions: Vec<String>,
}

impl VersionSpec {
    /// Read the version list from the TOML document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| Error::config(path.display().to_string(), e.to_string()))?;
        Self::parse(&contents, &path.display().to_string())
    }

    /// Read the version list from an in-memory TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        Self::parse(contents, "<inline>")
    }

    fn parse(contents: &str, origin: &str) -> Result<Self> {
        let document: toml::Value = toml::from_str(contents)
            .map_err(|e| Error::config(origin, format!("invalid TOML: {}", e.message())))?;

        let mut value = &document;
        for (depth, key) in VERSIONS_KEY_PATH.iter().enumerate() {
            value = value
                .as_table()
                .and_then(|table| table.get(*key))
                .ok_or_else(|| {
                    Error::config(
                        origin,
                        format!("missing key {}", VERSIONS_KEY_PATH[..=depth].join(".")),
                    )
                })?;
        }

        let key_path = VERSIONS_KEY_PATH.join(".");
        let entries = value
            .as_array()
            .ok_or_else(|| Error::config(origin, format!("{key_path} is not an array")))?;
        let versions = entries
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                entry.as_str().map(str::to_string).ok_or_else(|| {
                    Error::config(
                        origin,
                        format!("{key_path}[{i}] is not a string: {entry}"),
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { versions })
    }

    /// `{"versions":[...]}` on a single line, for a CI fan-out matrix.
    pub fn as_matrix_json(&self) -> Result<String> {
        serde_json::to_string(&json!({ "versions": self.versions }))
            .map_err(|e| Error::config("matrix output", e.to_string()))
    }

    /// `<name>=<list>` where the list is a JSON array literal, for direct variable assignment.
    pub fn as_assignment_line(&self, name: &str) -> String {
        // serializing a list of strings cannot fail
        let list = serde_json::to_string(&self.versions).unwrap_or_else(|_| "[]".to_string());
        format!("{name}={list}")
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}
