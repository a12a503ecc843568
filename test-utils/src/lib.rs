//! A number of utilities useful for testing that we want to use in multiple crates

use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use itertools::Itertools;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

/// A package manifest declaring `versions` under `package.metadata.migration-tests`.
pub fn manifest_toml(versions: &[&str]) -> String {
    let list = versions.iter().map(|v| format!("\"{v}\"")).join(", ");
    format!(
        r#"[package]
name = "migration_tests"
version = "0.0.0"

[package.metadata.migration-tests]
versions = [{list}]
"#
    )
}

/// Write `contents` to a `Cargo.toml` in a fresh temp dir. The dir is deleted when the returned
/// guard drops.
pub fn write_manifest_contents(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Cargo.toml");
    fs::write(&path, contents).unwrap();
    (dir, path)
}

/// Write a manifest declaring `versions` to a fresh temp dir.
pub fn write_manifest(versions: &[&str]) -> (TempDir, PathBuf) {
    write_manifest_contents(&manifest_toml(versions))
}

pub fn assert_result_error_with_message<T, E: ToString>(res: Result<T, E>, message: &str) {
    match res {
        Ok(_) => panic!("Expected error, but got Ok result"),
        Err(error) => {
            let error_str = error.to_string();
            assert!(
                error_str.contains(message),
                "Error message does not contain the expected message.\nExpected message:\t{message}\nActual message:\t\t{error_str}"
            );
        }
    }
}

pub struct LogWriter(pub Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }
    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().unwrap().flush()
    }
}

// Test helper that sets up tracing to capture log output
// The guard keeps the tracing subscriber active for the lifetime of the struct
pub struct LoggingTest {
    logs: Arc<Mutex<Vec<u8>>>,
    _guard: DefaultGuard,
}

impl Default for LoggingTest {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingTest {
    pub fn new() -> Self {
        let logs = Arc::new(Mutex::new(Vec::new()));
        let logs_clone = logs.clone();
        let _guard = tracing::subscriber::set_default(
            tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(move || LogWriter(logs_clone.clone()))
                    .with_ansi(false),
            ),
        );
        Self { logs, _guard }
    }

    pub fn logs(&self) -> String {
        String::from_utf8(self.logs.lock().unwrap().clone()).unwrap()
    }

    /// Log lines containing `needle`, in emission order.
    pub fn lines_containing(&self, needle: &str) -> Vec<String> {
        self.logs()
            .lines()
            .filter(|line| line.contains(needle))
            .map(str::to_string)
            .collect()
    }
}
