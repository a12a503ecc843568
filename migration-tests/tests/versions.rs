//! Loading the version list from a manifest on disk and rendering it for CI.

use migration_tests::versions::VersionSpec;
use migration_tests::Error;
use rstest::rstest;
use test_utils::{assert_result_error_with_message, write_manifest, write_manifest_contents};

#[test]
fn matrix_for_two_versions() {
    let (_dir, path) = write_manifest(&["0.1.0", "0.2.0"]);
    let spec = VersionSpec::load(&path).unwrap();
    assert_eq!(
        spec.as_matrix_json().unwrap(),
        r#"{"versions":["0.1.0","0.2.0"]}"#
    );
    assert_eq!(
        spec.as_assignment_line("initial-versions"),
        r#"initial-versions=["0.1.0","0.2.0"]"#
    );
}

#[rstest]
#[case::single(&["0.5.0"])]
#[case::unsorted(&["0.9.0", "0.1.0", "0.4.2"])]
#[case::prerelease(&["0.8.0-rc.1", "0.8.0"])]
#[case::empty(&[])]
fn matrix_and_assignment_agree(#[case] versions: &[&str]) {
    let (_dir, path) = write_manifest(versions);
    let spec = VersionSpec::load(&path).unwrap();

    let matrix: serde_json::Value = serde_json::from_str(&spec.as_matrix_json().unwrap()).unwrap();
    let line = spec.as_assignment_line("initial-versions");
    let (name, list) = line.split_once('=').unwrap();
    let assigned: Vec<String> = serde_json::from_str(list).unwrap();

    assert_eq!(name, "initial-versions");
    assert_eq!(matrix["versions"], serde_json::json!(assigned));
    assert_eq!(assigned, versions);
    assert_eq!(spec.iter().collect::<Vec<_>>(), versions);
}

#[test]
fn loading_twice_gives_the_same_list() {
    let (_dir, path) = write_manifest(&["0.1.0", "0.2.0"]);
    assert_eq!(
        VersionSpec::load(&path).unwrap(),
        VersionSpec::load(&path).unwrap()
    );
}

#[test]
fn missing_key_path_is_a_config_error() {
    let (_dir, path) = write_manifest_contents("[package]\nname = \"migration_tests\"\n");
    let result = VersionSpec::load(&path);
    assert!(matches!(result, Err(Error::Config { .. })));
    assert_result_error_with_message(result, "missing key package.metadata");
}

#[test]
fn missing_manifest_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    assert_result_error_with_message(
        VersionSpec::load(dir.path().join("Cargo.toml")),
        "Invalid migration test configuration",
    );
}
