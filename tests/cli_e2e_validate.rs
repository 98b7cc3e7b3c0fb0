//! End-to-end tests for the `validate` command.
//!
//! These tests invoke the actual CLI binary against a temporary resource
//! directory. Nothing here talks to the platform.

mod common;
use common::prelude::*;

#[test]
fn test_validate_base_definition() {
    let fixture = TestFixture::new().with_environment(definitions::TWO_LAYERS);

    fixture
        .command()
        .args(["--color", "never", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validating dev definition"))
        .stdout(predicate::str::contains("Environment definition is valid (2 layers)"));
}

#[test]
fn test_validate_tree_shows_overlay_capacity() {
    let fixture = TestFixture::new()
        .with_environment(definitions::TWO_LAYERS)
        .with_overlay("tst", definitions::TST_OVERLAY);

    fixture
        .command()
        .args(["--color", "never", "validate", "-e", "tst", "--tree"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Store -> Sales - Store [tst]"))
        .stdout(predicate::str::contains("capacity: cap-tst"))
        .stdout(predicate::str::contains("Lakehouse: Curated (connection lh-{layer}-{environment})"))
        .stdout(predicate::str::contains("git directory: store"));
}

#[test]
fn test_validate_with_feature_definition() {
    let fixture = TestFixture::new()
        .with_environment(definitions::TWO_LAYERS)
        .with_feature(definitions::FEATURE);

    fixture
        .command()
        .args(["--color", "never", "validate", "--feature"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Feature definition is valid (1 layers)"));
}

#[test]
fn test_validate_missing_feature_definition_fails() {
    let fixture = TestFixture::new().with_environment(definitions::TWO_LAYERS);

    fixture
        .command()
        .args(["--color", "never", "validate", "--feature"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("feature definition not found"));
}

#[test]
fn test_validate_missing_definition_fails() {
    let fixture = TestFixture::new();

    fixture
        .command()
        .args(["--color", "never", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("environment definition not found"))
        .stderr(predicate::str::contains("Validation failed"));
}

#[test]
fn test_validate_invalid_json_fails() {
    let fixture = TestFixture::new().with_environment(definitions::INVALID_JSON);

    fixture
        .command()
        .args(["--color", "never", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("is not valid JSON"));
}

#[test]
fn test_validate_item_without_name_fails() {
    let fixture = TestFixture::new().with_environment(
        r#"{"name": "x {layer} {environment}", "layers": {"Store": {"items": {"Warehouse": [{"item_name": " "}]}}}}"#,
    );

    fixture
        .command()
        .args(["--color", "never", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("has a Warehouse without item_name"));
}
