//! Shared test utilities for integration and E2E tests.
//!
//! This module provides a resource-directory fixture and helpers for
//! running the `fabric-provisioner` binary against it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     let fixture = TestFixture::new().with_environment(definitions::TWO_LAYERS);
//!     fixture.command().args(["validate"]).assert().success();
//! }
//! ```

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};

/// Re-export commonly used test dependencies for convenience.
/// Not every test binary uses every re-export.
#[allow(unused_imports)]
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    pub use super::definitions;
    pub use super::TestFixture;
}

/// Definition documents used across tests.
#[allow(dead_code)]
pub mod definitions {
    /// Two layers, one Lakehouse with an item connection.
    pub const TWO_LAYERS: &str = r#"{
  "name": "Sales - {layer} [{environment}]",
  "generic": {"capacity_name": "cap-dev"},
  "layers": {
    "Ingest": {
      "items": {"Lakehouse": [{"item_name": "Landing"}]}
    },
    "Store": {
      "git_directoryName": "store",
      "items": {
        "Lakehouse": [{"item_name": "Curated", "connection_name": "lh-{layer}-{environment}"}]
      },
      "permissions": {"Contributor": [{"type": "Group", "id": "11111111-2222-3333-4444-555555555555"}]}
    }
  }
}"#;

    /// Overlay switching the capacity for `tst`.
    pub const TST_OVERLAY: &str = r#"{
  "generic": {"capacity_name": "cap-tst"}
}"#;

    /// Feature workspaces for the Store layer.
    pub const FEATURE: &str = r#"{
  "feature_name": "{feature_name} - {layer_name}",
  "capacity_name": "cap-feature",
  "layers": {
    "Store": {"git_directoryName": "store"}
  }
}"#;

    /// Not a JSON document.
    pub const INVALID_JSON: &str = "{\"name\": ";
}

/// A temporary resource directory laid out like `automation/resources`.
///
/// # Example
///
/// ```rust,ignore
/// let fixture = TestFixture::new()
///     .with_environment(definitions::TWO_LAYERS)
///     .with_overlay("tst", definitions::TST_OVERLAY);
///
/// fixture.command().args(["validate", "-e", "tst"]).assert().success();
/// ```
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    /// Create a new test fixture with an empty temporary directory.
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write the base environment definition.
    pub fn with_environment(self, content: &str) -> Self {
        self.with_file("resources/environments/infrastructure.json", content)
    }

    /// Write the overlay of one environment.
    #[allow(dead_code)]
    pub fn with_overlay(self, environment: &str, content: &str) -> Self {
        let path = format!("resources/environments/infrastructure.{}.json", environment);
        self.with_file(&path, content)
    }

    /// Write the feature definition.
    #[allow(dead_code)]
    pub fn with_feature(self, content: &str) -> Self {
        self.with_file("resources/environments/feature.json", content)
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    /// Install a stand-in `fab` executable that appends each command to
    /// `fab.log` and prints nothing.
    #[cfg(unix)]
    #[allow(dead_code)]
    pub fn with_fake_fab(self) -> Self {
        use std::os::unix::fs::PermissionsExt;

        let log = self.path().join("fab.log");
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$2\" >> '{}'\n",
            log.display()
        );
        let fab = self.temp_dir.child("bin/fab");
        fab.write_str(&script).expect("Failed to write fake fab");
        let mut permissions = std::fs::metadata(fab.path())
            .expect("Failed to read fake fab metadata")
            .permissions();
        permissions.set_mode(0o755);
        std::fs::set_permissions(fab.path(), permissions).expect("Failed to make fake fab executable");
        self
    }

    /// Commands received by the fake `fab`, one per line.
    #[allow(dead_code)]
    pub fn fab_log(&self) -> String {
        std::fs::read_to_string(self.path().join("fab.log")).unwrap_or_default()
    }

    /// Get the path to the temporary directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// The resource directory.
    pub fn resources(&self) -> PathBuf {
        self.temp_dir.path().join("resources")
    }

    /// Create a child path in the temp directory.
    #[allow(dead_code)]
    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

impl TestFixture {
    /// Create a command running in this fixture's directory.
    ///
    /// Credential and resource variables from the surrounding environment are
    /// cleared and `--resources` points at the fixture.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("fabric-provisioner");
        cmd.current_dir(self.path())
            .env_remove("TENANT_ID")
            .env_remove("CLIENT_ID")
            .env_remove("CLIENT_SECRET")
            .env_remove("GITHUB_PAT")
            .env_remove("GITHUB_REF_NAME")
            .env_remove("BUILD_SOURCEBRANCH")
            .env_remove("FAB_BIN")
            .env("FABRIC_RESOURCES", self.resources());
        cmd
    }

    /// Like [`TestFixture::command`] with service-principal variables set and
    /// the fake `fab` selected.
    #[allow(dead_code)]
    pub fn platform_command(&self) -> assert_cmd::Command {
        let mut cmd = self.command();
        cmd.env("TENANT_ID", "tenant")
            .env("CLIENT_ID", "app")
            .env("CLIENT_SECRET", "secret")
            .env("FAB_BIN", self.path().join("bin/fab"));
        cmd
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixture_creates_temp_dir() {
        let fixture = TestFixture::new();
        assert!(fixture.path().exists());
    }

    #[test]
    fn test_fixture_writes_environment_layout() {
        let fixture = TestFixture::new()
            .with_environment(definitions::TWO_LAYERS)
            .with_overlay("tst", definitions::TST_OVERLAY);
        let environments = fixture.resources().join("environments");
        assert!(environments.join("infrastructure.json").exists());
        assert!(environments.join("infrastructure.tst.json").exists());
    }

    #[test]
    fn test_definitions_are_valid_json() {
        for document in [
            definitions::TWO_LAYERS,
            definitions::TST_OVERLAY,
            definitions::FEATURE,
        ] {
            serde_json::from_str::<serde_json::Value>(document).expect("Definition should be valid JSON");
        }
        assert!(serde_json::from_str::<serde_json::Value>(definitions::INVALID_JSON).is_err());
    }
}
