//! # Fabric Provisioner Library
//!
//! This library provisions and maintains medallion-layer analytics
//! workspaces (one workspace per layer and environment) by driving the
//! vendor `fab` command-line tool. It is used by the `fabric-provisioner`
//! binary but every workflow can be called directly with any
//! [`transport::Transport`].
//!
//! ## Quick Example
//!
//! ```
//! use fabric_provisioner::config::parse_environment;
//! use serde_json::json;
//!
//! let definition = parse_environment(
//!     json!({
//!         "name": "Sales - {layer} [{environment}]",
//!         "layers": {"Ingest": {}, "Store": {}}
//!     }),
//!     "example",
//! )
//! .unwrap();
//!
//! assert_eq!(definition.layers.len(), 2);
//! assert_eq!(
//!     definition.workspace_name("Store", "tst").unwrap(),
//!     "Sales - Store [tst]"
//! );
//! ```
//!
//! ## Core Concepts
//!
//! - **Definitions (`config`, `merge`, `naming`)**: a base environment
//!   document merged with a per-environment overlay, turned into typed
//!   records. Workspace and connection names come from `{placeholder}`
//!   templates.
//! - **Platform access (`transport`, `client`, `resources`, `connections`)**:
//!   every call is one CLI command line. [`client::FabricClient`] wraps the
//!   command vocabulary (`exists`, `create`, `get`, `set`, `acl`, `api`) and
//!   the idempotent `ensure_*` helpers build on it.
//! - **Asynchronous work (`retry`, `operations`, `git`)**: bounded polling
//!   for long-running operations, SQL endpoint provisioning and Git
//!   connections.
//! - **Workflows (`workflows`)**: one module per operational action (setup,
//!   feature branches, Git sync, release, parameter file, connection
//!   string, semantic model binding), reporting progress through
//!   [`output::Printer`].
//!
//! ## Execution Model
//!
//! Runs are sequential. Failures of a single workspace, item or connection
//! are reported and the workflow continues with the next one; problems with
//! the definition itself stop the run with an [`error::Error`].

pub mod branch;
pub mod client;
pub mod config;
pub mod connections;
pub mod context;
pub mod error;
pub mod git;
pub mod items;
pub mod merge;
pub mod naming;
pub mod operations;
pub mod output;
pub mod resources;
pub mod retry;
pub mod transport;
pub mod workflows;
