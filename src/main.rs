//! # Fabric Provisioner CLI
//!
//! Binary entry point for `fabric-provisioner`. It parses the command line
//! with `clap`, sets up logging and dispatches to one of the commands in
//! [`commands`]. All platform logic lives in the `fabric_provisioner`
//! library crate; the binary only resolves arguments and environment
//! variables and reports errors.

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    cli.execute()
}
