//! CLI argument parsing and command dispatch

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::LevelFilter;

use crate::commands;

/// Fabric provisioner - Provision and maintain medallion workspaces through the fab CLI
#[derive(Parser, Debug)]
#[command(name = "fabric-provisioner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Colorize output (always, never, auto)
    #[arg(long, global = true, value_name = "WHEN", default_value = "auto")]
    color: String,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create or delete the workspaces, items and connections of an environment
    Setup(commands::setup::SetupArgs),

    /// Create, update or delete feature development workspaces
    Feature(commands::feature::FeatureArgs),

    /// Synchronize environment workspaces with their Git branch
    Sync(commands::sync::SyncArgs),

    /// Publish repository items to an environment
    Release(commands::release::ReleaseArgs),

    /// Generate the deployment parameter file
    Parameters(commands::parameters::ParametersArgs),

    /// Write the connection string of a Warehouse or SQL database to a file
    ConnectionString(commands::connection_string::ConnectionStringArgs),

    /// Bind a semantic model to a Lakehouse SQL endpoint
    Bind(commands::bind::BindArgs),

    /// Validate definitions without touching the platform
    Validate(commands::validate::ValidateArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        let level = match &self.command {
            Commands::Release(args) if args.debug => LevelFilter::Debug,
            _ => self.log_level.parse().unwrap_or(LevelFilter::Warn),
        };
        // Tests may run several commands in one process.
        let _ = env_logger::Builder::new()
            .filter_level(level)
            .format_timestamp(None)
            .try_init();

        let color = self.color.as_str();
        match self.command {
            Commands::Setup(args) => commands::setup::execute(args, color),
            Commands::Feature(args) => commands::feature::execute(args, color),
            Commands::Sync(args) => commands::sync::execute(args, color),
            Commands::Release(args) => commands::release::execute(args, color),
            Commands::Parameters(args) => commands::parameters::execute(args, color),
            Commands::ConnectionString(args) => commands::connection_string::execute(args, color),
            Commands::Bind(args) => commands::bind::execute(args, color),
            Commands::Validate(args) => commands::validate::execute(args, color),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}
