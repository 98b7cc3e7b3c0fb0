//! # Setup Command Implementation
//!
//! Creates or deletes every workspace, item and connection an environment
//! definition describes. Creation is idempotent: running it again only adds
//! what is missing.

use anyhow::Result;
use clap::{Args, ValueEnum};

use fabric_provisioner::config::load_environment;
use fabric_provisioner::workflows::{setup, Session};

use super::{confirm, printer, PlatformArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SetupAction {
    Create,
    Delete,
}

/// Provision or tear down an environment
#[derive(Args, Debug)]
pub struct SetupArgs {
    /// Environment to set up.
    #[arg(short, long, default_value = "dev")]
    pub environment: String,

    /// Action to perform.
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = SetupAction::Create)]
    pub action: SetupAction,

    /// Personal access token for a GitHub source-control connection.
    #[arg(long, value_name = "TOKEN", env = "GITHUB_PAT", hide_env_values = true)]
    pub github_pat: Option<String>,

    /// Delete without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: SetupArgs, color: &str) -> Result<()> {
    let definition = load_environment(&args.platform.layout(), &args.environment)?;
    if args.action == SetupAction::Delete
        && !confirm(
            &format!("Delete every workspace and connection of {}?", args.environment),
            args.yes,
        )?
    {
        println!("Deletion cancelled.");
        return Ok(());
    }

    let context = args.platform.context()?.with_github_pat(args.github_pat.clone());
    let client = args.platform.connect(&context, true)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    match args.action {
        SetupAction::Create => {
            let report = setup::provision(&session, &definition, &args.environment)?;
            log::info!(
                "{} workspaces provisioned for {}",
                report.workspace_ids.len(),
                args.environment
            );
        }
        SetupAction::Delete => setup::teardown(&session, &definition, &args.environment)?,
    }
    out.finish();
    Ok(())
}
