//! # Sync Command Implementation
//!
//! Pulls the latest commits into the workspaces of an environment whose
//! layers follow their Git branch.

use anyhow::Result;
use clap::Args;

use fabric_provisioner::config::load_environment;
use fabric_provisioner::git::SyncOutcome;
use fabric_provisioner::workflows::{sync, Session};

use super::{printer, PlatformArgs};

/// Synchronize environment workspaces with Git
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Environment to synchronize.
    #[arg(short, long, default_value = "dev")]
    pub environment: String,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: SyncArgs, color: &str) -> Result<()> {
    let definition = load_environment(&args.platform.layout(), &args.environment)?;
    let context = args.platform.context()?;
    let client = args.platform.connect(&context, false)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    let outcomes = sync::synchronize_environment(&session, &definition, &args.environment)?;
    let failed = outcomes
        .iter()
        .filter(|(_, outcome)| *outcome == SyncOutcome::Failed)
        .count();
    if failed > 0 {
        log::warn!("{} workspace(s) failed to synchronize", failed);
    }
    out.finish();
    Ok(())
}
