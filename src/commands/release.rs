//! # Release Command Implementation
//!
//! Publishes the item definitions of the solution repository to the
//! workspaces of an environment, then binds semantic models to their
//! Lakehouse SQL endpoints.

use anyhow::Result;
use clap::{ArgAction, Args};
use std::path::PathBuf;

use fabric_provisioner::config::load_environment;
use fabric_provisioner::workflows::release::{self, ReleaseOptions, DEFAULT_ITEM_TYPES, DEFAULT_LAYERS};
use fabric_provisioner::workflows::Session;

use super::{printer, PlatformArgs};

/// Publish repository items to an environment
#[derive(Args, Debug)]
pub struct ReleaseArgs {
    /// Environment to release to.
    #[arg(short, long)]
    pub environment: String,

    /// Comma-separated layers to release.
    #[arg(long, value_name = "LIST", default_value = DEFAULT_LAYERS)]
    pub layers: String,

    /// Comma-separated item types in scope, in publish order.
    #[arg(long, value_name = "LIST", default_value = DEFAULT_ITEM_TYPES)]
    pub item_types: String,

    /// Repository directory holding one folder per layer.
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub repo_path: PathBuf,

    /// Remove deployed items the repository no longer has.
    #[arg(long, value_name = "BOOL", action = ArgAction::Set, default_value_t = true)]
    pub unpublish_items: bool,

    /// Enable debug logging.
    #[arg(long)]
    pub debug: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: ReleaseArgs, color: &str) -> Result<()> {
    let out = printer(color);
    let definition = match load_environment(&args.platform.layout(), &args.environment) {
        Ok(definition) => definition,
        Err(e) => {
            out.error(&format!(
                "No environment definition found for environment {}! Release of {} has been skipped.",
                args.environment, args.environment
            ));
            return Err(e.into());
        }
    };
    let context = args.platform.context()?;
    let client = args.platform.connect(&context, false)?;
    let session = Session::new(&client, &out, &context);

    let options = ReleaseOptions::new(&args.repo_path)
        .with_layers(&args.layers)
        .with_item_types(&args.item_types)
        .with_unpublish_orphans(args.unpublish_items);
    let report = release::release(&session, &definition, &args.environment, &options)?;
    out.finish();

    if !report.failed.is_empty() {
        anyhow::bail!("{} item(s) failed to publish: {}", report.failed.len(), report.failed.join(", "));
    }
    Ok(())
}
