//! # Parameters Command Implementation
//!
//! Builds the deployment parameter document from the live workspaces and
//! copies it into every solution folder.

use anyhow::Result;
use clap::{Args, ValueEnum};
use std::path::PathBuf;

use fabric_provisioner::workflows::release::split_list;
use fabric_provisioner::workflows::{parameters, Session};

use super::{printer, PlatformArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ParameterMode {
    /// Scan every environment and write their ids.
    Static,
    /// Scan the source environment and write `$workspace.` / `$items.`
    /// references for the targets.
    Dynamic,
}

/// Generate the deployment parameter file
#[derive(Args, Debug)]
pub struct ParametersArgs {
    #[arg(short, long, value_enum, default_value_t = ParameterMode::Static)]
    pub mode: ParameterMode,

    /// Environments to scan in static mode.
    #[arg(long, value_name = "LIST", default_value = "dev,tst,prd")]
    pub environments: String,

    /// Environment whose values are replaced.
    #[arg(long, value_name = "ENV", default_value = "dev")]
    pub source_environment: String,

    /// Target environments in dynamic mode.
    #[arg(long, value_name = "LIST", default_value = "tst,prd")]
    pub target_environments: String,

    /// Directory whose subfolders receive a copy of the document.
    #[arg(long, value_name = "DIR")]
    pub solution_root: Option<PathBuf>,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: ParametersArgs, color: &str) -> Result<()> {
    let mut context = args.platform.context()?;
    if let Some(root) = &args.solution_root {
        context = context.with_solution_root(root);
    }
    let client = args.platform.connect(&context, false)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    let file = match args.mode {
        ParameterMode::Static => parameters::generate_static(
            &session,
            &split_list(&args.environments),
            &args.source_environment,
        )?,
        ParameterMode::Dynamic => parameters::generate_dynamic(
            &session,
            &args.source_environment,
            &split_list(&args.target_environments),
        )?,
    };
    log::info!(
        "parameter file {} copied to {} folder(s)",
        file.template_path.display(),
        file.copies.len()
    );
    out.finish();
    Ok(())
}
