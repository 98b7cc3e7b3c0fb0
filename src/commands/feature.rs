//! # Feature Command Implementation
//!
//! Maintains the workspaces of a feature branch: `create` provisions them
//! and connects them to the branch, `update` pulls the latest commits and
//! `delete` removes them.
//!
//! The branch comes from `--branch-name` (or `GITHUB_REF_NAME`) and falls
//! back to the Azure Pipelines source branch.

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};

use fabric_provisioner::branch::resolve_branch;
use fabric_provisioner::config::load_feature;
use fabric_provisioner::context::PipelineVariables;
use fabric_provisioner::workflows::{feature, Session};

use super::{confirm, printer, PlatformArgs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FeatureAction {
    Create,
    Update,
    Delete,
}

/// Maintain feature development workspaces
#[derive(Args, Debug)]
pub struct FeatureArgs {
    /// Action to perform.
    #[arg(short, long, value_enum, ignore_case = true, default_value_t = FeatureAction::Create)]
    pub action: FeatureAction,

    /// Feature branch to operate on.
    #[arg(long, value_name = "BRANCH", env = "GITHUB_REF_NAME")]
    pub branch_name: Option<String>,

    /// Azure Pipelines source branch, used when no branch name is given.
    #[arg(long, value_name = "REF", env = "BUILD_SOURCEBRANCH", hide = true)]
    pub source_branch: Option<String>,

    #[arg(long, env = "GITHUB_ACTOR", hide = true)]
    pub github_actor: Option<String>,

    #[arg(long, env = "GITHUB_ACTOR_ID", hide = true)]
    pub github_actor_id: Option<String>,

    #[arg(long, env = "BUILD_REQUESTEDFOREMAIL", hide = true)]
    pub requested_for_email: Option<String>,

    #[arg(long, env = "BUILD_REQUESTEDFORID", hide = true)]
    pub requested_for_id: Option<String>,

    /// Delete without asking for confirmation.
    #[arg(short, long)]
    pub yes: bool,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

impl FeatureArgs {
    fn pipeline(&self) -> PipelineVariables {
        PipelineVariables {
            github_actor: self.github_actor.clone(),
            github_actor_id: self.github_actor_id.clone(),
            requested_for_email: self.requested_for_email.clone(),
            requested_for_id: self.requested_for_id.clone(),
        }
    }
}

pub fn execute(args: FeatureArgs, color: &str) -> Result<()> {
    let Some(branch) = resolve_branch(args.branch_name.as_deref(), args.source_branch.as_deref()) else {
        bail!("No branch name given. Pass --branch-name or set GITHUB_REF_NAME or BUILD_SOURCEBRANCH");
    };
    let layout = args.platform.layout();
    let definition = load_feature(&layout.feature())?;
    if args.action == FeatureAction::Delete
        && !confirm(
            &format!("Delete the feature workspaces of {}?", branch),
            args.yes,
        )?
    {
        println!("Deletion cancelled.");
        return Ok(());
    }

    let context = args.platform.context()?.with_pipeline(args.pipeline());
    let client = args.platform.connect(&context, false)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    match args.action {
        FeatureAction::Create => feature::create(&session, &definition, &branch)?,
        FeatureAction::Update => feature::update(&session, &definition, &branch)?,
        FeatureAction::Delete => feature::delete(&session, &definition, &branch)?,
    }
    out.finish();
    Ok(())
}
