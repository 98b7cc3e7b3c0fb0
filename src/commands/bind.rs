//! # Bind Command Implementation
//!
//! Takes over one semantic model and binds it to the SQL endpoint of a
//! Lakehouse, outside of a release.

use anyhow::{bail, Result};
use clap::Args;

use fabric_provisioner::config::load_environment;
use fabric_provisioner::workflows::binding::{bind_single, SingleBinding};
use fabric_provisioner::workflows::Session;

use super::{printer, PlatformArgs};

/// Bind a semantic model to a Lakehouse SQL endpoint
#[derive(Args, Debug)]
pub struct BindArgs {
    #[arg(short, long, default_value = "dev")]
    pub environment: String,

    /// Semantic model to bind.
    #[arg(short, long, value_name = "NAME")]
    pub semantic_model: String,

    /// Layer whose workspace holds the semantic model.
    #[arg(long, value_name = "LAYER", default_value = "Model")]
    pub model_layer: String,

    /// Lakehouse providing the SQL endpoint.
    #[arg(long, value_name = "NAME", default_value = "Curated")]
    pub lakehouse: String,

    /// Layer whose workspace holds the Lakehouse.
    #[arg(long, value_name = "LAYER", default_value = "Store")]
    pub lakehouse_layer: String,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: BindArgs, color: &str) -> Result<()> {
    let definition = load_environment(&args.platform.layout(), &args.environment)?;
    let context = args.platform.context()?;
    let client = args.platform.connect(&context, false)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    let request = SingleBinding {
        environment: args.environment,
        model_layer: args.model_layer,
        semantic_model: args.semantic_model,
        lakehouse_layer: args.lakehouse_layer,
        lakehouse_name: args.lakehouse,
    };
    let bound = bind_single(&session, &definition, &request)?;
    out.finish();
    if !bound {
        bail!("binding '{}' was not accepted", request.semantic_model);
    }
    Ok(())
}
