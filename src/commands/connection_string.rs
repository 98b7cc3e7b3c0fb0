//! # Connection String Command Implementation

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use fabric_provisioner::config::load_environment;
use fabric_provisioner::workflows::{connection_string, Session};

use super::{printer, PlatformArgs};

/// Write the connection string of a Warehouse or SQL database to a file
#[derive(Args, Debug)]
pub struct ConnectionStringArgs {
    #[arg(short, long)]
    pub environment: String,

    /// Layer declaring the database.
    #[arg(short, long)]
    pub layer: String,

    /// Name of the Warehouse or SQL database.
    #[arg(short, long)]
    pub database: String,

    /// File the connection string is written to.
    #[arg(short, long, value_name = "FILE")]
    pub output_file: PathBuf,

    #[command(flatten)]
    pub platform: PlatformArgs,
}

pub fn execute(args: ConnectionStringArgs, color: &str) -> Result<()> {
    let definition = load_environment(&args.platform.layout(), &args.environment)?;
    let context = args.platform.context()?;
    let client = args.platform.connect(&context, false)?;
    let out = printer(color);
    let session = Session::new(&client, &out, &context);

    connection_string::generate(
        &session,
        &definition,
        &args.environment,
        &args.layer,
        &args.database,
        &args.output_file,
    )?;
    out.finish();
    Ok(())
}
