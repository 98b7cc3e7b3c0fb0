//! # CLI Command Implementations
//!
//! One module per subcommand of `fabric-provisioner`. Each module holds an
//! `Args` struct derived with `clap` and an `execute` function that loads the
//! definitions, logs in to the platform and hands over to the matching
//! workflow in `fabric_provisioner::workflows`.
//!
//! The argument groups shared by several commands live here: the resource
//! directory, service-principal credentials and the `fab` executable.

pub mod bind;
pub mod completions;
pub mod connection_string;
pub mod feature;
pub mod parameters;
pub mod release;
pub mod setup;
pub mod sync;
pub mod validate;

use anyhow::Result;
use clap::Args;
use console::Term;
use dialoguer::{theme::ColorfulTheme, Confirm};
use std::path::PathBuf;

use fabric_provisioner::client::FabricClient;
use fabric_provisioner::config::ResourceLayout;
use fabric_provisioner::context::{Credentials, RunContext};
use fabric_provisioner::output::{OutputConfig, Printer};
use fabric_provisioner::transport::FabCli;

/// Location of the definition files.
#[derive(Args, Debug, Clone)]
pub struct ResourceArgs {
    /// Directory holding `environments/` and `parameters/`.
    #[arg(
        long,
        value_name = "DIR",
        env = "FABRIC_RESOURCES",
        default_value = "automation/resources"
    )]
    pub resources: PathBuf,
}

impl ResourceArgs {
    pub fn layout(&self) -> ResourceLayout {
        ResourceLayout::new(&self.resources)
    }
}

/// Service principal used to log in.
#[derive(Args, Debug, Clone)]
pub struct CredentialArgs {
    /// Microsoft Entra tenant id.
    #[arg(long, value_name = "ID", env = "TENANT_ID", hide_env_values = true)]
    pub tenant_id: Option<String>,

    /// Application (client) id of the service principal.
    #[arg(long, value_name = "ID", env = "CLIENT_ID", hide_env_values = true)]
    pub client_id: Option<String>,

    /// Client secret of the service principal.
    #[arg(long, value_name = "SECRET", env = "CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,
}

/// Everything needed to talk to the platform.
#[derive(Args, Debug, Clone)]
pub struct PlatformArgs {
    #[command(flatten)]
    pub resources: ResourceArgs,

    #[command(flatten)]
    pub credentials: CredentialArgs,

    /// The `fab` executable.
    #[arg(long, value_name = "PATH", env = "FAB_BIN", default_value = "fab")]
    pub fab_bin: PathBuf,
}

impl PlatformArgs {
    pub fn layout(&self) -> ResourceLayout {
        self.resources.layout()
    }

    /// Resolve credentials and build the run context.
    pub fn context(&self) -> Result<RunContext> {
        let credentials = Credentials::from_parts(
            self.credentials.tenant_id.clone(),
            self.credentials.client_id.clone(),
            self.credentials.client_secret.clone(),
        )?;
        Ok(RunContext::new(credentials, self.layout()))
    }

    /// Configure the CLI and log in.
    pub fn connect(&self, context: &RunContext, folder_listing: bool) -> Result<FabricClient<FabCli>> {
        let client = FabricClient::new(FabCli::new(&self.fab_bin)).with_timings(context.timings);
        client.login(&context.credentials, folder_listing)?;
        log::info!("logged in as {}", context.credentials.client_id);
        Ok(client)
    }
}

/// Console printer honouring the global `--color` flag.
pub fn printer(color: &str) -> Printer {
    Printer::new(OutputConfig::from_env_and_flag(color))
}

/// Ask before a destructive action.
///
/// `--yes` and non-interactive runs proceed without asking.
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes || !Term::stdout().is_term() {
        return Ok(true);
    }
    Ok(Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(false)
        .interact()?)
}
