//! # Completions Command Implementation
//!
//! Prints the completion script for a shell, or writes it to `--output` so
//! an image build can install it without shell redirection.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory};
use clap_complete::{generate, Shell};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::cli::Cli;

const BIN_NAME: &str = "fabric-provisioner";

/// Generate shell completion scripts
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to complete for
    #[arg(value_enum)]
    pub shell: Shell,

    /// Write the script to this file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

pub fn execute(args: CompletionsArgs) -> Result<()> {
    match &args.output {
        Some(path) => {
            let mut file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            render(args.shell, &mut file)?;
            log::info!("Wrote {} completions to {}", args.shell, path.display());
        }
        None => render(args.shell, &mut io::stdout().lock())?,
    }
    Ok(())
}

fn render(shell: Shell, writer: &mut dyn Write) -> Result<()> {
    let mut buffer = Vec::new();
    generate(shell, &mut Cli::command(), BIN_NAME, &mut buffer);
    writer.write_all(&buffer)?;
    writer.flush()?;
    Ok(())
}
