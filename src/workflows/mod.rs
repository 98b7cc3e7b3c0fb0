//! # Workflows
//!
//! One module per operational action. Each workflow walks the loaded
//! definition in declaration order, issues its platform calls through a
//! [`FabricClient`], and reports progress on a [`Printer`].
//!
//! Failures are isolated per resource: a failing workspace, item or
//! connection is reported and the workflow moves on to the next one. Only
//! problems with the definition itself end a workflow early.

pub mod binding;
pub mod connection_string;
pub mod feature;
pub mod parameters;
pub mod release;
pub mod setup;
pub mod sync;

use crate::client::FabricClient;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::git::SyncOutcome;
use crate::output::Printer;
use crate::transport::Transport;

/// What every workflow works with.
pub struct Session<'a, T: Transport> {
    pub client: &'a FabricClient<T>,
    pub out: &'a Printer,
    pub context: &'a RunContext,
}

impl<'a, T: Transport> Session<'a, T> {
    pub fn new(client: &'a FabricClient<T>, out: &'a Printer, context: &'a RunContext) -> Self {
        Self {
            client,
            out,
            context,
        }
    }

    /// Finish the current line with a failure and log the error.
    pub(crate) fn fail(&self, error: &Error) {
        log::warn!("{}", error);
        self.out.error(&format!("Failed! {}", error));
    }

    /// Unwrap a per-resource result, reporting the error.
    pub(crate) fn check<R>(&self, result: Result<R>) -> Option<R> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.fail(&e);
                None
            }
        }
    }

    /// Finish the current line with the outcome of a Git synchronization.
    pub(crate) fn report_sync(&self, outcome: SyncOutcome) {
        match outcome {
            SyncOutcome::Updated => self.out.success(""),
            SyncOutcome::AlreadyUpToDate => self.out.warning("Already up to date."),
            SyncOutcome::NoChanges => self.out.warning("No changes detected."),
            SyncOutcome::Unavailable => self.out.warning("Git synchronization not possible."),
            SyncOutcome::Failed => self.out.error("Failed!"),
        }
    }
}
