//! Pull the latest commits into the workspaces of an environment.

use crate::config::EnvironmentDefinition;
use crate::error::Result;
use crate::git::{GitIntegration, SyncOutcome};
use crate::transport::Transport;

use super::Session;

/// Synchronize every layer that follows its branch.
///
/// Layers synchronize unless `git_synchronize_on_commit` is `false` or they
/// were detached after initialization. Returns the outcome per synchronized
/// layer; layers whose workspace could not be resolved are left out.
pub fn synchronize_environment<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
) -> Result<Vec<(String, SyncOutcome)>> {
    let client = session.client;
    let git = GitIntegration::new(client);
    let mut outcomes = Vec::new();

    session.out.header("Synchronizing environment workspaces");
    for layer in &definition.layers {
        if !layer.definition.synchronizes_on_commit(true) {
            log::debug!("layer {} does not synchronize on commit", layer.name);
            continue;
        }
        let workspace = definition.workspace_name(&layer.name, environment)?;
        session.out.info_inline(&format!(
            "Synchronizing workspace {} with latest changes from Git repo...",
            workspace
        ));
        let workspace_id = match session.check(client.workspace_id(&workspace, 0)) {
            Some(Some(id)) => id,
            Some(None) => {
                session.out.warning("Git synchronization not possible.");
                continue;
            }
            None => continue,
        };
        match git.synchronize(&workspace_id, true) {
            Ok(outcome) => {
                session.report_sync(outcome);
                outcomes.push((layer.name.clone(), outcome));
            }
            Err(e) => session.fail(&e),
        }
    }
    session.out.success("Environment workspaces synchronized!");
    Ok(outcomes)
}
