//! Feature-branch workspaces.
//!
//! A feature branch gets its own workspace per selected layer, named from
//! the feature definition's template and the short branch name. Workspaces
//! are created once; later runs only pull new commits into them.

use crate::branch::{filter_layers, short_name, trim_feature_markers, trim_for_delete};
use crate::config::{FeatureDefinition, GitSettings, Layer};
use crate::context::GitIdentity;
use crate::error::Result;
use crate::git::{GitIntegration, SeedOutcome};
use crate::naming::workspace_path;
use crate::transport::Transport;

use super::Session;

/// Create the workspaces of a feature branch, resynchronizing existing ones.
pub fn create<T: Transport>(session: &Session<'_, T>, definition: &FeatureDefinition, branch: &str) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let trimmed = trim_feature_markers(branch);
    let feature = short_name(&trimmed);

    out.header("Setting up feature development workspaces");
    for layer in filter_layers(&definition.layers, &trimmed) {
        let workspace = definition.workspace_name(feature, &layer.name)?;
        let exists = match client.exists(&workspace_path(&workspace)) {
            Ok(exists) => exists,
            Err(e) => {
                out.info_inline(&format!("Creating workspace '{}'...", workspace));
                session.fail(&e);
                continue;
            }
        };

        if exists {
            out.info(&format!(
                "{} already exist. Feature workspace creation skipped!",
                workspace
            ));
            if layer.definition.synchronizes_on_commit(false) {
                out.detail(&format!(
                    "Synchronizing workspace {} with latest changes from Git...",
                    workspace
                ));
                synchronize(session, &workspace);
            }
        } else {
            create_workspace(session, definition, layer, &workspace, branch)?;
        }
        out.info("");
    }
    out.success("Feature development workspace setup completed!");
    Ok(())
}

fn create_workspace<T: Transport>(
    session: &Session<'_, T>,
    definition: &FeatureDefinition,
    layer: &Layer,
    workspace: &str,
    branch: &str,
) -> Result<()> {
    let client = session.client;
    let out = session.out;

    out.info_inline(&format!("Creating workspace '{}'...", workspace));
    if let Err(e) = client.ensure_workspace(workspace, definition.capacity_name.as_deref()) {
        session.fail(&e);
        return Ok(());
    }
    let workspace_id = match session.check(client.workspace_id(workspace, 2)) {
        Some(Some(id)) => id,
        Some(None) => {
            out.error("Failed! Workspace id could not be resolved.");
            return Ok(());
        }
        None => return Ok(()),
    };
    out.success("");

    if !definition.permissions.is_empty() {
        out.detail("Assigning workspace permissions...");
        let mut result = Ok(());
        for (role, principal) in definition.permissions.assignments() {
            if let Some(id) = principal.id.as_deref() {
                result = client.assign_workspace_role(workspace, id, role);
                if result.is_err() {
                    break;
                }
            }
        }
        match result {
            Ok(()) => out.success(""),
            Err(e) => session.fail(&e),
        }
    }

    if let Some(settings) = &layer.definition.spark_settings {
        out.detail("Set workspace spark settings...");
        match client.apply_spark_settings(workspace, settings) {
            Ok(_) => out.success(""),
            Err(e) => session.fail(&e),
        }
    }

    if let Some(settings) = &definition.git_settings {
        out.detail(&format!(
            "Setting up Git integration ({})...",
            settings.git_provider_details.git_provider_type
        ));
        let Some(connection_id) = resolve_connection_id(session, settings) else {
            out.error("Connection not found. Skipping Git integration setup.");
            return Ok(());
        };
        let request = settings.connect_request(
            &connection_id,
            Some(branch),
            layer.definition.git_directory_name.as_deref(),
        );
        let disconnect = layer.definition.git_disconnect_after_initialize;
        match GitIntegration::new(client).seed(&workspace_id, &request, disconnect) {
            Ok(SeedOutcome::Seeded { disconnected, .. }) => {
                out.success("");
                if disconnected {
                    out.detail("Disconnect workspace from git...");
                    out.success("");
                }
            }
            Ok(SeedOutcome::ConnectionFailed) => {
                out.error("Failed! Please verify connection and tenant settings.")
            }
            Err(e) => session.fail(&e),
        }
    }
    Ok(())
}

/// The source-control connection to use: the configured id when it exists,
/// replaced by the per-user connection named from the template when that
/// one exists.
fn resolve_connection_id<T: Transport>(session: &Session<'_, T>, settings: &GitSettings) -> Option<String> {
    let client = session.client;
    let credentials = &settings.my_git_credentials;
    let mut connection_id = None;

    if let Some(id) = credentials.connection_id.as_deref() {
        if let Some(true) = session.check(client.connection_exists(id)) {
            connection_id = Some(id.to_string());
        }
    }

    if let Some(template) = &credentials.connection_name {
        let identity = GitIdentity::resolve(settings.provider(), &session.context.pipeline);
        let (id, username) = identity
            .as_ref()
            .map(|i| (i.id.as_str(), i.username.as_str()))
            .unwrap_or_default();
        match template.render(&[("identity_id", id), ("identity_username", username)]) {
            Ok(name) => {
                if let Some(Some(id)) = session.check(client.connection_id(&name)) {
                    connection_id = Some(id);
                }
            }
            Err(e) => log::warn!("git connection name: {}", e),
        }
    }
    connection_id
}

fn synchronize<T: Transport>(session: &Session<'_, T>, workspace: &str) {
    let client = session.client;
    let workspace_id = match session.check(client.workspace_id(workspace, 0)) {
        Some(Some(id)) => id,
        Some(None) => {
            session.out.error("Failed! Workspace id could not be resolved.");
            return;
        }
        None => return,
    };
    match GitIntegration::new(client).synchronize(&workspace_id, false) {
        Ok(outcome) => session.report_sync(outcome),
        Err(e) => session.fail(&e),
    }
}

/// Pull the latest commits into the feature workspaces flagged for it.
pub fn update<T: Transport>(session: &Session<'_, T>, definition: &FeatureDefinition, branch: &str) -> Result<()> {
    let trimmed = trim_feature_markers(branch);
    let feature = short_name(&trimmed);

    session.out.header("Synchronizing feature development workspaces");
    for layer in filter_layers(&definition.layers, &trimmed) {
        if !layer.definition.synchronizes_on_commit(false) {
            continue;
        }
        let workspace = definition.workspace_name(feature, &layer.name)?;
        session.out.info_inline(&format!(
            "Synchronizing workspace {} with latest changes from Git repo...",
            workspace
        ));
        synchronize(session, &workspace);
    }
    session.out.success("Feature development workspace setup completed!");
    Ok(())
}

/// Remove the workspaces of a feature branch.
pub fn delete<T: Transport>(session: &Session<'_, T>, definition: &FeatureDefinition, branch: &str) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let layers = filter_layers(&definition.layers, &trim_feature_markers(branch));
    let feature = short_name(trim_for_delete(branch));

    out.header("Remove feature development workspaces");
    for layer in layers {
        let workspace = definition.workspace_name(feature, &layer.name)?;
        out.info_inline(&format!("Deleting workspace '{}'...", workspace));
        match client.remove_workspace(&workspace) {
            Ok(true) => out.success(""),
            Ok(false) => out.warning("Workspace does not exist. Skipping deletion!"),
            Err(e) => session.fail(&e),
        }
    }
    out.success("Removal of feature development workspaces completed!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineVariables;
    use crate::output::Printer;
    use crate::workflows::testing::{client, context, created_before, ok, WS_ID};
    use serde_json::json;

    const CONN_ID: &str = "5f1e2d3c-4b5a-4968-8776-a5b4c3d2e1f0";

    fn definition() -> FeatureDefinition {
        let value = json!({
            "feature_name": "Sales - {feature_name} - {layer_name}",
            "capacity_name": "dev-cap",
            "permissions": {"Admin": [{"type": "Group", "id": "g1"}]},
            "git_settings": {
                "gitProviderDetails": {"gitProviderType": "GitHub", "ownerName": "contoso", "repositoryName": "sales"},
                "myGitCredentials": {"source": "ConfiguredConnection", "connection_name": "gh-{identity_username}"}
            },
            "layers": {
                "Core": {"always_provision": true, "git_directoryName": "core"},
                "Store": {
                    "git_directoryName": "store",
                    "git_synchronize_on_commit": true,
                    "spark_settings": {"pool": {"customizeComputeEnabled": false}}
                },
                "Model": {"git_directoryName": "model", "git_disconnect_after_initialize": true}
            }
        });
        serde_json::from_value(value).unwrap()
    }

    fn platform(command: &str, history: &[String]) -> String {
        if command.starts_with("exists '.connections/") {
            return "true".to_string();
        }
        if command.starts_with("exists ") {
            return created_before(command, history).to_string();
        }
        if command.starts_with("get '.connections/") {
            return json!({"id": CONN_ID}).to_string();
        }
        if command.contains("-q id") {
            return WS_ID.to_string();
        }
        if command.contains("git/connection") {
            return ok(json!({"gitConnectionState": "Connected"}));
        }
        if command.contains("initializeConnection") {
            return ok(json!({"requiredAction": "UpdateFromGit", "remoteCommitHash": "abc"}));
        }
        ok(json!({}))
    }

    fn context_for_actor() -> crate::context::RunContext {
        context().with_pipeline(PipelineVariables {
            github_actor: Some("octocat".into()),
            github_actor_id: Some("42".into()),
            ..Default::default()
        })
    }

    #[test]
    fn test_create_selects_layer_from_branch() {
        let client = client(platform);
        let out = Printer::capture();
        let ctx = context_for_actor();
        let session = Session::new(&client, &out, &ctx);

        create(&session, &definition(), "store/feature/login-page").unwrap();

        let creates = client.transport().calls_starting_with("create");
        assert_eq!(
            creates,
            vec![
                "create 'Sales - login-page - Core.Workspace' -P capacityname=dev-cap",
                "create 'Sales - login-page - Store.Workspace' -P capacityname=dev-cap",
            ]
        );
        let connects = client.transport().calls_containing("git/connect ");
        assert_eq!(connects.len(), 2);
        assert!(connects[1].contains(r#""branchName":"store/feature/login-page""#));
        assert!(connects[1].contains(r#""directoryName":"store""#));
        assert!(connects[1].contains(&format!(r#""connectionId":"{}""#, CONN_ID)));
        assert_eq!(
            client
                .transport()
                .calls_starting_with("get '.connections/gh-octocat.Connection'")
                .len(),
            2
        );
        assert_eq!(
            client
                .transport()
                .calls_starting_with("set 'Sales - login-page - Store.Workspace' -q sparkSettings.pool.customizeComputeEnabled -i false -f")
                .len(),
            1
        );
        assert!(out
            .captured()
            .contains("Feature development workspace setup completed!"));
    }

    #[test]
    fn test_create_disconnects_when_flagged() {
        let client = client(platform);
        let out = Printer::capture();
        let ctx = context_for_actor();
        let session = Session::new(&client, &out, &ctx);

        create(&session, &definition(), "model/feature/x").unwrap();

        assert_eq!(client.transport().calls_containing("git/disconnect").len(), 1);
        assert!(out.captured().contains("Disconnect workspace from git..."));
    }

    #[test]
    fn test_create_without_connection_skips_git() {
        let client = client(|command, history| {
            if command.starts_with("get '.connections/") {
                return "x [NotFound] The Connection could not be found".to_string();
            }
            platform(command, history)
        });
        let out = Printer::capture();
        let ctx = context_for_actor();
        let session = Session::new(&client, &out, &ctx);

        create(&session, &definition(), "feature/x").unwrap();

        assert!(client.transport().calls_containing("git/connect").is_empty());
        assert!(out
            .captured()
            .contains("Connection not found. Skipping Git integration setup."));
    }

    #[test]
    fn test_existing_workspace_is_resynchronized() {
        let client = client(|command, _| {
            if command.starts_with("exists ") {
                return "true".to_string();
            }
            if command.contains("-q id") {
                return WS_ID.to_string();
            }
            if command.contains("git/status") {
                return ok(json!({"workspaceHead": "a", "remoteCommitHash": "b", "changes": []}));
            }
            ok(json!({}))
        });
        let out = Printer::capture();
        let ctx = context_for_actor();
        let session = Session::new(&client, &out, &ctx);

        create(&session, &definition(), "feature/x").unwrap();

        assert!(client.transport().calls_starting_with("create").is_empty());
        // only Store is flagged for synchronization
        assert_eq!(client.transport().calls_containing("updateFromGit").len(), 1);
        assert!(out
            .captured()
            .contains("Sales - x - Core already exist. Feature workspace creation skipped!"));
    }

    #[test]
    fn test_update_reports_up_to_date() {
        let client = client(|command, _| {
            if command.contains("-q id") {
                return WS_ID.to_string();
            }
            ok(json!({"workspaceHead": "a", "remoteCommitHash": "a"}))
        });
        let out = Printer::capture();
        let ctx = context();
        let session = Session::new(&client, &out, &ctx);

        update(&session, &definition(), "feature/x").unwrap();

        assert!(client.transport().calls_containing("updateFromGit").is_empty());
        assert!(out.captured().contains("Already up to date."));
    }

    #[test]
    fn test_delete_uses_last_segment() {
        let client = client(|_, _| "true".to_string());
        let out = Printer::capture();
        let ctx = context();
        let session = Session::new(&client, &out, &ctx);

        delete(&session, &definition(), "refs/heads/feature/store/login-page").unwrap();

        assert_eq!(
            client.transport().calls_starting_with("rm"),
            vec![
                "rm 'Sales - login-page - Core.Workspace' -f",
                "rm 'Sales - login-page - Store.Workspace' -f",
            ]
        );
        assert!(out
            .captured()
            .contains("Removal of feature development workspaces completed!"));
    }
}
