//! Environment provisioning and teardown.
//!
//! `provision` brings every layer workspace of one environment to the
//! declared state. It runs in five phases:
//!
//! 1. generic platform connections (primary environment only),
//! 2. the source-control connection,
//! 3. per layer: workspace, permissions, identity, items, private endpoints
//!    and the initial Git seed,
//! 4. workspace identities granted on the workspaces that reference them,
//! 5. SQL connections for items that declare a `connection_name`.
//!
//! Workspace identities are granted after every layer exists, because a
//! layer may reference the identity of a later one.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use crate::client::Ensured;
use crate::config::{EnvironmentDefinition, GitProvider, Layer, Permissions};
use crate::error::Result;
use crate::git::{GitIntegration, SeedOutcome};
use crate::items::{ItemDetails, ItemType};
use crate::naming::is_guid;
use crate::resources::EndpointWait;
use crate::transport::Transport;

use super::Session;

/// What a provisioning run learned about the environment.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    /// Layer name to workspace id, for workspaces that could be resolved.
    pub workspace_ids: Vec<(String, String)>,
    item_details: HashMap<(String, String), ItemDetails>,
}

impl ProvisionReport {
    pub fn workspace_id(&self, layer: &str) -> Option<&str> {
        self.workspace_ids
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(layer))
            .map(|(_, id)| id.as_str())
    }

    /// Details of an item read while provisioning, keyed by workspace and
    /// `<Name>.<Type>`.
    pub fn item_details(&self, workspace: &str, item: &str, item_type: &ItemType) -> Option<&ItemDetails> {
        self.item_details
            .get(&(workspace.to_string(), format!("{}.{}", item, item_type)))
    }

    fn remember(&mut self, workspace: &str, item: &str, item_type: &ItemType, details: ItemDetails) {
        self.item_details
            .insert((workspace.to_string(), format!("{}.{}", item, item_type)), details);
    }
}

/// A workspace identity granted on another workspace once all exist.
struct DeferredIdentity {
    workspace: String,
    identity_workspace: String,
}

/// Create or update every resource of `environment`.
pub fn provision<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
) -> Result<ProvisionReport> {
    let mut report = ProvisionReport::default();
    let generic = &definition.generic;

    let mut header_printed = false;
    if generic.is_primary && !generic.fabric_connections.is_empty() {
        session.out.header("Configuring generic solution connections");
        header_printed = true;
        create_generic_connections(session, definition);
    }
    let git_connection_id = ensure_git_connection(session, definition, header_printed);

    session.out.header(&format!("Setting up {} environment", environment));
    let mut identities = Vec::new();
    for layer in &definition.layers {
        provision_layer(
            session,
            definition,
            environment,
            layer,
            git_connection_id.as_deref(),
            &mut identities,
            &mut report,
        )?;
    }

    if !identities.is_empty() {
        session
            .out
            .header("Assigning workspace identities as members on workspaces");
        for deferred in &identities {
            assign_workspace_identity(session, deferred);
        }
    }

    if definition
        .layers
        .iter()
        .any(|layer| layer.definition.connected_items().next().is_some())
    {
        session.out.header("Configuring item connections");
        for layer in &definition.layers {
            create_item_connections(session, definition, environment, layer, &report)?;
        }
    }

    session.out.finish();
    log::info!("environment {} provisioned", environment);
    Ok(report)
}

fn grant_connection_permissions<T: Transport>(
    session: &Session<'_, T>,
    connection_id: &str,
    permissions: &Permissions,
) {
    if permissions.is_empty() {
        return;
    }
    session.out.detail("Assigning connection permissions...");
    match session
        .client
        .assign_connection_permissions(connection_id, permissions)
    {
        Ok(_) => session.out.success(""),
        Err(e) => session.fail(&e),
    }
}

fn connection_object_id(connection: &JsonValue) -> Option<&str> {
    connection.get("id").and_then(JsonValue::as_str)
}

fn create_generic_connections<T: Transport>(session: &Session<'_, T>, definition: &EnvironmentDefinition) {
    let client = session.client;
    for spec in &definition.generic.fabric_connections {
        session
            .out
            .info_inline(&format!("Creating Fabric connection '{}'...", spec.name));
        let connection = match client.connection_exists(&spec.name) {
            Ok(true) => {
                session.out.warning("Already exists");
                session.check(client.get_connection(&spec.name)).flatten()
            }
            Ok(false) => match client.create_fabric_connection(spec, &session.context.credentials) {
                Ok(Some(connection)) => {
                    session.out.success("");
                    Some(connection)
                }
                Ok(None) => {
                    session.out.error("Failed!");
                    None
                }
                Err(e) => {
                    session.fail(&e);
                    None
                }
            },
            Err(e) => {
                session.fail(&e);
                None
            }
        };
        if let Some(id) = connection.as_ref().and_then(connection_object_id) {
            grant_connection_permissions(session, id, &definition.generic.permissions);
        }
    }
}

/// Make sure the source-control connection exists; returns its id.
fn ensure_git_connection<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    header_printed: bool,
) -> Option<String> {
    let settings = definition.generic.git_settings.as_ref()?;
    let identifier = settings.connection_identifier()?;
    let client = session.client;

    if !header_printed {
        session.out.header("Configuring generic solution connections");
    }
    session
        .out
        .info_inline(&format!("Creating source control connection '{}'...", identifier));

    let connection = match client.connection_exists(&identifier) {
        Ok(true) => {
            session.out.warning("Already exists");
            session.check(client.get_connection(&identifier)).flatten()
        }
        Ok(false) if is_guid(&identifier) => {
            session.out.error("Failed! Connection id does not exist.");
            return None;
        }
        Ok(false) => {
            let created = settings.repository_url().and_then(|url| match settings.provider() {
                GitProvider::GitHub => match session.context.github_pat.as_deref() {
                    Some(token) => client.create_github_connection(&identifier, url.as_str(), token),
                    None => Err(crate::error::Error::config_with_hint(
                        "no GitHub token available",
                        "Pass --github-pat or set GITHUB_PAT",
                    )),
                },
                GitProvider::AzureDevOps => client.create_azure_devops_connection(
                    &identifier,
                    url.as_str(),
                    &session.context.credentials,
                ),
            });
            match created.and_then(|_| client.get_connection(&identifier)) {
                Ok(Some(connection)) => {
                    session.out.success("");
                    Some(connection)
                }
                Ok(None) => {
                    session.out.error("Failed!");
                    None
                }
                Err(e) => {
                    session.fail(&e);
                    None
                }
            }
        }
        Err(e) => {
            session.fail(&e);
            None
        }
    };

    let id = connection.as_ref().and_then(connection_object_id)?.to_string();
    grant_connection_permissions(session, &id, &definition.generic.permissions);
    Some(id)
}

fn provision_layer<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    layer: &Layer,
    git_connection_id: Option<&str>,
    identities: &mut Vec<DeferredIdentity>,
    report: &mut ProvisionReport,
) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let layer_def = &layer.definition;
    let workspace = definition.workspace_name(&layer.name, environment)?;

    out.info("");
    out.info_inline(&format!("Creating workspace '{}'...", workspace));
    let ensured = match client.ensure_workspace(&workspace, definition.capacity_for(layer_def)) {
        Ok(ensured) => ensured,
        Err(e) => {
            session.fail(&e);
            return Ok(());
        }
    };
    let workspace_id = match session.check(client.workspace_id(&workspace, 2)) {
        Some(Some(id)) => id,
        Some(None) => {
            out.error("Failed! Workspace id could not be resolved.");
            return Ok(());
        }
        None => return Ok(()),
    };
    match ensured {
        Ensured::Created => out.success(""),
        Ensured::AlreadyExisted => out.warning("Already exists"),
    }
    report
        .workspace_ids
        .push((layer.name.clone(), workspace_id.clone()));

    let permissions = layer_def.permissions.merged_with(&definition.generic.permissions);
    for (role, principal) in permissions.assignments() {
        if principal.is_workspace_identity() {
            if let Some(template) = &principal.name {
                identities.push(DeferredIdentity {
                    workspace: workspace.clone(),
                    identity_workspace: template.environment_workspace(&layer.name, environment)?,
                });
            }
            continue;
        }
        let Some(id) = principal.id.as_deref() else {
            continue;
        };
        out.detail(&format!("Assigning workspace permission for identity {}...", id));
        match client.assign_workspace_role(&workspace, id, role) {
            Ok(()) => out.success(""),
            Err(e) => session.fail(&e),
        }
    }

    if layer_def.create_workspace_identity {
        out.detail("Creating workspace identity...");
        match client.ensure_managed_identity(&workspace) {
            Ok(Ensured::Created) => out.success(""),
            Ok(Ensured::AlreadyExisted) => out.warning("Already exists"),
            Err(e) => session.fail(&e),
        }
    }

    let mut item_header = true;
    for (item_type, item) in layer_def.items() {
        if item.skip_item_creation {
            continue;
        }
        if item_header {
            out.info("  • Creating workspace items:");
            item_header = false;
        }
        let folder = item.item_folder.as_deref().filter(|f| !f.is_empty());
        let shown = match folder {
            Some(folder) => format!("{}/{}", folder, item.item_name),
            None => item.item_name.clone(),
        };
        out.info_inline(&format!("    ◦ {}: {}...", item_type, shown));
        if let Some(details) = provision_item(session, &workspace, folder, &item.item_name, item_type) {
            report.remember(&workspace, &item.item_name, item_type, details);
        }
    }

    if !layer_def.private_endpoints.is_empty() {
        out.info("  • Creating private endpoints:");
        for endpoint in &layer_def.private_endpoints {
            out.info_inline(&format!("    ◦ Provisioning {}...", endpoint.name));
            match client.ensure_private_endpoint(&workspace, endpoint) {
                Ok(Some(Ensured::Created)) => out.success(""),
                Ok(Some(Ensured::AlreadyExisted)) => out.warning("Already exists"),
                Ok(None) => out.warning("Unsupported private link resource type. Skipping!"),
                Err(e) => session.fail(&e),
            }
        }
    }

    if let (Some(settings), Some(connection_id), Some(directory)) = (
        definition.generic.git_settings.as_ref(),
        git_connection_id,
        layer_def.git_directory_name.as_deref(),
    ) {
        out.detail("Setting up Git integration...");
        let request = settings.connect_request(connection_id, None, Some(directory));
        match GitIntegration::new(client).seed(&workspace_id, &request, false) {
            Ok(SeedOutcome::Seeded { .. }) => out.success(""),
            Ok(SeedOutcome::ConnectionFailed) => {
                out.error("Failed! Please verify connection and tenant settings.")
            }
            Err(e) => session.fail(&e),
        }
    }

    Ok(())
}

/// Create one item and read back its details, waiting for a new Lakehouse
/// to finish provisioning its SQL endpoint.
fn provision_item<T: Transport>(
    session: &Session<'_, T>,
    workspace: &str,
    folder: Option<&str>,
    name: &str,
    item_type: &ItemType,
) -> Option<ItemDetails> {
    let client = session.client;
    let out = session.out;
    match session.check(client.ensure_item(workspace, folder, name, item_type))? {
        Ensured::AlreadyExisted => {
            let details = session
                .check(client.item_details(workspace, folder, name, item_type, 0))
                .flatten();
            out.warning("Already exists");
            details
        }
        Ensured::Created => {
            let details = session
                .check(client.item_details(workspace, folder, name, item_type, 2))?;
            if *item_type != ItemType::Lakehouse {
                return match details {
                    Some(details) => {
                        out.success("");
                        Some(details)
                    }
                    None => {
                        out.error("Failed!");
                        None
                    }
                };
            }
            match client.wait_for_sql_endpoint(workspace, folder, name, details, || out.tick()) {
                Ok(EndpointWait::Settled(details)) => {
                    out.success("");
                    Some(details)
                }
                Ok(EndpointWait::TimedOut(details)) => {
                    out.warning("Timed out waiting for Lakehouse SQL endpoint provisioning");
                    details
                }
                Err(e) => {
                    session.fail(&e);
                    None
                }
            }
        }
    }
}

fn assign_workspace_identity<T: Transport>(session: &Session<'_, T>, deferred: &DeferredIdentity) {
    session.out.detail(&format!(
        "Assigning workspace identity {} to {}...",
        deferred.identity_workspace, deferred.workspace
    ));
    let client = session.client;
    match client.workspace_identity_principal(&deferred.identity_workspace) {
        Ok(Some(principal)) => match client.assign_workspace_role(&deferred.workspace, &principal, "Admin") {
            Ok(()) => session.out.success(""),
            Err(e) => session.fail(&e),
        },
        Ok(None) => session.out.error("Failed! Workspace identity not found."),
        Err(e) => session.fail(&e),
    }
}

fn create_item_connections<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    layer: &Layer,
    report: &ProvisionReport,
) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let workspace = definition.workspace_name(&layer.name, environment)?;
    let permissions = layer
        .definition
        .permissions
        .merged_with(&definition.generic.permissions);

    for (item_type, item, template) in layer.definition.connected_items() {
        let name = template.environment_workspace(&layer.name, environment)?;
        out.info("");
        out.info_inline(&format!("Creating item connection for {}...", name));

        let details = match report.item_details(&workspace, &item.item_name, item_type) {
            Some(details) => Some(details.clone()),
            None => match session.check(client.item_details(
                &workspace,
                item.item_folder.as_deref().filter(|f| !f.is_empty()),
                &item.item_name,
                item_type,
                0,
            )) {
                Some(details) => details,
                None => continue,
            },
        };
        let Some(details) = details else {
            out.error("Failed to retrieve item!");
            continue;
        };
        let Some(server) = details.sql_server() else {
            out.error("Failed! SQL endpoint address not available.");
            continue;
        };
        let database = match item_type {
            ItemType::SqlDatabase => details.database_name().unwrap_or(&item.item_name),
            _ => item.item_name.as_str(),
        };

        let created = match client.connection_exists(&name) {
            Ok(true) => {
                out.warning("Already exists");
                true
            }
            Ok(false) => match client.create_sql_connection(&name, server, database, &session.context.credentials) {
                Ok(_) => {
                    out.success("");
                    true
                }
                Err(e) => {
                    session.fail(&e);
                    false
                }
            },
            Err(e) => {
                session.fail(&e);
                false
            }
        };
        if !created {
            continue;
        }
        if let Some(Some(id)) = session.check(client.connection_id(&name)) {
            grant_connection_permissions(session, &id, &permissions);
        }
    }
    Ok(())
}

/// Delete the connections and workspaces of `environment`.
pub fn teardown<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let generic = &definition.generic;

    out.header("Deleting generic solution connections");
    if generic.is_primary {
        for spec in &generic.fabric_connections {
            if let Some(true) = session.check(client.connection_exists(&spec.name)) {
                out.info_inline(&format!("Deleting connection '{}'...", spec.name));
                match client.remove_connection(&spec.name) {
                    Ok(_) => out.success(""),
                    Err(e) => session.fail(&e),
                }
            }
        }
    }

    if let Some(identifier) = generic
        .git_settings
        .as_ref()
        .and_then(|settings| settings.connection_identifier())
    {
        if let Some(Some(connection)) = session.check(client.get_connection(&identifier)) {
            let name = connection
                .get("displayName")
                .and_then(JsonValue::as_str)
                .unwrap_or(&identifier)
                .to_string();
            out.info_inline(&format!("Deleting connection '{}'...", name));
            match client.remove_connection(&name) {
                Ok(_) => out.success(""),
                Err(e) => session.fail(&e),
            }
        }
    }

    out.header(&format!("Deleting {} environment", environment));
    for layer in &definition.layers {
        let workspace = definition.workspace_name(&layer.name, environment)?;
        out.info_inline(&format!("Deleting workspace '{}'...", workspace));
        match client.exists(&crate::naming::workspace_path(&workspace)) {
            Ok(true) => {
                let mut removed = Ok(());
                for endpoint in &layer.definition.private_endpoints {
                    if let Err(e) = client.remove_private_endpoint(&workspace, &endpoint.name) {
                        removed = Err(e);
                        break;
                    }
                }
                match removed.and_then(|_| client.remove_workspace(&workspace)) {
                    Ok(_) => out.success(""),
                    Err(e) => session.fail(&e),
                }
            }
            Ok(false) => out.warning("Does not exist. Skipping deletion!"),
            Err(e) => session.fail(&e),
        }

        for (_, _, template) in layer.definition.connected_items() {
            let name = template.environment_workspace(&layer.name, environment)?;
            out.detail(&format!("Deleting connection '{}'...", name));
            match client.remove_connection(&name) {
                Ok(true) => out.success(""),
                Ok(false) => out.warning("Does not exist. Skipping deletion!"),
                Err(e) => session.fail(&e),
            }
        }
    }
    out.finish();
    log::info!("environment {} deleted", environment);
    Ok(())
}
