//! Idempotent helpers for workspaces and the resources inside them.
//!
//! Every `ensure_*` helper checks existence first and creates only when the
//! resource is missing. The check and the create are separate CLI calls, so
//! two runs against the same environment can still race; runs are expected
//! to be serialized by the calling pipeline.

use std::path::Path;

use serde_json::Value as JsonValue;

use crate::client::{is_failure_output, quote, Ensured, FabricClient};
use crate::config::PrivateEndpointSpec;
use crate::error::Result;
use crate::items::{ItemDetails, ItemType, WorkspaceItem};
use crate::naming::{is_guid, item_path, managed_identity_path, private_endpoint_path, workspace_path};
use crate::retry::{poll, Poll};
use crate::transport::Transport;

/// Outcome of waiting for a Lakehouse SQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointWait {
    Settled(ItemDetails),
    /// Still provisioning when the budget ran out; last details seen, if any.
    TimedOut(Option<ItemDetails>),
}

/// Private-link sub-resource for an Azure resource id, by provider and type.
pub fn private_endpoint_subresource(resource_id: &str) -> Option<&'static str> {
    let segments: Vec<&str> = resource_id.split('/').filter(|s| !s.is_empty()).collect();
    let providers = segments
        .iter()
        .position(|s| s.eq_ignore_ascii_case("providers"))?;
    let namespace = segments.get(providers + 1)?.to_ascii_lowercase();
    let resource_type = segments.get(providers + 2)?.to_ascii_lowercase();

    let subresource = match (namespace.as_str(), resource_type.as_str()) {
        ("microsoft.sql", "servers") => "sqlServer",
        ("microsoft.storage", "storageaccounts") => "blob",
        ("microsoft.keyvault", "vaults") => "vault",
        ("microsoft.documentdb", "databaseaccounts") => "Sql",
        ("microsoft.synapse", "workspaces") => "Sql",
        ("microsoft.eventhub", "namespaces") => "namespace",
        ("microsoft.dbforpostgresql", _) => "postgresqlServer",
        ("microsoft.dbformysql", _) => "mysqlServer",
        ("microsoft.web", "sites") => "sites",
        ("microsoft.cognitiveservices", "accounts") => "account",
        ("microsoft.datafactory", "factories") => "dataFactory",
        _ => return None,
    };
    Some(subresource)
}

/// Flatten nested settings into dotted keys with CLI-ready values.
///
/// `{"pool": {"starterPool": {"maxNodeCount": 2}}}` becomes
/// `[("pool.starterPool.maxNodeCount", "2")]`.
pub fn flatten_settings(settings: &JsonValue) -> Vec<(String, String)> {
    fn walk(prefix: &str, value: &JsonValue, out: &mut Vec<(String, String)>) {
        match value {
            JsonValue::Object(map) => {
                for (key, child) in map {
                    let path = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    walk(&path, child, out);
                }
            }
            JsonValue::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    let mut out = Vec::new();
    walk("", settings, &mut out);
    out
}

impl<T: Transport> FabricClient<T> {
    /// Create the workspace on `capacity` unless it exists.
    pub fn ensure_workspace(&self, name: &str, capacity: Option<&str>) -> Result<Ensured> {
        let properties: Vec<(&str, String)> = capacity
            .map(|c| vec![("capacityname", c.to_string())])
            .unwrap_or_default();
        self.ensure_created(&workspace_path(name), &properties)
    }

    /// Id of a workspace by display name.
    pub fn workspace_id(&self, name: &str, retries: u32) -> Result<Option<String>> {
        self.get_item_id(&workspace_path(name), retries)
    }

    /// Delete the workspace if it exists; returns whether it did.
    pub fn remove_workspace(&self, name: &str) -> Result<bool> {
        let path = workspace_path(name);
        if !self.exists(&path)? {
            return Ok(false);
        }
        self.remove(&path)?;
        Ok(true)
    }

    pub fn assign_workspace_role(&self, workspace: &str, principal_id: &str, role: &str) -> Result<()> {
        let output = self.acl_set(&workspace_path(workspace), principal_id, role)?;
        log::debug!("acl set {} {} {}: {}", workspace, principal_id, role, output);
        Ok(())
    }

    pub fn ensure_managed_identity(&self, workspace: &str) -> Result<Ensured> {
        self.ensure_created(&managed_identity_path(workspace), &[])
    }

    /// Service principal id of the identity owned by `workspace`.
    pub fn workspace_identity_principal(&self, workspace: &str) -> Result<Option<String>> {
        let id = self.query(
            &workspace_path(workspace),
            "workspaceIdentity.servicePrincipalId",
        )?;
        Ok(Some(id).filter(|id| is_guid(id)))
    }

    /// Create an item unless it exists.
    pub fn ensure_item(
        &self,
        workspace: &str,
        folder: Option<&str>,
        name: &str,
        item_type: &ItemType,
    ) -> Result<Ensured> {
        self.ensure_created(&item_path(workspace, folder, name, item_type.as_str()), &[])
    }

    /// Fetch an item and interpret its SQL metadata.
    pub fn item_details(
        &self,
        workspace: &str,
        folder: Option<&str>,
        name: &str,
        item_type: &ItemType,
        retries: u32,
    ) -> Result<Option<ItemDetails>> {
        let path = item_path(workspace, folder, name, item_type.as_str());
        Ok(self
            .get_item(&path, retries)?
            .map(|item| ItemDetails::from_item(item_type, &item)))
    }

    /// Re-read a Lakehouse until its SQL endpoint leaves `InProgress`.
    ///
    /// `initial` counts as the first probe. `on_wait` runs before every
    /// re-read.
    pub fn wait_for_sql_endpoint(
        &self,
        workspace: &str,
        folder: Option<&str>,
        name: &str,
        initial: Option<ItemDetails>,
        mut on_wait: impl FnMut(),
    ) -> Result<EndpointWait> {
        let mut latest = initial;
        let mut failure = None;
        let settled = poll(self.timings().sql_endpoint_provisioning, |attempt| {
            if attempt > 1 {
                on_wait();
                match self.item_details(workspace, folder, name, &ItemType::Lakehouse, 0) {
                    Ok(details) => latest = details,
                    Err(e) => {
                        failure = Some(e);
                        return Poll::Abort;
                    }
                }
            }
            match &latest {
                Some(details) if details.is_settled() => Poll::Ready(details.clone()),
                _ => Poll::Pending,
            }
        });
        if let Some(e) = failure {
            return Err(e);
        }
        Ok(match settled {
            Some(details) => EndpointWait::Settled(details),
            None => EndpointWait::TimedOut(latest),
        })
    }

    /// Create a managed private endpoint unless it exists.
    ///
    /// Returns `Ok(None)` when the target resource type is not supported.
    pub fn ensure_private_endpoint(
        &self,
        workspace: &str,
        endpoint: &PrivateEndpointSpec,
    ) -> Result<Option<Ensured>> {
        let subresource = match private_endpoint_subresource(&endpoint.id) {
            Some(subresource) => subresource,
            None => return Ok(None),
        };
        let properties = [
            ("targetPrivateLinkResourceId", endpoint.id.clone()),
            ("targetSubresourceType", subresource.to_string()),
            ("autoApproveEnabled", endpoint.auto_approve.to_string()),
        ];
        self.ensure_created(&private_endpoint_path(workspace, &endpoint.name), &properties)
            .map(Some)
    }

    pub fn remove_private_endpoint(&self, workspace: &str, name: &str) -> Result<bool> {
        let path = private_endpoint_path(workspace, name);
        if !self.exists(&path)? {
            return Ok(false);
        }
        self.remove(&path)?;
        Ok(true)
    }

    /// Apply spark settings one dotted key at a time.
    pub fn apply_spark_settings(&self, workspace: &str, settings: &JsonValue) -> Result<usize> {
        let path = workspace_path(workspace);
        let flattened = flatten_settings(settings);
        for (key, value) in &flattened {
            self.set(&path, &format!("sparkSettings.{}", key), value)?;
        }
        Ok(flattened.len())
    }

    /// All items of a workspace, following continuation tokens.
    ///
    /// A non-GUID id yields an empty list without calling the API.
    pub fn list_workspace_items(&self, workspace_id: &str) -> Result<Vec<WorkspaceItem>> {
        let mut items = Vec::new();
        if !is_guid(workspace_id) {
            return Ok(items);
        }
        let mut continuation: Option<String> = None;
        loop {
            let path = match &continuation {
                Some(token) => format!("workspaces/{}/items?continuationToken={}", workspace_id, token),
                None => format!("workspaces/{}/items", workspace_id),
            };
            let response = self.api_get(&path)?;
            if let Some(values) = response.text.get("value").and_then(JsonValue::as_array) {
                for value in values {
                    match serde_json::from_value::<WorkspaceItem>(value.clone()) {
                        Ok(item) => items.push(item),
                        Err(e) => log::debug!("skipping unreadable item in {}: {}", workspace_id, e),
                    }
                }
            }
            continuation = response
                .text_str("continuationToken")
                .filter(|t| !t.is_empty())
                .map(str::to_string);
            if continuation.is_none() {
                break;
            }
        }
        Ok(items)
    }

    /// Import an item definition directory, replacing the deployed definition.
    ///
    /// Returns `false` when the CLI reports a failure.
    pub fn import_item(&self, workspace: &str, item: &str, item_type: &str, source: &Path) -> Result<bool> {
        let output = self.run(&format!(
            "import {} -i {} -f",
            quote(&item_path(workspace, None, item, item_type)),
            quote(&source.display().to_string())
        ))?;
        log::debug!("import {}.{}: {}", item, item_type, output);
        Ok(!is_failure_output(&output))
    }

    pub fn remove_item(&self, workspace: &str, item: &str, item_type: &str) -> Result<bool> {
        let output = self.remove(&item_path(workspace, None, item, item_type))?;
        Ok(!is_failure_output(&output))
    }
}
