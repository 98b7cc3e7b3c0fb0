//! Connections: SQL endpoints, source control and platform services.
//!
//! Connections live outside workspaces under `.connections/`. They are looked
//! up by display name or, when the identifier is a GUID, through the REST API.
//! Only one connection per name is expected; the caller checks before
//! creating.

use serde_json::{json, Value as JsonValue};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::client::{ApiRequest, ApiResponse, FabricClient};
use crate::config::{connection_role, FabricConnectionSpec, Permissions, Principal};
use crate::context::Credentials;
use crate::error::{Error, Result};
use crate::items::ItemType;
use crate::naming::{connection_path, is_guid};
use crate::retry::{poll, Poll};
use crate::transport::Transport;

/// Creation method of a generic platform connection type.
pub fn creation_method(connection_type: &str) -> Result<&'static str> {
    match connection_type {
        "FabricSql" => Ok("FabricSql.Contents"),
        "FabricDataPipelines" => Ok("FabricDataPipelines.Actions"),
        "Warehouse" => Ok("Fabric.Warehouse"),
        "PowerBIDatasets" => Ok("PowerBIDatasets.Actions"),
        other => Err(Error::config_with_hint(
            format!("connection type '{}' is not supported", other),
            "Use FabricSql, FabricDataPipelines, Warehouse or PowerBIDatasets",
        )),
    }
}

/// ADO.NET connection string for a SQL-backed item, authenticating as the
/// service principal.
pub fn sql_connection_string(server: &str, database: &str, credentials: &Credentials) -> String {
    format!(
        "Server={};Database={};Authentication=Active Directory Service Principal;User Id={};Password={};Encrypt=True;Connection Timeout=60;",
        server, database, credentials.client_id, credentials.client_secret
    )
}

fn service_principal_properties(credentials: &Credentials) -> [(&'static str, String); 3] {
    [
        ("credentialDetails.tenantId", credentials.tenant_id.clone()),
        ("credentialDetails.servicePrincipalClientId", credentials.client_id.clone()),
        ("credentialDetails.servicePrincipalSecret", credentials.client_secret.clone()),
    ]
}

/// What a semantic model needs to bind to a Lakehouse SQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionBinding {
    pub connection_id: String,
    pub sql_endpoint: String,
    pub database_name: String,
}

impl ConnectionBinding {
    /// Read id and `connectionDetails.path` (`<server>;<database>`) from a
    /// connection object. `None` when any part is missing.
    pub fn from_connection(connection: &JsonValue) -> Option<Self> {
        let connection_id = connection.get("id")?.as_str()?.to_string();
        let path = connection.pointer("/connectionDetails/path")?.as_str()?;
        let (server, database) = path.split_once(';')?;
        let (server, database) = (server.trim(), database.trim());
        if connection_id.is_empty() || server.is_empty() || database.is_empty() {
            return None;
        }
        Some(Self {
            connection_id,
            sql_endpoint: server.to_string(),
            database_name: database.to_string(),
        })
    }

    /// Body of `semanticModels/<id>/bindConnection`.
    pub fn request_body(&self) -> JsonValue {
        json!({
            "connectionBinding": {
                "id": self.connection_id,
                "connectivityType": "ShareableCloud",
                "connectionDetails": {
                    "type": "SQL",
                    "path": format!("{};{}", self.sql_endpoint, self.database_name)
                }
            }
        })
    }
}

impl<T: Transport> FabricClient<T> {
    /// Whether a connection exists, by GUID or display name.
    pub fn connection_exists(&self, identifier: &str) -> Result<bool> {
        if is_guid(identifier) {
            let response = self.api_get(&format!("connections/{}", identifier))?;
            Ok(response.status_code == 200)
        } else {
            self.exists(&connection_path(identifier))
        }
    }

    /// The connection object, by GUID or display name.
    pub fn get_connection(&self, identifier: &str) -> Result<Option<JsonValue>> {
        if is_guid(identifier) {
            let response = self.api_get(&format!("connections/{}", identifier))?;
            Ok(Some(response.text).filter(|_| response.status_code == 200))
        } else {
            self.get_item(&connection_path(identifier), 0)
        }
    }

    /// Id of a connection, by GUID or display name.
    pub fn connection_id(&self, identifier: &str) -> Result<Option<String>> {
        Ok(self.get_connection(identifier)?.and_then(|connection| {
            connection
                .get("id")
                .and_then(JsonValue::as_str)
                .map(str::to_string)
        }))
    }

    /// SQL connection to a Lakehouse, Warehouse or SQL database.
    pub fn create_sql_connection(
        &self,
        name: &str,
        server: &str,
        database: &str,
        credentials: &Credentials,
    ) -> Result<String> {
        let mut properties = vec![
            ("privacyLevel", "Organizational".to_string()),
            ("connectionDetails.type", "SQL".to_string()),
            ("connectionDetails.creationMethod", "SQL".to_string()),
            ("credentialDetails.connectionEncryption", "Encrypted".to_string()),
            ("credentialDetails.type", "ServicePrincipal".to_string()),
            ("connectionDetails.parameters.server", server.to_string()),
            ("connectionDetails.parameters.database", database.to_string()),
        ];
        properties.extend(service_principal_properties(credentials));
        self.create(&connection_path(name), &properties)
    }

    /// GitHub source-control connection using a personal access token.
    pub fn create_github_connection(&self, name: &str, repository_url: &str, token: &str) -> Result<String> {
        let properties = [
            ("privacyLevel", "Organizational".to_string()),
            ("connectionDetails.type", "GitHubSourceControl".to_string()),
            (
                "connectionDetails.creationMethod",
                "GitHubSourceControl.Contents".to_string(),
            ),
            ("credentialDetails.connectionEncryption", "Encrypted".to_string()),
            ("credentialDetails.type", "Key".to_string()),
            ("connectionDetails.parameters.url", repository_url.to_string()),
            ("credentialDetails.key", token.to_string()),
        ];
        self.create(&connection_path(name), &properties)
    }

    /// Azure DevOps source-control connection using the service principal.
    pub fn create_azure_devops_connection(
        &self,
        name: &str,
        repository_url: &str,
        credentials: &Credentials,
    ) -> Result<String> {
        let mut properties = vec![
            ("privacyLevel", "Organizational".to_string()),
            ("connectionDetails.type", "AzureDevOpsSourceControl".to_string()),
            (
                "connectionDetails.creationMethod",
                "AzureDevOpsSourceControl.Contents".to_string(),
            ),
            ("credentialDetails.connectionEncryption", "NotEncrypted".to_string()),
            ("credentialDetails.type", "ServicePrincipal".to_string()),
            ("connectionDetails.parameters.url", repository_url.to_string()),
        ];
        properties.extend(service_principal_properties(credentials));
        self.create(&connection_path(name), &properties)
    }

    /// Generic platform connection, retried until it can be read back.
    ///
    /// Returns the created connection object, or `None` after the last
    /// attempt.
    pub fn create_fabric_connection(
        &self,
        spec: &FabricConnectionSpec,
        credentials: &Credentials,
    ) -> Result<Option<JsonValue>> {
        let method = creation_method(&spec.connection_type)?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut properties = vec![
            ("privacyLevel", "Organizational".to_string()),
            ("connectionDetails.type", spec.connection_type.clone()),
            ("connectionDetails.creationMethod", method.to_string()),
            ("connectionDetails.parameters.options", timestamp.to_string()),
            ("credentialDetails.connectionEncryption", "NotEncrypted".to_string()),
            ("credentialDetails.type", spec.auth_type.clone()),
        ];
        if spec.auth_type == "ServicePrincipal" {
            properties.extend(service_principal_properties(credentials));
        }

        let path = connection_path(&spec.name);
        let mut failure = None;
        let created = poll(self.timings().connection_create, |attempt| {
            let lookup = self
                .create(&path, &properties)
                .and_then(|_| self.get_connection(&spec.name));
            match lookup {
                Ok(Some(connection)) => Poll::Ready(connection),
                Ok(None) => {
                    log::warn!(
                        "attempt {} to create connection '{}' returned no connection",
                        attempt,
                        spec.name
                    );
                    Poll::Pending
                }
                Err(e @ Error::Transport { .. }) => {
                    failure = Some(e);
                    Poll::Abort
                }
                Err(e) => {
                    log::warn!("attempt {} to create connection '{}': {}", attempt, spec.name, e);
                    Poll::Pending
                }
            }
        });
        match failure {
            Some(e) => Err(e),
            None => Ok(created),
        }
    }

    /// Grant `role` on a connection to one principal.
    pub fn add_connection_role(&self, connection_id: &str, principal: &Principal, role: &str) -> Result<ApiResponse> {
        let body = json!({
            "principal": {
                "id": principal.id,
                "type": principal.principal_type
            },
            "role": role
        });
        self.api_post(&format!("connections/{}/roleAssignments", connection_id), Some(&body))
    }

    /// Grant every workspace permission on a connection (`Admin` → `Owner`,
    /// anything else → `User`). Principals without an id are skipped.
    pub fn assign_connection_permissions(&self, connection_id: &str, permissions: &Permissions) -> Result<usize> {
        let mut assigned = 0;
        for (role, principal) in permissions.assignments() {
            if principal.id.is_none() {
                log::debug!(
                    "skipping {} principal without id on connection {}",
                    principal.principal_type,
                    connection_id
                );
                continue;
            }
            let response = self.add_connection_role(connection_id, principal, connection_role(role))?;
            if !response.is_success() {
                log::warn!(
                    "role assignment on connection {} returned {}",
                    connection_id,
                    response.status_code
                );
            }
            assigned += 1;
        }
        Ok(assigned)
    }

    /// Delete a connection by display name if it exists.
    pub fn remove_connection(&self, name: &str) -> Result<bool> {
        let path = connection_path(name);
        if !self.exists(&path)? {
            return Ok(false);
        }
        self.remove(&path)?;
        Ok(true)
    }

    pub fn bind_semantic_model(
        &self,
        workspace_id: &str,
        semantic_model_id: &str,
        binding: &ConnectionBinding,
    ) -> Result<ApiResponse> {
        let body = binding.request_body();
        self.api_post(
            &format!(
                "workspaces/{}/semanticModels/{}/bindConnection",
                workspace_id, semantic_model_id
            ),
            Some(&body),
        )
    }

    /// Make the logged-in principal the owner of a semantic model.
    pub fn take_over_semantic_model(&self, workspace_id: &str, semantic_model_id: &str) -> Result<ApiResponse> {
        let path = format!(
            "groups/{}/datasets/{}/Default.TakeOver",
            workspace_id, semantic_model_id
        );
        self.api(ApiRequest::post(&path).audience("powerbi"))
    }

    /// Connection string of a SQL-backed item, or `None` when the item or its
    /// server address cannot be read.
    pub fn connection_string(
        &self,
        workspace: &str,
        folder: Option<&str>,
        item_type: &ItemType,
        name: &str,
        credentials: &Credentials,
    ) -> Result<Option<String>> {
        let details = match self.item_details(workspace, folder, name, item_type, 0)? {
            Some(details) => details,
            None => return Ok(None),
        };
        let database = match item_type {
            ItemType::SqlDatabase => details.database_name().unwrap_or(name).to_string(),
            _ => name.to_string(),
        };
        Ok(details
            .sql_server()
            .map(|server| sql_connection_string(server, &database, credentials)))
    }
}
