//! Workspace item kinds and the metadata fetched for them.
//!
//! Item types arrive as strings (`"Lakehouse"`, `"SQLDatabase"`, ...) from the
//! definition files and the REST API. They are turned into [`ItemType`] once,
//! and SQL-backed items are described by a typed [`ItemDetails`] built from
//! the item's `properties` object.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Kind of a workspace item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ItemType {
    Lakehouse,
    SqlDatabase,
    Warehouse,
    Notebook,
    DataPipeline,
    SemanticModel,
    Report,
    /// Any type the provisioner passes through without special handling.
    Other(String),
}

impl ItemType {
    /// Platform spelling of the type, as used in CLI paths.
    pub fn as_str(&self) -> &str {
        match self {
            ItemType::Lakehouse => "Lakehouse",
            ItemType::SqlDatabase => "SQLDatabase",
            ItemType::Warehouse => "Warehouse",
            ItemType::Notebook => "Notebook",
            ItemType::DataPipeline => "DataPipeline",
            ItemType::SemanticModel => "SemanticModel",
            ItemType::Report => "Report",
            ItemType::Other(name) => name,
        }
    }

    /// Lakehouses, SQL databases and warehouses expose a SQL endpoint.
    pub fn is_sql_backed(&self) -> bool {
        matches!(
            self,
            ItemType::Lakehouse | ItemType::SqlDatabase | ItemType::Warehouse
        )
    }
}

impl From<&str> for ItemType {
    fn from(value: &str) -> Self {
        match value {
            "Lakehouse" => ItemType::Lakehouse,
            "SQLDatabase" => ItemType::SqlDatabase,
            "Warehouse" => ItemType::Warehouse,
            "Notebook" => ItemType::Notebook,
            "DataPipeline" => ItemType::DataPipeline,
            "SemanticModel" => ItemType::SemanticModel,
            "Report" => ItemType::Report,
            other => ItemType::Other(other.to_string()),
        }
    }
}

impl From<String> for ItemType {
    fn from(value: String) -> Self {
        ItemType::from(value.as_str())
    }
}

impl From<ItemType> for String {
    fn from(value: ItemType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provisioning state of a Lakehouse SQL endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisioningStatus {
    InProgress,
    Success,
    Failed,
    Other(String),
}

impl ProvisioningStatus {
    fn parse(value: &str) -> Self {
        match value {
            "InProgress" => ProvisioningStatus::InProgress,
            "Success" => ProvisioningStatus::Success,
            "Failed" => ProvisioningStatus::Failed,
            other => ProvisioningStatus::Other(other.to_string()),
        }
    }
}

/// SQL-relevant metadata of an item, decided by its type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemDetails {
    Lakehouse {
        connection_string: Option<String>,
        sql_endpoint_id: Option<String>,
        /// `None` while the endpoint has not been reported yet.
        provisioning_status: Option<ProvisioningStatus>,
    },
    SqlDatabase {
        connection_string: Option<String>,
        server_fqdn: Option<String>,
        database_name: Option<String>,
    },
    Warehouse {
        connection_string: Option<String>,
        database_name: Option<String>,
    },
    Other,
}

fn string_at(value: &JsonValue, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(JsonValue::as_str)
        .map(str::to_string)
}

impl ItemDetails {
    /// Interpret the JSON returned by `get <item> -q .`.
    pub fn from_item(item_type: &ItemType, item: &JsonValue) -> Self {
        match item_type {
            ItemType::Lakehouse => ItemDetails::Lakehouse {
                connection_string: string_at(item, "/properties/sqlEndpointProperties/connectionString"),
                sql_endpoint_id: string_at(item, "/properties/sqlEndpointProperties/id"),
                provisioning_status: string_at(
                    item,
                    "/properties/sqlEndpointProperties/provisioningStatus",
                )
                .map(|s| ProvisioningStatus::parse(&s)),
            },
            ItemType::SqlDatabase => ItemDetails::SqlDatabase {
                connection_string: string_at(item, "/properties/connectionString"),
                server_fqdn: string_at(item, "/properties/serverFqdn"),
                database_name: string_at(item, "/properties/databaseName"),
            },
            ItemType::Warehouse => ItemDetails::Warehouse {
                connection_string: string_at(item, "/properties/connectionString"),
                database_name: string_at(item, "/displayName"),
            },
            _ => ItemDetails::Other,
        }
    }

    pub fn connection_string(&self) -> Option<&str> {
        match self {
            ItemDetails::Lakehouse {
                connection_string, ..
            }
            | ItemDetails::SqlDatabase {
                connection_string, ..
            }
            | ItemDetails::Warehouse {
                connection_string, ..
            } => connection_string.as_deref(),
            ItemDetails::Other => None,
        }
    }

    pub fn database_name(&self) -> Option<&str> {
        match self {
            ItemDetails::SqlDatabase { database_name, .. }
            | ItemDetails::Warehouse { database_name, .. } => database_name.as_deref(),
            _ => None,
        }
    }

    pub fn server_fqdn(&self) -> Option<&str> {
        match self {
            ItemDetails::SqlDatabase { server_fqdn, .. } => server_fqdn.as_deref(),
            _ => None,
        }
    }

    pub fn sql_endpoint_id(&self) -> Option<&str> {
        match self {
            ItemDetails::Lakehouse {
                sql_endpoint_id, ..
            } => sql_endpoint_id.as_deref(),
            _ => None,
        }
    }

    /// Whether a Lakehouse SQL endpoint has left the provisioning state.
    /// Non-Lakehouse items are always settled.
    pub fn is_settled(&self) -> bool {
        match self {
            ItemDetails::Lakehouse {
                provisioning_status,
                ..
            } => !matches!(
                provisioning_status,
                None | Some(ProvisioningStatus::InProgress)
            ),
            _ => true,
        }
    }

    /// Server address used for a SQL connection to this item.
    pub fn sql_server(&self) -> Option<&str> {
        match self {
            ItemDetails::SqlDatabase { server_fqdn, .. } => server_fqdn.as_deref(),
            other => other.connection_string(),
        }
    }
}

/// An item as listed by `workspaces/<id>/items`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceItem {
    pub id: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub item_type: ItemType,
}

impl WorkspaceItem {
    /// `<displayName>.<type>`, the key items are matched by across environments.
    pub fn unique_name(&self) -> String {
        format!("{}.{}", self.display_name, self.item_type)
    }
}
