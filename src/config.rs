//! # Environment and Feature Definitions
//!
//! This module defines the typed records behind the JSON definition files and
//! the logic for loading them.
//!
//! ## Files
//!
//! All definitions live under one resources directory (see [`ResourceLayout`]):
//!
//! - `environments/infrastructure.json`: the base environment definition.
//! - `environments/infrastructure.<env>.json`: an optional overlay, deep-merged
//!   on top of the base with [`crate::merge`].
//! - `environments/feature.json`: the feature-branch definition.
//!
//! ## Key Components
//!
//! - **`EnvironmentDefinition`**: solution name template, ordered layers, and
//!   generic settings (connections, Git settings, permissions, capacity).
//! - **`LayerDefinition`**: items grouped by type, permissions, Git directory,
//!   capacity override and feature flags for one medallion layer.
//! - **`FeatureDefinition`**: the feature-branch variant of the above.
//!
//! Layers and item groups keep their declaration order; provisioning walks
//! them in that order.

use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{Error, Result};
use crate::items::ItemType;
use crate::merge::{merge_all, ListMerge};
use crate::naming::NameTemplate;

/// Locations of the definition files below a resources directory.
#[derive(Debug, Clone)]
pub struct ResourceLayout {
    root: PathBuf,
}

impl ResourceLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn base_environment(&self) -> PathBuf {
        self.root.join("environments").join("infrastructure.json")
    }

    pub fn environment_overlay(&self, environment: &str) -> PathBuf {
        self.root
            .join("environments")
            .join(format!("infrastructure.{}.json", environment))
    }

    pub fn feature(&self) -> PathBuf {
        self.root.join("environments").join("feature.json")
    }

    pub fn parameter_template(&self) -> PathBuf {
        self.root.join("parameters").join("parameter.yml")
    }

    pub fn model_bindings(&self) -> PathBuf {
        self.root
            .join("parameters")
            .join("sqlendpoint_model_binding.yml")
    }
}

/// A principal that receives a role on a workspace or connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Object id of the user, group or service principal.
    #[serde(default)]
    pub id: Option<String>,
    /// `User`, `Group`, `ServicePrincipal` or `WorkspaceIdentity`.
    #[serde(rename = "type")]
    pub principal_type: String,
    /// For workspace identities: template of the workspace owning the identity.
    #[serde(default)]
    pub name: Option<NameTemplate>,
}

impl Principal {
    pub fn is_workspace_identity(&self) -> bool {
        self.principal_type.eq_ignore_ascii_case("workspaceidentity")
    }

    fn same_as(&self, other: &Principal) -> bool {
        match (&self.id, &other.id) {
            (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
            (None, None) => {
                self.principal_type.eq_ignore_ascii_case(&other.principal_type) && self.name == other.name
            }
            _ => false,
        }
    }
}

/// Role name to principals, e.g. `{"Admin": [...], "Member": [...]}`, in
/// declaration order. Roles compare case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Permissions(Vec<(String, Vec<Principal>)>);

impl Permissions {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|(_, principals)| principals.is_empty())
    }

    /// Every (role, principal) pair.
    pub fn assignments(&self) -> impl Iterator<Item = (&str, &Principal)> {
        self.0
            .iter()
            .flat_map(|(role, principals)| principals.iter().map(move |p| (role.as_str(), p)))
    }

    /// Layer permissions first, then `other`'s. A principal is granted a role
    /// once, identified by its object id, or by type and name when it has none.
    pub fn merged_with(&self, other: &Permissions) -> Permissions {
        let mut merged = Permissions::default();
        for (role, principals) in self.0.iter().chain(&other.0) {
            merged.grant(role, principals);
        }
        merged
    }

    fn grant(&mut self, role: &str, principals: &[Principal]) {
        let index = match self.0.iter().position(|(r, _)| r.eq_ignore_ascii_case(role)) {
            Some(index) => index,
            None => {
                self.0.push((role.to_string(), Vec::new()));
                self.0.len() - 1
            }
        };
        let entry = &mut self.0[index].1;
        for principal in principals {
            if !entry.iter().any(|p| p.same_as(principal)) {
                entry.push(principal.clone());
            }
        }
    }
}

impl FromIterator<(String, Vec<Principal>)> for Permissions {
    fn from_iter<T: IntoIterator<Item = (String, Vec<Principal>)>>(iter: T) -> Self {
        let mut permissions = Permissions::default();
        for (role, principals) in iter {
            permissions.grant(&role, &principals);
        }
        permissions
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct PermissionsVisitor;

        impl<'de> Visitor<'de> for PermissionsVisitor {
            type Value = Permissions;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of role name to principal list")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut permissions = Permissions::default();
                while let Some((role, principals)) = map.next_entry::<String, Vec<Principal>>()? {
                    permissions.grant(&role, &principals);
                }
                Ok(permissions)
            }
        }

        deserializer.deserialize_map(PermissionsVisitor)
    }
}

/// Connection role granted for a workspace permission role.
pub fn connection_role(workspace_role: &str) -> &'static str {
    if workspace_role == "Admin" {
        "Owner"
    } else {
        "User"
    }
}

/// One item to provision in a layer workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSpec {
    pub item_name: String,
    #[serde(default)]
    pub item_folder: Option<String>,
    /// Template for a SQL connection to create for this item.
    #[serde(default)]
    pub connection_name: Option<NameTemplate>,
    #[serde(default)]
    pub skip_item_creation: bool,
}

/// Items of one type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemGroup {
    pub item_type: ItemType,
    pub items: Vec<ItemSpec>,
}

/// A managed private endpoint requested for a workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateEndpointSpec {
    pub name: String,
    /// Azure resource id of the private link target.
    pub id: String,
    #[serde(default)]
    pub auto_approve: bool,
}

/// Definition of one medallion layer.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LayerDefinition {
    #[serde(default, deserialize_with = "deserialize_item_groups")]
    pub items: Vec<ItemGroup>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default, rename = "git_directoryName")]
    pub git_directory_name: Option<String>,
    #[serde(default)]
    pub capacity_name: Option<String>,
    /// Feature workspaces for this layer are created for every branch.
    #[serde(default)]
    pub always_provision: bool,
    #[serde(default)]
    pub git_synchronize_on_commit: Option<bool>,
    #[serde(default)]
    pub git_disconnect_after_initialize: bool,
    #[serde(default)]
    pub create_workspace_identity: bool,
    #[serde(default)]
    pub private_endpoints: Vec<PrivateEndpointSpec>,
    #[serde(default)]
    pub spark_settings: Option<JsonValue>,
}

impl LayerDefinition {
    /// Whether commits should be pulled into the workspace, given the
    /// caller's default for an unset flag.
    pub fn synchronizes_on_commit(&self, default: bool) -> bool {
        self.git_synchronize_on_commit.unwrap_or(default) && !self.git_disconnect_after_initialize
    }

    /// Every item with its type, in declaration order.
    pub fn items(&self) -> impl Iterator<Item = (&ItemType, &ItemSpec)> {
        self.items
            .iter()
            .flat_map(|group| group.items.iter().map(move |item| (&group.item_type, item)))
    }

    /// Items that carry a SQL connection template.
    pub fn connected_items(&self) -> impl Iterator<Item = (&ItemType, &ItemSpec, &NameTemplate)> {
        self.items().filter_map(|(item_type, item)| {
            match (&item.connection_name, item_type.is_sql_backed()) {
                (Some(template), true) => Some((item_type, item, template)),
                _ => None,
            }
        })
    }
}

/// A named layer.
#[derive(Debug, Clone)]
pub struct Layer {
    pub name: String,
    pub definition: LayerDefinition,
}

/// A cross-layer platform connection (`generic.fabric_connections`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FabricConnectionSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub connection_type: String,
    #[serde(default = "default_auth_type")]
    pub auth_type: String,
}

fn default_auth_type() -> String {
    "ServicePrincipal".to_string()
}

/// Source-control provider of the Git settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitProvider {
    GitHub,
    AzureDevOps,
}

/// `gitProviderDetails` of the Git connect request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitProviderDetails {
    pub git_provider_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_name: Option<String>,
    pub repository_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory_name: Option<String>,
}

/// `myGitCredentials` of the Git connect request.
///
/// `connection_name` is resolved to a `connectionId` before the request is
/// sent and is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitCredentials {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<String>,
    #[serde(default, rename = "connection_name", skip_serializing)]
    pub connection_name: Option<NameTemplate>,
}

/// Git integration settings shared by all layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitSettings {
    pub git_provider_details: GitProviderDetails,
    pub my_git_credentials: GitCredentials,
}

impl GitSettings {
    pub fn provider(&self) -> GitProvider {
        if self
            .git_provider_details
            .git_provider_type
            .eq_ignore_ascii_case("github")
        {
            GitProvider::GitHub
        } else {
            GitProvider::AzureDevOps
        }
    }

    /// Name or GUID identifying the source-control connection.
    pub fn connection_identifier(&self) -> Option<String> {
        self.my_git_credentials
            .connection_name
            .as_ref()
            .map(|n| n.as_str().to_string())
            .or_else(|| self.my_git_credentials.connection_id.clone())
    }

    /// Web URL of the configured repository.
    pub fn repository_url(&self) -> Result<Url> {
        let details = &self.git_provider_details;
        let (base, segments): (&str, Vec<&str>) = match self.provider() {
            GitProvider::GitHub => (
                "https://github.com/",
                vec![
                    required(&details.owner_name, "gitProviderDetails.ownerName")?,
                    details.repository_name.as_str(),
                ],
            ),
            GitProvider::AzureDevOps => (
                "https://dev.azure.com/",
                vec![
                    required(&details.organization_name, "gitProviderDetails.organizationName")?,
                    required(&details.project_name, "gitProviderDetails.projectName")?,
                    "_git",
                    details.repository_name.as_str(),
                ],
            ),
        };
        let mut url = Url::parse(base)?;
        url.path_segments_mut()
            .map_err(|_| Error::config("repository base URL cannot hold a path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The request body for a workspace: connection id resolved, branch and
    /// directory applied.
    pub fn connect_request(
        &self,
        connection_id: &str,
        branch_name: Option<&str>,
        directory_name: Option<&str>,
    ) -> GitSettings {
        let mut settings = self.clone();
        settings.my_git_credentials.connection_name = None;
        settings.my_git_credentials.connection_id = Some(connection_id.to_string());
        if let Some(branch) = branch_name {
            settings.git_provider_details.branch_name = Some(branch.to_string());
        }
        if let Some(directory) = directory_name {
            settings.git_provider_details.directory_name = Some(directory.to_string());
        }
        settings
    }
}

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str> {
    value
        .as_deref()
        .ok_or_else(|| Error::config(format!("git_settings is missing {}", field)))
}

/// The `generic` section of an environment definition.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GenericSettings {
    #[serde(default)]
    pub capacity_name: Option<String>,
    /// Only the primary environment owns the shared platform connections.
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub fabric_connections: Vec<FabricConnectionSpec>,
    #[serde(default)]
    pub git_settings: Option<GitSettings>,
    #[serde(default)]
    pub permissions: Permissions,
}

/// The effective definition of one environment.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentDefinition {
    /// Workspace name template with `{layer}` and `{environment}`.
    pub name: NameTemplate,
    #[serde(deserialize_with = "deserialize_layers")]
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub generic: GenericSettings,
}

impl EnvironmentDefinition {
    /// Case-insensitive layer lookup.
    pub fn layer(&self, name: &str) -> Option<&Layer> {
        self.layers
            .iter()
            .find(|layer| layer.name.eq_ignore_ascii_case(name))
    }

    pub fn workspace_name(&self, layer: &str, environment: &str) -> Result<String> {
        self.name.environment_workspace(layer, environment)
    }

    /// Capacity for a layer, falling back to the generic capacity.
    pub fn capacity_for<'a>(&'a self, layer: &'a LayerDefinition) -> Option<&'a str> {
        layer
            .capacity_name
            .as_deref()
            .or(self.generic.capacity_name.as_deref())
    }

    /// Connection template of a Lakehouse declared in `layer`.
    pub fn lakehouse_connection_template(
        &self,
        layer: &str,
        lakehouse: &str,
    ) -> Option<&NameTemplate> {
        self.layer(layer)?
            .definition
            .items()
            .find(|(item_type, item)| {
                **item_type == ItemType::Lakehouse && item.item_name.eq_ignore_ascii_case(lakehouse)
            })
            .and_then(|(_, item)| item.connection_name.as_ref())
    }

    fn validate(&self, source: &str) -> Result<()> {
        if self.name.as_str().trim().is_empty() {
            return Err(Error::config_with_hint(
                format!("{}: 'name' is empty", source),
                "Set a workspace name template such as \"Sales - {layer} [{environment}]\"",
            ));
        }
        if self.layers.is_empty() {
            return Err(Error::config(format!("{}: no layers defined", source)));
        }
        for placeholder in self.name.placeholders() {
            if placeholder != "layer" && placeholder != "environment" {
                return Err(Error::config_with_hint(
                    format!("{}: unknown placeholder {{{}}} in 'name'", source, placeholder),
                    "Only {layer} and {environment} are available",
                ));
            }
        }
        validate_layers(&self.layers, source)
    }
}

/// The feature-branch definition (`feature.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureDefinition {
    /// Workspace name template with `{feature_name}` and `{layer_name}`.
    pub feature_name: NameTemplate,
    #[serde(default)]
    pub capacity_name: Option<String>,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub git_settings: Option<GitSettings>,
    #[serde(deserialize_with = "deserialize_layers")]
    pub layers: Vec<Layer>,
}

impl FeatureDefinition {
    pub fn workspace_name(&self, feature: &str, layer: &str) -> Result<String> {
        self.feature_name
            .render(&[("feature_name", feature), ("layer_name", layer)])
    }

    fn validate(&self, source: &str) -> Result<()> {
        if self.feature_name.as_str().trim().is_empty() {
            return Err(Error::config(format!("{}: 'feature_name' is empty", source)));
        }
        validate_layers(&self.layers, source)
    }
}

fn validate_layers(layers: &[Layer], source: &str) -> Result<()> {
    for layer in layers {
        for (item_type, item) in layer.definition.items() {
            if item.item_name.trim().is_empty() {
                return Err(Error::config(format!(
                    "{}: layer '{}' has a {} without item_name",
                    source, layer.name, item_type
                )));
            }
        }
        for endpoint in &layer.definition.private_endpoints {
            if endpoint.id.trim().is_empty() {
                return Err(Error::config(format!(
                    "{}: private endpoint '{}' in layer '{}' has no resource id",
                    source, endpoint.name, layer.name
                )));
            }
        }
    }
    Ok(())
}

/// Read a JSON file; `Ok(None)` when it does not exist.
fn read_json(path: &Path) -> Result<Option<JsonValue>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value = serde_json::from_str(&content).map_err(|e| {
        Error::config(format!("{} is not valid JSON: {}", path.display(), e))
    })?;
    Ok(Some(value))
}

/// Load `base` and deep-merge `overlays` on top of it.
///
/// A missing base file is an error; a missing overlay counts as empty.
pub fn load_merged(base: &Path, overlays: &[PathBuf], lists: ListMerge) -> Result<JsonValue> {
    let base_value = read_json(base)?.ok_or_else(|| {
        Error::config_with_hint(
            format!("environment definition not found: {}", base.display()),
            "Pass --resources pointing at the directory holding environments/",
        )
    })?;
    let mut loaded = Vec::with_capacity(overlays.len());
    for overlay in overlays {
        match read_json(overlay)? {
            Some(value) => loaded.push(value),
            None => log::debug!("no overlay at {}, using base only", overlay.display()),
        }
    }
    Ok(merge_all(&base_value, loaded.iter(), lists))
}

/// Turn a merged JSON document into a validated environment definition.
pub fn parse_environment(value: JsonValue, source: &str) -> Result<EnvironmentDefinition> {
    let definition: EnvironmentDefinition = serde_json::from_value(value)
        .map_err(|e| Error::config(format!("{}: {}", source, e)))?;
    definition.validate(source)?;
    Ok(definition)
}

/// Load the effective definition of `environment`.
pub fn load_environment(layout: &ResourceLayout, environment: &str) -> Result<EnvironmentDefinition> {
    let base = layout.base_environment();
    let overlay = layout.environment_overlay(environment);
    let merged = load_merged(&base, &[overlay], ListMerge::Replace)?;
    parse_environment(merged, &format!("{} + {}", base.display(), environment))
}

/// Load the feature-branch definition.
pub fn load_feature(path: &Path) -> Result<FeatureDefinition> {
    let value = read_json(path)?.ok_or_else(|| {
        Error::config(format!("feature definition not found: {}", path.display()))
    })?;
    let source = path.display().to_string();
    let definition: FeatureDefinition = serde_json::from_value(value)
        .map_err(|e| Error::config(format!("{}: {}", source, e)))?;
    definition.validate(&source)?;
    Ok(definition)
}

fn deserialize_layers<'de, D>(deserializer: D) -> std::result::Result<Vec<Layer>, D::Error>
where
    D: Deserializer<'de>,
{
    struct LayersVisitor;

    impl<'de> Visitor<'de> for LayersVisitor {
        type Value = Vec<Layer>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of layer name to layer definition")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut layers = Vec::new();
            while let Some((name, definition)) = map.next_entry::<String, LayerDefinition>()? {
                if layers.iter().any(|l: &Layer| l.name.eq_ignore_ascii_case(&name)) {
                    return Err(de::Error::custom(format!("duplicate layer '{}'", name)));
                }
                layers.push(Layer { name, definition });
            }
            Ok(layers)
        }
    }

    deserializer.deserialize_map(LayersVisitor)
}

fn deserialize_item_groups<'de, D>(deserializer: D) -> std::result::Result<Vec<ItemGroup>, D::Error>
where
    D: Deserializer<'de>,
{
    struct GroupsVisitor;

    impl<'de> Visitor<'de> for GroupsVisitor {
        type Value = Vec<ItemGroup>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of item type to item list")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
            let mut groups = Vec::new();
            while let Some((item_type, items)) = map.next_entry::<String, Vec<ItemSpec>>()? {
                groups.push(ItemGroup {
                    item_type: ItemType::from(item_type.as_str()),
                    items,
                });
            }
            Ok(groups)
        }
    }

    deserializer.deserialize_map(GroupsVisitor)
}
