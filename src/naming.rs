//! Name templates and CLI resource paths.
//!
//! Workspace and connection names are configured as templates such as
//! `"Sales - {layer} [{environment}]"`. The CLI addresses resources with
//! dotted paths (`Sales - Store [dev].Workspace/Curated.Lakehouse`) in which a
//! literal `/` inside a name must be escaped.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{Error, Result};

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// A string with `{placeholder}` markers, rendered against named values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NameTemplate(String);

impl NameTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Names of all placeholders in order of appearance.
    pub fn placeholders(&self) -> Vec<&str> {
        placeholder_regex()
            .captures_iter(&self.0)
            .filter_map(|c| c.get(1).map(|m| m.as_str()))
            .collect()
    }

    /// Substitute every placeholder.
    ///
    /// Fails with [`Error::Template`] on the first placeholder without a value.
    pub fn render(&self, vars: &[(&str, &str)]) -> Result<String> {
        let mut rendered = String::with_capacity(self.0.len());
        let mut last = 0;
        for caps in placeholder_regex().captures_iter(&self.0) {
            let whole = caps.get(0).expect("capture 0 always present");
            let name = &caps[1];
            let value = vars
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
                .ok_or_else(|| Error::Template {
                    template: self.0.clone(),
                    variable: name.to_string(),
                })?;
            rendered.push_str(&self.0[last..whole.start()]);
            rendered.push_str(value);
            last = whole.end();
        }
        rendered.push_str(&self.0[last..]);
        Ok(rendered)
    }

    /// Render the environment workspace name for a layer.
    pub fn environment_workspace(&self, layer: &str, environment: &str) -> Result<String> {
        self.render(&[("layer", layer), ("environment", environment)])
    }
}

impl fmt::Display for NameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NameTemplate {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Escape a display name for use as a CLI path segment.
pub fn escape_segment(name: &str) -> String {
    name.replace('/', "\\/")
}

/// `<name>.Workspace`
pub fn workspace_path(workspace: &str) -> String {
    format!("{}.Workspace", escape_segment(workspace))
}

/// `<name>.Workspace/<folder>/<item>.<type>`; the folder is optional.
pub fn item_path(workspace: &str, folder: Option<&str>, item: &str, item_type: &str) -> String {
    match folder {
        Some(folder) if !folder.is_empty() => format!(
            "{}/{}/{}.{}",
            workspace_path(workspace),
            folder,
            item,
            item_type
        ),
        _ => format!("{}/{}.{}", workspace_path(workspace), item, item_type),
    }
}

/// `.connections/<name>.Connection`
pub fn connection_path(name: &str) -> String {
    format!(".connections/{}.Connection", name)
}

/// `<ws>.Workspace/.managedidentities/<ws>.ManagedIdentity`
pub fn managed_identity_path(workspace: &str) -> String {
    format!(
        "{}/.managedidentities/{}.ManagedIdentity",
        workspace_path(workspace),
        escape_segment(workspace)
    )
}

/// `<ws>.Workspace/.managedprivateendpoints/<name>.ManagedPrivateEndpoint`
pub fn private_endpoint_path(workspace: &str, endpoint: &str) -> String {
    format!(
        "{}/.managedprivateendpoints/{}.ManagedPrivateEndpoint",
        workspace_path(workspace),
        endpoint
    )
}

/// Whether `value` is a GUID in the 36-character hyphenated form, in
/// either case. Braced, URN and simple forms are rejected.
pub fn is_guid(value: &str) -> bool {
    value.len() == 36 && Uuid::try_parse(value).is_ok()
}
