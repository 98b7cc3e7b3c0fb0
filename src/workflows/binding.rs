//! Semantic models bound to Lakehouse SQL endpoints.
//!
//! Bindings are declared per model layer in
//! `parameters/sqlendpoint_model_binding.yml`:
//!
//! ```yaml
//! Model:
//!   - lakehouse_name: Curated
//!     lakehouse_ws_layer: Store
//!     semantic_models: [Sales, Finance]
//! ```
//!
//! The Lakehouse's SQL connection (created by environment setup from its
//! `connection_name`) supplies the connection id, endpoint and database.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value as YamlValue;

use crate::config::EnvironmentDefinition;
use crate::connections::ConnectionBinding;
use crate::error::{Error, Result};
use crate::naming::item_path;
use crate::transport::Transport;

use super::Session;

/// Models in one layer bound to one Lakehouse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelBinding {
    pub lakehouse_name: String,
    /// Layer whose workspace holds the Lakehouse.
    pub lakehouse_ws_layer: String,
    #[serde(default)]
    pub semantic_models: Vec<String>,
}

/// Bindings declared for `layer`; empty when the file or the layer is absent.
pub fn load_bindings(path: &Path, layer: &str) -> Result<Vec<ModelBinding>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let document: YamlValue = serde_yaml::from_str(&fs::read_to_string(path)?)?;
    let Some(mapping) = document.as_mapping() else {
        if document.is_null() {
            return Ok(Vec::new());
        }
        return Err(Error::config(format!(
            "{} must map layer names to binding lists",
            path.display()
        )));
    };
    for (key, value) in mapping {
        if key.as_str().is_some_and(|k| k.eq_ignore_ascii_case(layer)) {
            return serde_yaml::from_value(value.clone()).map_err(|e| {
                Error::config(format!("{}: layer '{}': {}", path.display(), layer, e))
            });
        }
    }
    Ok(Vec::new())
}

/// Connection details of the Lakehouse a binding points at.
///
/// `None` when the Lakehouse has no connection template or the connection is
/// missing or incomplete.
pub fn resolve_connection<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    lakehouse_layer: &str,
    lakehouse_name: &str,
) -> Result<Option<ConnectionBinding>> {
    let Some(layer) = definition.layer(lakehouse_layer) else {
        return Ok(None);
    };
    let Some(template) = definition.lakehouse_connection_template(&layer.name, lakehouse_name) else {
        return Ok(None);
    };
    let name = template.environment_workspace(&layer.name, environment)?;
    Ok(session
        .client
        .get_connection(&name)?
        .and_then(|connection| ConnectionBinding::from_connection(&connection)))
}

/// Bind every configured model of a released layer. Returns how many were
/// bound.
pub fn bind_layer<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    workspace: &str,
    workspace_id: &str,
    bindings: &[ModelBinding],
) -> usize {
    let client = session.client;
    let out = session.out;
    let mut bound = 0;

    out.subheader("Binding semantic models to SQL endpoints");
    for binding in bindings {
        let connection = session
            .check(resolve_connection(
                session,
                definition,
                environment,
                &binding.lakehouse_ws_layer,
                &binding.lakehouse_name,
            ))
            .flatten();
        let Some(connection) = connection else {
            out.warning(&format!(
                "Connection information for {} is incomplete. Skipping all models for this lakehouse.",
                binding.lakehouse_name
            ));
            continue;
        };

        for model in &binding.semantic_models {
            let path = item_path(workspace, None, model, "SemanticModel");
            let Some(Some(model_id)) = session.check(client.get_item_id(&path, 0)) else {
                out.warning(&format!(
                    "Semantic model '{}' not found in workspace {}. Skip binding.",
                    model, workspace
                ));
                continue;
            };
            match client.bind_semantic_model(workspace_id, &model_id, &connection) {
                Ok(response) if response.status_code == 200 => {
                    bound += 1;
                    out.success(&format!(
                        "Binding '{}' to SQL endpoint for lakehouse '{}' successfully done.",
                        model, binding.lakehouse_name
                    ));
                }
                Ok(response) => out.warning(&format!(
                    "Binding call returned non-success (status code {}) for '{}': {}",
                    response.status_code, model, response.text
                )),
                Err(e) => session.fail(&e),
            }
        }
    }
    bound
}

/// One model to bind outside a release.
#[derive(Debug, Clone)]
pub struct SingleBinding {
    pub environment: String,
    pub model_layer: String,
    pub semantic_model: String,
    pub lakehouse_layer: String,
    pub lakehouse_name: String,
}

/// Take over a semantic model and bind it to a Lakehouse SQL endpoint.
///
/// Returns whether the bind call succeeded. Unknown layers, a missing
/// workspace or model and an unusable connection are errors.
pub fn bind_single<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    request: &SingleBinding,
) -> Result<bool> {
    let client = session.client;
    let out = session.out;
    let model_layer = definition
        .layer(&request.model_layer)
        .ok_or_else(|| Error::config(format!("unknown layer '{}'", request.model_layer)))?;
    if definition.layer(&request.lakehouse_layer).is_none() {
        return Err(Error::config(format!(
            "unknown layer '{}'",
            request.lakehouse_layer
        )));
    }

    let workspace = definition.workspace_name(&model_layer.name, &request.environment)?;
    let workspace_id = client
        .workspace_id(&workspace, 0)?
        .ok_or_else(|| Error::NotFound {
            kind: "Workspace".into(),
            name: workspace.clone(),
        })?;
    let model_path = item_path(&workspace, None, &request.semantic_model, "SemanticModel");
    let model_id = client
        .get_item_id(&model_path, 0)?
        .ok_or_else(|| Error::NotFound {
            kind: "SemanticModel".into(),
            name: request.semantic_model.clone(),
        })?;
    let connection = resolve_connection(
        session,
        definition,
        &request.environment,
        &request.lakehouse_layer,
        &request.lakehouse_name,
    )?
    .ok_or_else(|| Error::NotFound {
        kind: "Lakehouse connection".into(),
        name: request.lakehouse_name.clone(),
    })?;

    out.header(&format!("Binding semantic model '{}'", request.semantic_model));
    out.info_inline("Taking over semantic model...");
    let takeover = client.take_over_semantic_model(&workspace_id, &model_id)?;
    if takeover.is_success() {
        out.success("");
    } else {
        out.warning(&format!("Takeover returned status {}", takeover.status_code));
    }

    out.info_inline(&format!(
        "Binding to SQL endpoint of lakehouse '{}'...",
        request.lakehouse_name
    ));
    let response = client.bind_semantic_model(&workspace_id, &model_id, &connection)?;
    if response.status_code == 200 {
        out.success("");
        Ok(true)
    } else {
        out.warning(&format!(
            "Binding call returned non-success (status code {})",
            response.status_code
        ));
        Ok(false)
    }
}
