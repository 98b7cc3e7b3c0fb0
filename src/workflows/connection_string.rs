//! Connection string of a Warehouse or SQL database, written to a file for
//! downstream deployment steps.

use std::fs;
use std::path::Path;

use crate::config::EnvironmentDefinition;
use crate::error::{Error, Result};
use crate::items::ItemType;
use crate::transport::Transport;

use super::Session;

/// Write the connection string of `database` in `layer` to `output`.
///
/// The database must be declared in the layer as a Warehouse or SQL
/// database. Returns the written string.
pub fn generate<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    layer: &str,
    database: &str,
    output: &Path,
) -> Result<String> {
    let layer = definition
        .layer(layer)
        .ok_or_else(|| Error::config(format!("unknown layer '{}'", layer)))?;
    let (item_type, item) = layer
        .definition
        .items()
        .find(|(item_type, item)| {
            matches!(item_type, ItemType::Warehouse | ItemType::SqlDatabase)
                && item.item_name == database
        })
        .ok_or_else(|| Error::NotFound {
            kind: "Warehouse or SQL database".into(),
            name: format!("{} in layer {}", database, layer.name),
        })?;

    let workspace = definition.workspace_name(&layer.name, environment)?;
    session.out.info_inline(&format!(
        "Generating connection string for {} '{}'...",
        item_type, database
    ));
    let connection_string = session
        .client
        .connection_string(
            &workspace,
            item.item_folder.as_deref(),
            item_type,
            database,
            &session.context.credentials,
        )?
        .ok_or_else(|| Error::NotReady {
            resource: format!("{}.{}", database, item_type),
            message: format!("no server address reported in workspace {}", workspace),
        })?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, &connection_string)?;
    session.out.success("");
    log::info!("connection string for {} written to {}", database, output.display());
    Ok(connection_string)
}
