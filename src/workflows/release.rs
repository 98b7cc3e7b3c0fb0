//! Publish item definitions from the solution repository to an environment.
//!
//! Each selected layer has a repository directory named after the lower-cased
//! layer. Every item lives in its own directory holding a `.platform` file:
//!
//! ```json
//! {"metadata": {"type": "Notebook", "displayName": "Load"},
//!  "config": {"logicalId": "1b0c2d3e-..."}}
//! ```
//!
//! Items are staged into a temporary directory with the parameter file's
//! `find_replace` entries for the environment applied, then imported with
//! `fab import`. After an item is published its logical id maps to the
//! deployed id, so references from later items and later layers resolve.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value as YamlValue;
use tempfile::TempDir;
use walkdir::WalkDir;

use crate::config::EnvironmentDefinition;
use crate::error::{Error, Result};
use crate::items::ItemType;
use crate::naming::item_path;
use crate::transport::Transport;

use super::binding::{bind_layer, load_bindings};
use super::Session;

pub const DEFAULT_ITEM_TYPES: &str = "Notebook,DataPipeline,Lakehouse,SQLDatabase,SemanticModel,Report";
pub const DEFAULT_LAYERS: &str = "core,ingest,store,prepare,orchestrate,model,insight,present";

/// Split a comma-separated list, dropping blanks.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ReleaseOptions {
    /// Lower-cased layer names in scope.
    pub layers: Vec<String>,
    /// Item types in scope, in publish order.
    pub item_types: Vec<ItemType>,
    pub repository: PathBuf,
    pub unpublish_orphans: bool,
}

impl ReleaseOptions {
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            layers: Vec::new(),
            item_types: Vec::new(),
            repository: repository.into(),
            unpublish_orphans: true,
        }
        .with_layers(DEFAULT_LAYERS)
        .with_item_types(DEFAULT_ITEM_TYPES)
    }

    pub fn with_layers(mut self, layers: &str) -> Self {
        self.layers = split_list(layers)
            .into_iter()
            .map(|layer| layer.to_lowercase())
            .collect();
        self
    }

    pub fn with_item_types(mut self, item_types: &str) -> Self {
        self.item_types = split_list(item_types)
            .iter()
            .map(|t| ItemType::from(t.as_str()))
            .collect();
        self
    }

    pub fn with_unpublish_orphans(mut self, unpublish: bool) -> Self {
        self.unpublish_orphans = unpublish;
        self
    }

    fn includes_layer(&self, layer: &str) -> bool {
        self.layers.contains(&layer.to_lowercase())
    }

    fn type_rank(&self, item_type: &ItemType) -> usize {
        self.item_types
            .iter()
            .position(|t| t == item_type)
            .unwrap_or(usize::MAX)
    }
}

/// An item definition found in the repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryItem {
    pub name: String,
    pub item_type: ItemType,
    pub logical_id: Option<String>,
    pub directory: PathBuf,
}

impl RepositoryItem {
    pub fn unique_name(&self) -> String {
        format!("{}.{}", self.name, self.item_type)
    }
}

#[derive(Deserialize)]
struct PlatformFile {
    metadata: PlatformMetadata,
    #[serde(default)]
    config: PlatformConfig,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformMetadata {
    #[serde(rename = "type")]
    item_type: String,
    display_name: String,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformConfig {
    #[serde(default)]
    logical_id: Option<String>,
}

/// Items below `directory` whose type is in scope, ordered by type then name.
///
/// A missing directory has no items. Unreadable `.platform` files are
/// skipped; the same `<Name>.<Type>` twice is an error.
pub fn discover_items(directory: &Path, options: &ReleaseOptions) -> Result<Vec<RepositoryItem>> {
    if !directory.is_dir() {
        return Ok(Vec::new());
    }
    let mut items: Vec<RepositoryItem> = Vec::new();
    for entry in WalkDir::new(directory).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || entry.file_name() != ".platform" {
            continue;
        }
        let platform: PlatformFile = match serde_json::from_str(&fs::read_to_string(entry.path())?) {
            Ok(platform) => platform,
            Err(e) => {
                log::warn!("skipping {}: {}", entry.path().display(), e);
                continue;
            }
        };
        let item_type = ItemType::from(platform.metadata.item_type.as_str());
        if !options.item_types.contains(&item_type) {
            continue;
        }
        let Some(item_directory) = entry.path().parent() else {
            continue;
        };
        let item = RepositoryItem {
            name: platform.metadata.display_name,
            item_type,
            logical_id: platform.config.logical_id.filter(|id| !id.is_empty()),
            directory: item_directory.to_path_buf(),
        };
        if items.iter().any(|known| known.unique_name() == item.unique_name()) {
            return Err(Error::config(format!(
                "{} is defined twice below {}",
                item.unique_name(),
                directory.display()
            )));
        }
        items.push(item);
    }
    items.sort_by(|a, b| {
        (options.type_rank(&a.item_type), &a.name).cmp(&(options.type_rank(&b.item_type), &b.name))
    });
    Ok(items)
}

#[derive(Debug, Default, Deserialize)]
struct ParameterDocument {
    #[serde(default)]
    find_replace: Vec<FindReplace>,
}

#[derive(Debug, Deserialize)]
struct FindReplace {
    find_value: String,
    #[serde(default)]
    replace_value: HashMap<String, YamlValue>,
}

/// `(find, replace)` pairs of the parameter file for one environment.
///
/// Entries without a value for `environment` are left out. A missing file
/// has no pairs.
pub fn environment_replacements(path: &Path, environment: &str) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let document: ParameterDocument = serde_yaml::from_str(&text)?;
    Ok(document
        .find_replace
        .into_iter()
        .filter(|entry| !entry.find_value.is_empty())
        .filter_map(|entry| {
            let value = match entry.replace_value.get(environment)? {
                YamlValue::String(s) => s.clone(),
                YamlValue::Number(n) => n.to_string(),
                YamlValue::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((entry.find_value, value))
        })
        .collect())
}

/// Resolve `$workspace.<name>` and `$items.<Type>.<Name>.id|sqlendpointid`.
///
/// Item references are looked up in `workspaces` in order. Plain values are
/// returned unchanged.
pub fn resolve_reference<T: Transport>(
    session: &Session<'_, T>,
    value: &str,
    workspaces: &[&str],
) -> Result<Option<String>> {
    let client = session.client;
    if let Some(workspace) = value.strip_prefix("$workspace.") {
        return client.workspace_id(workspace, 0);
    }
    let Some(reference) = value.strip_prefix("$items.") else {
        return Ok(Some(value.to_string()));
    };
    let (Some((item_type, rest)), Some((_, attribute))) =
        (reference.split_once('.'), reference.rsplit_once('.'))
    else {
        return Ok(None);
    };
    let Some((name, _)) = rest.rsplit_once('.') else {
        return Ok(None);
    };
    let item_type = ItemType::from(item_type);
    for workspace in workspaces {
        let found = match attribute {
            "id" => client.get_item_id(&item_path(workspace, None, name, item_type.as_str()), 0)?,
            "sqlendpointid" => client
                .item_details(workspace, None, name, &item_type, 0)?
                .and_then(|details| details.sql_endpoint_id().map(str::to_string)),
            _ => return Ok(None),
        };
        if found.is_some() {
            return Ok(found);
        }
    }
    Ok(None)
}

/// Copy an item directory into `staging`, applying replacements to every
/// UTF-8 file.
fn stage_item(item: &RepositoryItem, staging: &Path, replacements: &[(String, String)]) -> Result<PathBuf> {
    let target = staging.join(item.unique_name());
    for entry in WalkDir::new(&item.directory).into_iter().filter_map(|e| e.ok()) {
        let Ok(relative) = entry.path().strip_prefix(&item.directory) else {
            continue;
        };
        let destination = target.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&destination)?;
            continue;
        }
        let bytes = fs::read(entry.path())?;
        match String::from_utf8(bytes) {
            Ok(text) => {
                let replaced = replacements
                    .iter()
                    .fold(text, |acc, (find, replace)| acc.replace(find.as_str(), replace));
                fs::write(&destination, replaced)?;
            }
            Err(raw) => fs::write(&destination, raw.into_bytes())?,
        }
    }
    Ok(target)
}

/// What a release did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReleaseReport {
    /// `<Name>.<Type>` of every imported item.
    pub published: Vec<String>,
    pub failed: Vec<String>,
    pub unpublished: Vec<String>,
    /// Semantic models bound to SQL endpoints.
    pub bound: usize,
}

/// Release the repository to every selected layer of `environment`.
pub fn release<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
    options: &ReleaseOptions,
) -> Result<ReleaseReport> {
    let client = session.client;
    let out = session.out;
    let layout = &session.context.layout;
    let parameters = environment_replacements(&layout.parameter_template(), environment)?;
    let workspaces = definition
        .layers
        .iter()
        .map(|layer| definition.workspace_name(&layer.name, environment))
        .collect::<Result<Vec<_>>>()?;

    // (scope, value) -> replacement; item references are scoped to the
    // target workspace, workspace references are not.
    let mut resolved: HashMap<(String, String), String> = HashMap::new();
    let mut logical_ids: Vec<(String, String)> = Vec::new();
    let mut report = ReleaseReport::default();

    out.header(&format!("Releasing - {}", environment));
    for (layer, workspace) in definition.layers.iter().zip(&workspaces) {
        if !options.includes_layer(&layer.name) {
            log::debug!("layer {} not selected for release", layer.name);
            continue;
        }
        let workspace_id = match session.check(client.workspace_id(workspace, 0)) {
            Some(Some(id)) => id,
            Some(None) => {
                out.error(&format!(
                    "Workspace {} does not exist. Skipping release of layer {}.",
                    workspace, layer.name
                ));
                continue;
            }
            None => continue,
        };
        out.subheader(&format!("Running release to workspace {}!", workspace));

        let directory = options.repository.join(layer.name.to_lowercase());
        let items = match discover_items(&directory, options) {
            Ok(items) => items,
            Err(e) => {
                session.fail(&e);
                continue;
            }
        };

        let search_order: Vec<&str> = std::iter::once(workspace.as_str())
            .chain(workspaces.iter().map(String::as_str).filter(|w| w != workspace))
            .collect();
        let mut replacements = Vec::with_capacity(parameters.len() + logical_ids.len());
        for (find, value) in &parameters {
            let scope = if value.starts_with("$items.") {
                workspace.clone()
            } else {
                String::new()
            };
            let key = (scope, value.clone());
            if let Some(known) = resolved.get(&key) {
                replacements.push((find.clone(), known.clone()));
                continue;
            }
            match session.check(resolve_reference(session, value, &search_order)) {
                Some(Some(replacement)) => {
                    if replacement != *value {
                        resolved.insert(key, replacement.clone());
                    }
                    replacements.push((find.clone(), replacement));
                }
                Some(None) => out.warning(&format!(
                    "Could not resolve '{}' for {}. Skipping replacement.",
                    value, find
                )),
                None => {}
            }
        }

        if items.is_empty() {
            out.info(&format!("No items to publish in {}.", directory.display()));
        } else {
            publish_items(
                session,
                workspace,
                &items,
                &replacements,
                &mut logical_ids,
                &mut report,
            )?;
        }

        if options.unpublish_orphans {
            unpublish_orphans(session, workspace, &workspace_id, &items, options, &mut report);
        }

        match load_bindings(&layout.model_bindings(), &layer.name) {
            Ok(bindings) if bindings.is_empty() => {
                out.info("No semantic model bindings configured for this layer.")
            }
            Ok(bindings) => {
                report.bound +=
                    bind_layer(session, definition, environment, workspace, &workspace_id, &bindings)
            }
            Err(e) => out.warning(&format!(
                "Semantic model binding step encountered an error: {}",
                e
            )),
        }
    }
    log::info!(
        "release of {}: {} published, {} failed, {} unpublished, {} bound",
        environment,
        report.published.len(),
        report.failed.len(),
        report.unpublished.len(),
        report.bound
    );
    Ok(report)
}

fn publish_items<T: Transport>(
    session: &Session<'_, T>,
    workspace: &str,
    items: &[RepositoryItem],
    replacements: &[(String, String)],
    logical_ids: &mut Vec<(String, String)>,
    report: &mut ReleaseReport,
) -> Result<()> {
    let client = session.client;
    let out = session.out;
    let staging = TempDir::new()?;
    let bar = out.progress(items.len() as u64);
    let mut failures = 0;

    for item in items {
        let unique_name = item.unique_name();
        bar.set_message(unique_name.clone());
        let pairs: Vec<(String, String)> = replacements.iter().chain(logical_ids.iter()).cloned().collect();
        let published = stage_item(item, staging.path(), &pairs).and_then(|staged| {
            client.import_item(workspace, &item.name, item.item_type.as_str(), &staged)
        });
        match published {
            Ok(true) => {
                log::info!("published {} to {}", unique_name, workspace);
                report.published.push(unique_name);
                if let Some(logical_id) = &item.logical_id {
                    let path = item_path(workspace, None, &item.name, item.item_type.as_str());
                    match client.get_item_id(&path, 2) {
                        Ok(Some(id)) => logical_ids.push((logical_id.clone(), id)),
                        Ok(None) => log::warn!("no id for published item {}", path),
                        Err(e) => log::warn!("{}", e),
                    }
                }
            }
            Ok(false) => {
                bar.suspend(|| out.error(&format!("Publishing {} failed!", unique_name)));
                report.failed.push(unique_name);
                failures += 1;
            }
            Err(e) => {
                bar.suspend(|| session.fail(&e));
                report.failed.push(unique_name);
                failures += 1;
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();
    if failures == 0 {
        out.success(&format!("Published {} items.", items.len()));
    } else {
        out.warning(&format!("Published {} of {} items.", items.len() - failures, items.len()));
    }
    Ok(())
}

/// Remove deployed items of in-scope types that the repository no longer
/// has. SQL-backed items hold data and are never removed.
fn unpublish_orphans<T: Transport>(
    session: &Session<'_, T>,
    workspace: &str,
    workspace_id: &str,
    items: &[RepositoryItem],
    options: &ReleaseOptions,
    report: &mut ReleaseReport,
) {
    let client = session.client;
    let out = session.out;
    let Some(deployed) = session.check(client.list_workspace_items(workspace_id)) else {
        return;
    };
    let known: HashSet<String> = items.iter().map(RepositoryItem::unique_name).collect();
    let mut orphans: Vec<_> = deployed
        .into_iter()
        .filter(|item| options.item_types.contains(&item.item_type))
        .filter(|item| !item.item_type.is_sql_backed())
        .filter(|item| !known.contains(&item.unique_name()))
        .collect();
    // dependents first
    orphans.sort_by(|a, b| {
        options
            .type_rank(&b.item_type)
            .cmp(&options.type_rank(&a.item_type))
            .then_with(|| a.display_name.cmp(&b.display_name))
    });

    for orphan in orphans {
        out.info_inline(&format!(
            "Unpublishing {} '{}'...",
            orphan.item_type, orphan.display_name
        ));
        match client.remove_item(workspace, &orphan.display_name, orphan.item_type.as_str()) {
            Ok(true) => {
                out.success("");
                report.unpublished.push(orphan.unique_name());
            }
            Ok(false) => out.error("Failed!"),
            Err(e) => session.fail(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_environment, ResourceLayout};
    use crate::output::Printer;
    use crate::workflows::testing::{client, context, ok};
    use serde_json::json;
    use std::cell::RefCell;
    use std::rc::Rc;

    const STORE_ID: &str = "5d7e9f11-2233-4455-8899-aabbccddeeff";
    const INGEST_ID: &str = "6e8fa022-3344-4566-99aa-bbccddeeff00";
    const LAKEHOUSE_ID: &str = "7f90b133-4455-4677-aabb-ccddeeff0011";
    const LAKEHOUSE_LOGICAL_ID: &str = "00000000-0000-0000-0000-00000000a001";

    fn write_item(root: &Path, layer: &str, name: &str, item_type: &str, logical_id: &str, files: &[(&str, &str)]) {
        let directory = root.join(layer).join(format!("{}.{}", name, item_type));
        fs::create_dir_all(&directory).unwrap();
        fs::write(
            directory.join(".platform"),
            json!({
                "metadata": {"type": item_type, "displayName": name},
                "config": {"logicalId": logical_id}
            })
            .to_string(),
        )
        .unwrap();
        for (file, content) in files {
            fs::write(directory.join(file), content).unwrap();
        }
    }

    fn definition() -> EnvironmentDefinition {
        parse_environment(
            json!({
                "name": "Sales - {layer} [{environment}]",
                "layers": {"Store": {}, "Ingest": {}}
            }),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_discover_items_orders_by_type_then_name() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "ingest", "Zeta", "Notebook", "l1", &[]);
        write_item(temp.path(), "ingest", "Alpha", "Notebook", "l2", &[]);
        write_item(temp.path(), "ingest", "Copy", "DataPipeline", "l3", &[]);
        write_item(temp.path(), "ingest", "Sales", "SemanticModel", "l4", &[]);
        write_item(temp.path(), "ingest", "Events", "Eventstream", "l5", &[]);
        let options = ReleaseOptions::new(temp.path()).with_item_types("DataPipeline,Notebook,SemanticModel");

        let items = discover_items(&temp.path().join("ingest"), &options).unwrap();

        let names: Vec<_> = items.iter().map(RepositoryItem::unique_name).collect();
        assert_eq!(
            names,
            vec!["Copy.DataPipeline", "Alpha.Notebook", "Zeta.Notebook", "Sales.SemanticModel"]
        );
        assert_eq!(items[1].logical_id.as_deref(), Some("l2"));
        assert!(discover_items(&temp.path().join("missing"), &options)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_discover_items_rejects_duplicates() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "ingest", "Load", "Notebook", "l1", &[]);
        write_item(&temp.path().join("ingest"), "nested", "Load", "Notebook", "l2", &[]);
        let options = ReleaseOptions::new(temp.path());
        assert!(discover_items(&temp.path().join("ingest"), &options).is_err());
    }

    #[test]
    fn test_environment_replacements_select_environment() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("parameter.yml");
        fs::write(
            &path,
            "find_replace:\n  - find_value: dev-id\n    replace_value:\n      tst: tst-id\n      prd: prd-id\n  - find_value: only-prd\n    replace_value:\n      prd: x\n  - find_value: port\n    replace_value:\n      tst: 1433\n",
        )
        .unwrap();

        let pairs = environment_replacements(&path, "tst").unwrap();

        assert_eq!(
            pairs,
            vec![
                ("dev-id".to_string(), "tst-id".to_string()),
                ("port".to_string(), "1433".to_string()),
            ]
        );
        assert!(environment_replacements(&temp.path().join("none.yml"), "tst")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_options_normalize_lists() {
        let options = ReleaseOptions::new("repo").with_layers(" Ingest, STORE ,,");
        assert_eq!(options.layers, vec!["ingest", "store"]);
        assert!(options.includes_layer("Store"));
        assert!(!options.includes_layer("Model"));
        assert_eq!(ReleaseOptions::new("repo").item_types.len(), 6);
    }

    fn staged_path(command: &str) -> PathBuf {
        let start = command.find("-i '").map(|i| i + 4).unwrap();
        let end = command[start..].find('\'').unwrap() + start;
        PathBuf::from(&command[start..end])
    }

    #[test]
    fn test_release_publishes_replaces_and_unpublishes() {
        let temp = TempDir::new().unwrap();
        let repository = temp.path().join("solution");
        write_item(&repository, "store", "Curated", "Lakehouse", LAKEHOUSE_LOGICAL_ID, &[]);
        write_item(
            &repository,
            "ingest",
            "Load",
            "Notebook",
            "00000000-0000-0000-0000-00000000b001",
            &[(
                "notebook-content.py",
                &format!("lakehouse = '{}'\nworkspace = 'dev-store-id'\n", LAKEHOUSE_LOGICAL_ID),
            )],
        );
        let resources = temp.path().join("resources");
        fs::create_dir_all(resources.join("parameters")).unwrap();
        fs::write(
            resources.join("parameters/parameter.yml"),
            "find_replace:\n  - find_value: dev-store-id\n    replace_value:\n      tst: \"$workspace.Sales - Store [tst]\"\n",
        )
        .unwrap();

        let imported = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::clone(&imported);
        let client = client(move |command, _| {
            if command.starts_with("import") {
                if command.contains("Load.Notebook") {
                    let content = fs::read_to_string(staged_path(command).join("notebook-content.py")).unwrap();
                    recorder.borrow_mut().push(content);
                }
                return "* Imported".to_string();
            }
            if command.contains("Curated.Lakehouse' -q id") {
                return LAKEHOUSE_ID.to_string();
            }
            if command == "get 'Sales - Store [tst].Workspace' -q id -f" {
                return STORE_ID.to_string();
            }
            if command == "get 'Sales - Ingest [tst].Workspace' -q id -f" {
                return INGEST_ID.to_string();
            }
            if command.contains(&format!("workspaces/{}/items", STORE_ID)) {
                return ok(json!({"value": [
                    {"id": LAKEHOUSE_ID, "displayName": "Curated", "type": "Lakehouse"},
                    {"id": "x", "displayName": "Stale", "type": "Lakehouse"}
                ]}));
            }
            if command.contains(&format!("workspaces/{}/items", INGEST_ID)) {
                return ok(json!({"value": [
                    {"id": "a", "displayName": "Load", "type": "Notebook"},
                    {"id": "b", "displayName": "Old", "type": "Notebook"},
                    {"id": "c", "displayName": "Sales", "type": "Dashboard"}
                ]}));
            }
            String::new()
        });
        let out = Printer::capture();
        let mut ctx = context();
        ctx.layout = ResourceLayout::new(&resources);
        let session = Session::new(&client, &out, &ctx);

        let report = release(&session, &definition(), "tst", &ReleaseOptions::new(&repository)).unwrap();

        assert_eq!(report.published, vec!["Curated.Lakehouse", "Load.Notebook"]);
        assert!(report.failed.is_empty());
        assert_eq!(report.unpublished, vec!["Old.Notebook"]);
        assert_eq!(
            imported.borrow().as_slice(),
            [format!("lakehouse = '{}'\nworkspace = '{}'\n", LAKEHOUSE_ID, STORE_ID)]
        );
        assert_eq!(
            client.transport().calls_starting_with("rm"),
            vec!["rm 'Sales - Ingest [tst].Workspace/Old.Notebook' -f"]
        );
        let output = out.captured();
        assert!(output.contains("Releasing - tst"));
        assert!(output.contains("Running release to workspace Sales - Store [tst]!"));
        assert!(output.contains("No semantic model bindings configured for this layer."));
    }

    #[test]
    fn test_item_references_resolve_in_each_target_workspace() {
        const STORE_LH: &str = "11111111-1111-1111-1111-111111111111";
        const INGEST_LH: &str = "22222222-2222-2222-2222-222222222222";
        let temp = TempDir::new().unwrap();
        let repository = temp.path().join("solution");
        for layer in ["store", "ingest"] {
            write_item(&repository, layer, "Use", "Notebook", "", &[("notebook-content.py", "ref = 'DEVLH'\n")]);
        }
        let resources = temp.path().join("resources");
        fs::create_dir_all(resources.join("parameters")).unwrap();
        fs::write(
            resources.join("parameters/parameter.yml"),
            "find_replace:\n  - find_value: DEVLH\n    replace_value:\n      tst: \"$items.Lakehouse.Curated.id\"\n",
        )
        .unwrap();

        let imported = Rc::new(RefCell::new(Vec::new()));
        let recorder = Rc::clone(&imported);
        let client = client(move |command, _| {
            if command.starts_with("import") {
                let content = fs::read_to_string(staged_path(command).join("notebook-content.py")).unwrap();
                let workspace = if command.contains("Sales - Store") { "store" } else { "ingest" };
                recorder.borrow_mut().push((workspace, content));
                return "* Imported".to_string();
            }
            match command {
                "get 'Sales - Store [tst].Workspace/Curated.Lakehouse' -q id -f" => STORE_LH.to_string(),
                "get 'Sales - Ingest [tst].Workspace/Curated.Lakehouse' -q id -f" => INGEST_LH.to_string(),
                "get 'Sales - Store [tst].Workspace' -q id -f" => STORE_ID.to_string(),
                "get 'Sales - Ingest [tst].Workspace' -q id -f" => INGEST_ID.to_string(),
                _ => String::new(),
            }
        });
        let out = Printer::capture();
        let mut ctx = context();
        ctx.layout = ResourceLayout::new(&resources);
        let session = Session::new(&client, &out, &ctx);
        let options = ReleaseOptions::new(&repository).with_unpublish_orphans(false);

        let report = release(&session, &definition(), "tst", &options).unwrap();

        assert_eq!(report.published, vec!["Use.Notebook", "Use.Notebook"]);
        assert_eq!(
            imported.borrow().as_slice(),
            [
                ("store", format!("ref = '{}'\n", STORE_LH)),
                ("ingest", format!("ref = '{}'\n", INGEST_LH)),
            ]
        );
    }

    #[test]
    fn test_release_respects_layer_selection_and_unpublish_flag() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "ingest", "Load", "Notebook", "l1", &[]);
        let client = client(|command, _| {
            if command.starts_with("import") {
                return "x import: [InvalidDefinition] broken".to_string();
            }
            if command.contains("-q id") {
                return INGEST_ID.to_string();
            }
            String::new()
        });
        let out = Printer::capture();
        let ctx = context();
        let session = Session::new(&client, &out, &ctx);
        let options = ReleaseOptions::new(temp.path())
            .with_layers("ingest")
            .with_unpublish_orphans(false);

        let report = release(&session, &definition(), "tst", &options).unwrap();

        assert_eq!(report.failed, vec!["Load.Notebook"]);
        assert!(report.published.is_empty());
        assert!(client.transport().calls_containing("Sales - Store").is_empty());
        assert!(client.transport().calls_containing("/items").is_empty());
        assert!(out.captured().contains("Publishing Load.Notebook failed!"));
    }

    #[test]
    fn test_missing_workspace_skips_layer() {
        let temp = TempDir::new().unwrap();
        write_item(temp.path(), "store", "Curated", "Lakehouse", "l1", &[]);
        let client = client(|_, _| "x [NotFound] Workspace not found".to_string());
        let out = Printer::capture();
        let ctx = context();
        let session = Session::new(&client, &out, &ctx);

        let report = release(&session, &definition(), "tst", &ReleaseOptions::new(temp.path())).unwrap();

        assert_eq!(report, ReleaseReport::default());
        assert!(client.transport().calls_starting_with("import").is_empty());
        assert!(out
            .captured()
            .contains("Workspace Sales - Store [tst] does not exist. Skipping release of layer Store."));
    }
}
