//! # Deployment Parameter Document
//!
//! Deployments move items between environments by textual replacement: every
//! id, connection string or connection id that points at the source
//! environment is swapped for its counterpart in the target environment. This
//! module builds the `find_replace` list of that document.
//!
//! ## Flow
//!
//! 1. **Scan** each environment: the workspace of every layer, all items in
//!    it, SQL metadata of SQL-backed items, and the ids of item connections.
//! 2. **Pair** source values with target values. Layers are matched by name
//!    and items by `<Name>.<Type>`. In dynamic mode the targets are not
//!    scanned; they become `$workspace.` and `$items.` references resolved at
//!    deployment time.
//! 3. **Render** the template: its own entries are kept, generated entries
//!    are appended unless their `find_value` is already listed.
//! 4. **Distribute** the result to the template path and to every solution
//!    folder.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value as YamlValue};
use walkdir::WalkDir;

use crate::config::{load_environment, EnvironmentDefinition};
use crate::error::{Error, Result};
use crate::items::{ItemDetails, ItemType};
use crate::naming::is_guid;
use crate::transport::Transport;

use super::Session;

/// An item found in a scanned workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedItem {
    pub id: String,
    pub name: String,
    pub item_type: ItemType,
    pub details: Option<ItemDetails>,
    pub connection_id: Option<String>,
}

impl ScannedItem {
    pub fn unique_name(&self) -> String {
        format!("{}.{}", self.name, self.item_type)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedLayer {
    pub name: String,
    pub workspace_name: String,
    pub workspace_id: String,
    pub items: Vec<ScannedItem>,
}

impl ScannedLayer {
    fn item(&self, unique_name: &str) -> Option<&ScannedItem> {
        self.items.iter().find(|i| i.unique_name() == unique_name)
    }
}

/// Everything scanned in one environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentScan {
    pub environment: String,
    pub layers: Vec<ScannedLayer>,
}

impl EnvironmentScan {
    pub fn layer(&self, name: &str) -> Option<&ScannedLayer> {
        self.layers.iter().find(|l| l.name.eq_ignore_ascii_case(name))
    }
}

/// One generated `find_replace` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub find_value: String,
    /// Target environment to replacement, in target order.
    pub replace_value: Vec<(String, String)>,
}

/// Where a generated document ended up.
#[derive(Debug, Clone)]
pub struct ParameterFile {
    pub document: String,
    pub template_path: PathBuf,
    pub copies: Vec<PathBuf>,
}

/// Scan the workspaces of one environment.
///
/// Layers whose workspace id cannot be resolved are left out.
pub fn scan_environment<T: Transport>(
    session: &Session<'_, T>,
    definition: &EnvironmentDefinition,
    environment: &str,
) -> Result<EnvironmentScan> {
    let client = session.client;
    let mut layers = Vec::new();

    for layer in &definition.layers {
        let workspace = definition.workspace_name(&layer.name, environment)?;
        session
            .out
            .detail(&format!("Scanning workspace: {}...", workspace));
        let workspace_id = match session.check(client.workspace_id(&workspace, 0)) {
            Some(Some(id)) if is_guid(&id) => id,
            Some(_) => {
                session.out.warning("workspace not found");
                continue;
            }
            None => continue,
        };
        let listed = match session.check(client.list_workspace_items(&workspace_id)) {
            Some(items) => items,
            None => continue,
        };

        let mut items = Vec::with_capacity(listed.len());
        for item in listed {
            let details = if item.item_type.is_sql_backed() {
                session
                    .check(client.item_details(&workspace, None, &item.display_name, &item.item_type, 2))
                    .flatten()
            } else {
                None
            };
            items.push(ScannedItem {
                id: item.id,
                name: item.display_name,
                item_type: item.item_type,
                details,
                connection_id: None,
            });
        }

        for (item_type, spec, template) in layer.definition.connected_items() {
            let name = template.environment_workspace(&layer.name, environment)?;
            if !matches!(session.check(client.connection_exists(&name)), Some(true)) {
                continue;
            }
            let unique = format!("{}.{}", spec.item_name, item_type);
            let connection_id = session.check(client.connection_id(&name)).flatten();
            if let Some(item) = items.iter_mut().find(|i| i.unique_name() == unique) {
                item.connection_id = connection_id;
            }
        }

        session.out.success("");
        layers.push(ScannedLayer {
            name: layer.name.clone(),
            workspace_name: workspace,
            workspace_id,
            items,
        });
    }

    Ok(EnvironmentScan {
        environment: environment.to_string(),
        layers,
    })
}

/// The values of an item that differ between environments.
fn item_values(item: &ScannedItem) -> [(&'static str, Option<&str>); 4] {
    let details = item.details.as_ref();
    [
        ("id", Some(item.id.as_str())),
        ("sqlendpointid", details.and_then(ItemDetails::sql_endpoint_id)),
        ("connectionstring", details.and_then(ItemDetails::connection_string)),
        ("connectionid", item.connection_id.as_deref()),
    ]
}

fn push_replacement(
    out: &mut Vec<Replacement>,
    find_value: &str,
    environment: &str,
    replace_value: &str,
) {
    if find_value.is_empty() || replace_value.is_empty() {
        return;
    }
    match out.iter_mut().find(|r| r.find_value == find_value) {
        Some(existing) => {
            if !existing.replace_value.iter().any(|(env, _)| env == environment) {
                existing
                    .replace_value
                    .push((environment.to_string(), replace_value.to_string()));
            }
        }
        None => out.push(Replacement {
            find_value: find_value.to_string(),
            replace_value: vec![(environment.to_string(), replace_value.to_string())],
        }),
    }
}

/// Pair source values with the scanned values of every target environment.
pub fn static_replacements(source: &EnvironmentScan, targets: &[EnvironmentScan]) -> Vec<Replacement> {
    let mut out = Vec::new();
    for layer in &source.layers {
        for target in targets.iter().filter(|t| t.environment != source.environment) {
            let Some(target_layer) = target.layer(&layer.name) else {
                continue;
            };
            push_replacement(
                &mut out,
                &layer.workspace_id,
                &target.environment,
                &target_layer.workspace_id,
            );
            for item in &layer.items {
                let Some(counterpart) = target_layer.item(&item.unique_name()) else {
                    continue;
                };
                for ((_, value), (_, target_value)) in item_values(item).iter().zip(item_values(counterpart).iter()) {
                    if let (Some(value), Some(target_value)) = (value, target_value) {
                        push_replacement(&mut out, value, &target.environment, target_value);
                    }
                }
            }
        }
    }
    out
}

/// Pair source values with deployment-time references for each target.
///
/// `target_workspaces` lists, per target environment, the workspace name of
/// each layer.
pub fn dynamic_replacements(
    source: &EnvironmentScan,
    target_workspaces: &[(String, Vec<(String, String)>)],
) -> Vec<Replacement> {
    let mut out = Vec::new();
    for layer in &source.layers {
        for (environment, workspaces) in target_workspaces {
            if let Some((_, workspace)) = workspaces
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&layer.name))
            {
                push_replacement(
                    &mut out,
                    &layer.workspace_id,
                    environment,
                    &format!("$workspace.{}", workspace),
                );
            }
            for item in &layer.items {
                let reference = format!("$items.{}.{}", item.item_type, item.name);
                push_replacement(&mut out, &item.id, environment, &format!("{}.id", reference));
                if let Some(endpoint) = item.details.as_ref().and_then(ItemDetails::sql_endpoint_id) {
                    push_replacement(
                        &mut out,
                        endpoint,
                        environment,
                        &format!("{}.sqlendpointid", reference),
                    );
                }
            }
        }
    }
    out
}

/// Merge generated entries into the template document.
pub fn render(template: Option<&str>, replacements: &[Replacement]) -> Result<String> {
    let mut document = match template.filter(|t| !t.trim().is_empty()) {
        Some(text) => serde_yaml::from_str::<YamlValue>(text)?,
        None => YamlValue::Mapping(Mapping::new()),
    };
    if document.is_null() {
        document = YamlValue::Mapping(Mapping::new());
    }
    let mapping = document
        .as_mapping_mut()
        .ok_or_else(|| Error::config("parameter template must be a YAML mapping"))?;
    if !matches!(mapping.get("find_replace"), Some(YamlValue::Sequence(_))) {
        if mapping.get("find_replace").is_some_and(|v| !v.is_null()) {
            return Err(Error::config("find_replace in the parameter template must be a list"));
        }
        mapping.insert("find_replace".into(), YamlValue::Sequence(Vec::new()));
    }
    let Some(YamlValue::Sequence(entries)) = mapping.get_mut("find_replace") else {
        return Err(Error::config("find_replace in the parameter template must be a list"));
    };

    let mut seen: HashSet<String> = entries
        .iter()
        .filter_map(|entry| entry.get("find_value").and_then(YamlValue::as_str))
        .map(str::to_string)
        .collect();
    for replacement in replacements {
        if replacement.replace_value.is_empty() || !seen.insert(replacement.find_value.clone()) {
            continue;
        }
        let mut replace_value = Mapping::new();
        for (environment, value) in &replacement.replace_value {
            replace_value.insert(environment.as_str().into(), value.as_str().into());
        }
        let mut entry = Mapping::new();
        entry.insert("find_value".into(), replacement.find_value.as_str().into());
        entry.insert("replace_value".into(), YamlValue::Mapping(replace_value));
        entries.push(YamlValue::Mapping(entry));
    }
    Ok(serde_yaml::to_string(&document)?)
}

/// Write `document` as `parameter.yml` into every folder of `solution_root`.
pub fn distribute(document: &str, solution_root: &Path) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();
    for entry in WalkDir::new(solution_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| Error::Io(e.into()))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let path = entry.path().join("parameter.yml");
        fs::write(&path, document)?;
        written.push(path);
    }
    Ok(written)
}

fn load_definition<T: Transport>(session: &Session<'_, T>, environment: &str) -> Result<Option<EnvironmentDefinition>> {
    let layout = &session.context.layout;
    if !layout.base_environment().exists() {
        return Ok(None);
    }
    load_environment(layout, environment).map(Some)
}

fn write_document<T: Transport>(session: &Session<'_, T>, replacements: &[Replacement]) -> Result<ParameterFile> {
    let template_path = session.context.layout.parameter_template();
    let template = match fs::read_to_string(&template_path) {
        Ok(text) => Some(text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(e.into()),
    };
    let document = render(template.as_deref(), replacements)?;
    if let Some(parent) = template_path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&template_path, &document)?;
    log::info!(
        "parameter document with {} generated entries written to {}",
        replacements.len(),
        template_path.display()
    );

    let solution_root = &session.context.solution_root;
    let copies = if solution_root.is_dir() {
        session.out.info("Copying parameter file to solution folders...");
        let copies = distribute(&document, solution_root)?;
        for copy in &copies {
            let folder = copy
                .parent()
                .and_then(Path::file_name)
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default();
            session.out.info(&format!("  Copied to {}/parameter.yml", folder));
        }
        copies
    } else {
        session.out.warning(&format!(
            "Solution folder {} not found. Parameter file not distributed.",
            solution_root.display()
        ));
        Vec::new()
    };

    Ok(ParameterFile {
        document,
        template_path,
        copies,
    })
}

/// Scan every environment and pair `source` values with the others.
pub fn generate_static<T: Transport>(
    session: &Session<'_, T>,
    environments: &[String],
    source: &str,
) -> Result<ParameterFile> {
    session.out.header("Fetching environment details");
    let mut scans = Vec::new();
    for environment in environments {
        let Some(definition) = load_definition(session, environment)? else {
            session.out.warning(&format!(
                "No environment definition found for {}... Skipping!",
                environment
            ));
            continue;
        };
        session
            .out
            .info(&format!("Fetching details for {}...", environment));
        scans.push(scan_environment(session, &definition, environment)?);
    }

    let replacements = match scans.iter().find(|s| s.environment == source) {
        Some(source_scan) => static_replacements(source_scan, &scans),
        None => {
            session.out.warning(&format!(
                "Source environment {} was not scanned. Only template entries are kept.",
                source
            ));
            Vec::new()
        }
    };
    let file = write_document(session, &replacements)?;
    session
        .out
        .success("Parameter file generation completed successfully!");
    Ok(file)
}

/// Scan only `source` and reference the targets dynamically.
pub fn generate_dynamic<T: Transport>(
    session: &Session<'_, T>,
    source: &str,
    targets: &[String],
) -> Result<ParameterFile> {
    session.out.header(&format!(
        "Fetching {} environment details for dynamic parameter generation",
        source
    ));
    let definition = load_definition(session, source)?.ok_or_else(|| {
        Error::config(format!(
            "No environment definition found for {}",
            source
        ))
    })?;
    session.out.info(&format!("Fetching details for {}...", source));
    let scan = scan_environment(session, &definition, source)?;

    let mut target_workspaces = Vec::new();
    for target in targets {
        let target_definition = match load_environment(&session.context.layout, target) {
            Ok(def) => def,
            Err(e) => {
                log::warn!("using {} definition for {}: {}", source, target, e);
                definition.clone()
            }
        };
        let mut workspaces = Vec::new();
        for layer in &target_definition.layers {
            workspaces.push((
                layer.name.clone(),
                target_definition.workspace_name(&layer.name, target)?,
            ));
        }
        target_workspaces.push((target.clone(), workspaces));
    }

    let replacements = dynamic_replacements(&scan, &target_workspaces);
    let file = write_document(session, &replacements)?;
    session
        .out
        .success("Parameter file generation completed successfully!");
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ApiResponse;
    use crate::config::ResourceLayout;
    use crate::output::Printer;
    use crate::workflows::testing::{client, context};
    use serde_json::json;
    use tempfile::TempDir;

    fn lakehouse(id: &str, endpoint: &str, server: &str) -> ScannedItem {
        ScannedItem {
            id: id.into(),
            name: "Curated".into(),
            item_type: ItemType::Lakehouse,
            details: Some(ItemDetails::Lakehouse {
                connection_string: Some(server.into()),
                sql_endpoint_id: Some(endpoint.into()),
                provisioning_status: None,
            }),
            connection_id: None,
        }
    }

    fn scan(environment: &str, workspace_id: &str, items: Vec<ScannedItem>) -> EnvironmentScan {
        EnvironmentScan {
            environment: environment.into(),
            layers: vec![ScannedLayer {
                name: "Store".into(),
                workspace_name: format!("Sales - Store [{}]", environment),
                workspace_id: workspace_id.into(),
                items,
            }],
        }
    }

    #[test]
    fn test_static_replacements_pair_by_layer_and_unique_name() {
        let dev = scan("dev", "ws-dev", vec![lakehouse("lh-dev", "ep-dev", "dev.sql")]);
        let tst = scan("tst", "ws-tst", vec![lakehouse("lh-tst", "ep-tst", "tst.sql")]);
        let prd = scan("prd", "ws-prd", vec![]);

        let replacements = static_replacements(&dev, &[dev.clone(), tst, prd]);

        let rendered: Vec<String> = replacements
            .iter()
            .map(|r| {
                let targets: Vec<String> = r.replace_value.iter().map(|(e, v)| format!("{}={}", e, v)).collect();
                format!("{} -> {}", r.find_value, targets.join(","))
            })
            .collect();
        assert_eq!(
            rendered,
            vec![
                "ws-dev -> tst=ws-tst,prd=ws-prd",
                "lh-dev -> tst=lh-tst",
                "ep-dev -> tst=ep-tst",
                "dev.sql -> tst=tst.sql",
            ]
        );
    }

    #[test]
    fn test_dynamic_replacements_use_references() {
        let dev = scan("dev", "ws-dev", vec![lakehouse("lh-dev", "ep-dev", "dev.sql")]);
        let targets = vec![(
            "tst".to_string(),
            vec![("Store".to_string(), "Sales - Store [tst]".to_string())],
        )];
        let replacements = dynamic_replacements(&dev, &targets);
        let document = render(None, &replacements).unwrap();
        insta::assert_snapshot!(document, @r###"
        find_replace:
        - find_value: ws-dev
          replace_value:
            tst: $workspace.Sales - Store [tst]
        - find_value: lh-dev
          replace_value:
            tst: $items.Lakehouse.Curated.id
        - find_value: ep-dev
          replace_value:
            tst: $items.Lakehouse.Curated.sqlendpointid
        "###);
    }

    #[test]
    fn test_render_keeps_template_and_skips_duplicates() {
        let template = "\
find_replace:
  - find_value: ws-dev
    replace_value:
      tst: manual
spark_pool: []
";
        let replacements = vec![
            Replacement {
                find_value: "ws-dev".into(),
                replace_value: vec![("tst".into(), "ws-tst".into())],
            },
            Replacement {
                find_value: "lh-dev".into(),
                replace_value: vec![("tst".into(), "lh-tst".into())],
            },
        ];
        let document = render(Some(template), &replacements).unwrap();
        let value: YamlValue = serde_yaml::from_str(&document).unwrap();
        let entries = value["find_replace"].as_sequence().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0]["replace_value"]["tst"], YamlValue::from("manual"));
        assert_eq!(entries[1]["find_value"], YamlValue::from("lh-dev"));
        assert!(value.get("spark_pool").is_some());

        // rendering the output again adds nothing
        let again = render(Some(&document), &replacements).unwrap();
        assert_eq!(again, document);
    }

    #[test]
    fn test_render_rejects_non_mapping_template() {
        let err = render(Some("- a\n- b\n"), &[]).unwrap_err();
        assert!(err.to_string().contains("must be a YAML mapping"));
    }

    #[test]
    fn test_distribute_writes_identical_copies() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("core")).unwrap();
        fs::create_dir(temp.path().join("store")).unwrap();
        fs::write(temp.path().join("README.md"), "x").unwrap();

        let written = distribute("find_replace: []\n", temp.path()).unwrap();

        assert_eq!(written.len(), 2);
        for path in written {
            assert_eq!(fs::read_to_string(path).unwrap(), "find_replace: []\n");
        }
        assert!(!temp.path().join("parameter.yml").exists());
    }

    #[test]
    fn test_scan_attaches_sql_details_and_connection_ids() {
        let client = client(|command, _| {
            if command.contains("-q id") {
                return "0b4ac1d2-4f1e-4a57-9e5f-1c2d3e4f5a6b".to_string();
            }
            if command.starts_with("api") {
                return ApiResponse::envelope(200, json!({"value": [
                    {"id": "11111111-1111-1111-1111-111111111111", "displayName": "Curated", "type": "Lakehouse"},
                    {"id": "22222222-2222-2222-2222-222222222222", "displayName": "Load", "type": "Notebook"}
                ]}));
            }
            if command.starts_with("exists") {
                return "true".to_string();
            }
            if command.starts_with("get '.connections/") {
                return json!({"id": "c0"}).to_string();
            }
            json!({"properties": {"sqlEndpointProperties": {"id": "ep", "connectionString": "dev.sql"}}}).to_string()
        });
        let out = Printer::capture();
        let ctx = context();
        let session = Session::new(&client, &out, &ctx);
        let definition = crate::config::parse_environment(
            json!({
                "name": "Sales - {layer} [{environment}]",
                "layers": {"Store": {"items": {"Lakehouse": [
                    {"item_name": "Curated", "connection_name": "lh-{environment}"}
                ]}}}
            }),
            "test",
        )
        .unwrap();

        let scan = scan_environment(&session, &definition, "dev").unwrap();

        let items = &scan.layers[0].items;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].connection_id.as_deref(), Some("c0"));
        assert_eq!(
            items[0].details.as_ref().and_then(ItemDetails::sql_endpoint_id),
            Some("ep")
        );
        assert!(items[1].details.is_none());
        assert_eq!(client.transport().calls_containing("Load.Notebook").len(), 0);
    }

    #[test]
    fn test_generate_static_without_definitions_keeps_template() {
        let temp = TempDir::new().unwrap();
        let layout = ResourceLayout::new(temp.path().join("resources"));
        fs::create_dir_all(temp.path().join("resources/parameters")).unwrap();
        fs::write(layout.parameter_template(), "find_replace: []\n").unwrap();
        fs::create_dir_all(temp.path().join("solution/core")).unwrap();

        let client = client(|_, _| unreachable!());
        let out = Printer::capture();
        let mut ctx = context().with_solution_root(temp.path().join("solution"));
        ctx.layout = layout;
        let session = Session::new(&client, &out, &ctx);

        let file = generate_static(&session, &["dev".to_string(), "tst".to_string()], "dev").unwrap();

        assert_eq!(file.copies.len(), 1);
        assert!(out
            .captured()
            .contains("No environment definition found for dev... Skipping!"));
        assert_eq!(
            fs::read_to_string(temp.path().join("solution/core/parameter.yml")).unwrap(),
            file.document
        );
    }
}
