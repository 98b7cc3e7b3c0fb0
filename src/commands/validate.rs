//! # Validate Command Implementation
//!
//! Loads the effective environment definition (base merged with the
//! environment overlay) and, optionally, the feature definition, and reports
//! whether they are usable. Nothing on the platform is touched.
//!
//! `--tree` renders the effective environment with `ptree`.

use anyhow::Result;
use clap::Args;
use ptree::{print_tree, TreeItem};
use std::borrow::Cow;

use fabric_provisioner::config::{load_environment, load_feature, EnvironmentDefinition};
use fabric_provisioner::output::emoji;

use super::{printer, ResourceArgs};

/// Validate environment and feature definitions
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Environment whose overlay is merged onto the base definition.
    #[arg(short, long, default_value = "dev")]
    pub environment: String,

    /// Also validate the feature definition.
    #[arg(long)]
    pub feature: bool,

    /// Show the effective environment as a tree.
    #[arg(long)]
    pub tree: bool,

    #[command(flatten)]
    pub resources: ResourceArgs,
}

pub fn execute(args: ValidateArgs, color: &str) -> Result<()> {
    let out = printer(color);
    let layout = args.resources.layout();
    println!(
        "{} Validating {} definition in {}",
        emoji(out.config(), "🔍", "[SCAN]"),
        args.environment,
        layout.root().display()
    );

    let definition = match load_environment(&layout, &args.environment) {
        Ok(definition) => definition,
        Err(e) => {
            println!("{} {}", emoji(out.config(), "❌", "[ERR]"), e);
            return Err(anyhow::anyhow!("Validation failed"));
        }
    };
    println!(
        "{} Environment definition is valid ({} layers)",
        emoji(out.config(), "✅", "[OK]"),
        definition.layers.len()
    );

    if args.feature {
        match load_feature(&layout.feature()) {
            Ok(feature) => println!(
                "{} Feature definition is valid ({} layers)",
                emoji(out.config(), "✅", "[OK]"),
                feature.layers.len()
            ),
            Err(e) => {
                println!("{} {}", emoji(out.config(), "❌", "[ERR]"), e);
                return Err(anyhow::anyhow!("Validation failed"));
            }
        }
    }

    if args.tree {
        let tree = environment_tree(&definition, &args.environment)?;
        print_tree(&tree).map_err(|e| anyhow::anyhow!("Failed to display tree: {}", e))?;
    }
    Ok(())
}

/// Tree node structure for ptree visualization
#[derive(Clone)]
struct TreeNode {
    label: String,
    children: Vec<TreeNode>,
}

impl TreeNode {
    fn leaf(label: String) -> Self {
        Self {
            label,
            children: Vec::new(),
        }
    }
}

impl TreeItem for TreeNode {
    type Child = TreeNode;

    fn write_self<W: std::io::Write>(&self, f: &mut W, _style: &ptree::Style) -> std::io::Result<()> {
        write!(f, "{}", self.label)
    }

    fn children(&self) -> Cow<'_, [Self::Child]> {
        Cow::Borrowed(&self.children)
    }
}

fn environment_tree(definition: &EnvironmentDefinition, environment: &str) -> Result<TreeNode> {
    let mut layers = Vec::new();
    for layer in &definition.layers {
        let workspace = definition.workspace_name(&layer.name, environment)?;
        let mut children = Vec::new();
        if let Some(capacity) = definition.capacity_for(&layer.definition) {
            children.push(TreeNode::leaf(format!("capacity: {}", capacity)));
        }
        for (item_type, item) in layer.definition.items() {
            let mut label = match &item.item_folder {
                Some(folder) => format!("{}: {}/{}", item_type, folder, item.item_name),
                None => format!("{}: {}", item_type, item.item_name),
            };
            if let Some(connection) = &item.connection_name {
                label.push_str(&format!(" (connection {})", connection.as_str()));
            }
            children.push(TreeNode::leaf(label));
        }
        for (role, principal) in layer.definition.permissions.assignments() {
            let who = principal
                .id
                .clone()
                .or_else(|| principal.name.as_ref().map(|n| n.as_str().to_string()))
                .unwrap_or_default();
            children.push(TreeNode::leaf(format!(
                "{}: {} {}",
                role, principal.principal_type, who
            )));
        }
        for endpoint in &layer.definition.private_endpoints {
            children.push(TreeNode::leaf(format!("private endpoint: {}", endpoint.name)));
        }
        if let Some(directory) = &layer.definition.git_directory_name {
            children.push(TreeNode::leaf(format!("git directory: {}", directory)));
        }
        layers.push(TreeNode {
            label: format!("{} -> {}", layer.name, workspace),
            children,
        });
    }
    Ok(TreeNode {
        label: format!("{} ({})", definition.name.as_str(), environment),
        children: layers,
    })
}
