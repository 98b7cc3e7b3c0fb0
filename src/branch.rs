//! Feature branch names.
//!
//! A feature branch such as `store/feature/login-page` provisions workspaces
//! for the `store` layer only (plus layers flagged `always_provision`), named
//! after the last path segment (`login-page`).

use crate::config::Layer;

/// Resolve the branch from the explicit value, then the Azure Pipelines
/// source branch without its `refs/heads/` prefix.
pub fn resolve_branch(explicit: Option<&str>, source_branch: Option<&str>) -> Option<String> {
    explicit
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .or_else(|| {
            source_branch
                .filter(|b| !b.is_empty())
                .map(|b| b.strip_prefix("refs/heads/").unwrap_or(b).to_string())
        })
}

/// Remove the `feature` markers used by the branch naming convention.
pub fn trim_feature_markers(branch: &str) -> String {
    let branch = branch.strip_prefix("refs/heads/").unwrap_or(branch);
    branch.replace("feature/", "").replace("/feature", "")
}

/// Branch name used when deleting: only the leading markers are removed.
pub fn trim_for_delete(branch: &str) -> &str {
    branch
        .strip_prefix("refs/heads/feature/")
        .or_else(|| branch.strip_prefix("feature/"))
        .unwrap_or(branch)
}

/// Last segment of a trimmed branch name.
pub fn short_name(trimmed: &str) -> &str {
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Layers a feature branch provisions.
///
/// When the first segment of the trimmed branch names a layer, that layer and
/// every `always_provision` layer are selected. Otherwise all layers are.
pub fn filter_layers<'a>(layers: &'a [Layer], trimmed: &str) -> Vec<&'a Layer> {
    let mut segments = trimmed.split('/');
    let first = segments.next().unwrap_or_default();
    let matched = if segments.next().is_some() {
        layers
            .iter()
            .find(|layer| layer.name.eq_ignore_ascii_case(first))
    } else {
        None
    };

    match matched {
        Some(selected) => layers
            .iter()
            .filter(|layer| layer.name == selected.name || layer.definition.always_provision)
            .collect(),
        None => layers.iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LayerDefinition;

    fn layers() -> Vec<Layer> {
        let layer = |name: &str, always: bool| Layer {
            name: name.to_string(),
            definition: LayerDefinition {
                always_provision: always,
                ..Default::default()
            },
        };
        vec![
            layer("Core", true),
            layer("Ingest", false),
            layer("Store", false),
            layer("Model", false),
        ]
    }

    fn names(selected: &[&Layer]) -> Vec<String> {
        selected.iter().map(|l| l.name.clone()).collect()
    }

    #[test]
    fn test_layer_segment_selects_layer_and_always_provision() {
        let layers = layers();
        let trimmed = trim_feature_markers("store/feature/x");
        assert_eq!(trimmed, "store/x");
        assert_eq!(names(&filter_layers(&layers, &trimmed)), vec!["Core", "Store"]);
    }

    #[test]
    fn test_plain_feature_branch_selects_all() {
        let layers = layers();
        let trimmed = trim_feature_markers("feature/x");
        assert_eq!(trimmed, "x");
        assert_eq!(filter_layers(&layers, &trimmed).len(), 4);
    }

    #[test]
    fn test_unknown_first_segment_selects_all() {
        let layers = layers();
        assert_eq!(filter_layers(&layers, "jira-12/login").len(), 4);
    }

    #[test]
    fn test_short_name() {
        assert_eq!(short_name("store/login-page"), "login-page");
        assert_eq!(short_name("login-page"), "login-page");
    }

    #[test]
    fn test_trim_for_delete() {
        assert_eq!(trim_for_delete("refs/heads/feature/store/x"), "store/x");
        assert_eq!(trim_for_delete("feature/x"), "x");
        assert_eq!(trim_for_delete("store/feature/x"), "store/feature/x");
    }

    #[test]
    fn test_resolve_branch() {
        assert_eq!(
            resolve_branch(Some("feature/a"), Some("refs/heads/feature/b")).as_deref(),
            Some("feature/a")
        );
        assert_eq!(
            resolve_branch(None, Some("refs/heads/feature/b")).as_deref(),
            Some("feature/b")
        );
        assert_eq!(resolve_branch(Some(""), None), None);
    }
}
