//! JSON merge operations
//!
//! Deep merging of JSON documents, used to layer an environment overlay
//! (`infrastructure.<env>.json`) on top of the base definition.
//!
//! ## Rules
//!
//! - Objects merge recursively, key by key. Keys only present in the target
//!   are preserved.
//! - Scalars in the source replace the target value.
//! - Arrays are replaced or appended depending on [`ListMerge`].
//! - A `null` overlay value replaces the target like any other scalar.

use serde_json::Value as JsonValue;

use super::ListMerge;

/// Recursively merge `source` into `target`.
///
/// # Arguments
///
/// * `target` - The value to merge into (modified in place)
/// * `source` - The overlay value
/// * `lists` - Whether arrays in `source` replace or extend arrays in `target`
pub fn merge_json_values(target: &mut JsonValue, source: &JsonValue, lists: ListMerge) {
    match target {
        JsonValue::Object(target_map) => {
            if let JsonValue::Object(source_map) = source {
                for (key, value) in source_map {
                    match target_map.get_mut(key) {
                        Some(existing) => merge_json_values(existing, value, lists),
                        None => {
                            target_map.insert(key.clone(), value.clone());
                        }
                    }
                }
            } else {
                *target = source.clone();
            }
        }
        JsonValue::Array(target_array) => match (source, lists) {
            (JsonValue::Array(source_array), ListMerge::Append) => {
                target_array.extend(source_array.iter().cloned());
            }
            _ => *target = source.clone(),
        },
        _ => *target = source.clone(),
    }
}

/// Merge a sequence of overlays into a clone of `base`, left to right.
pub fn merge_all<'a, I>(base: &JsonValue, overlays: I, lists: ListMerge) -> JsonValue
where
    I: IntoIterator<Item = &'a JsonValue>,
{
    let mut merged = base.clone();
    for overlay in overlays {
        merge_json_values(&mut merged, overlay, lists);
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_empty_overlay_is_identity() {
        let base = json!({
            "name": "Sales - {layer} [{environment}]",
            "layers": {"core": {"capacity_name": "cap1"}, "store": {}}
        });
        let merged = merge_all(&base, [&json!({})], ListMerge::Replace);
        assert_eq!(merged, base);
    }

    #[test]
    fn test_merge_overlay_touches_only_named_key() {
        let base = json!({
            "layers": {
                "core": {"capacity_name": "cap1"},
                "store": {"git_directoryName": "store"}
            }
        });
        let overlay = json!({"layers": {"core": {"x": 1}}});
        let merged = merge_all(&base, [&overlay], ListMerge::Replace);

        assert_eq!(merged["layers"]["core"]["x"], 1);
        assert_eq!(merged["layers"]["core"]["capacity_name"], "cap1");
        assert_eq!(merged["layers"]["store"], base["layers"]["store"]);
    }

    #[test]
    fn test_merge_scalar_replaced() {
        let mut target = json!({"generic": {"capacity_name": "dev-cap"}});
        merge_json_values(
            &mut target,
            &json!({"generic": {"capacity_name": "prd-cap"}}),
            ListMerge::Replace,
        );
        assert_eq!(target["generic"]["capacity_name"], "prd-cap");
    }

    #[test]
    fn test_merge_list_replace() {
        let mut target = json!({"items": {"Notebook": [{"item_name": "a"}]}});
        merge_json_values(
            &mut target,
            &json!({"items": {"Notebook": [{"item_name": "b"}]}}),
            ListMerge::Replace,
        );
        assert_eq!(target["items"]["Notebook"], json!([{"item_name": "b"}]));
    }

    #[test]
    fn test_merge_list_append() {
        let mut target = json!({"items": {"Notebook": [{"item_name": "a"}]}});
        merge_json_values(
            &mut target,
            &json!({"items": {"Notebook": [{"item_name": "b"}]}}),
            ListMerge::Append,
        );
        assert_eq!(
            target["items"]["Notebook"],
            json!([{"item_name": "a"}, {"item_name": "b"}])
        );
    }

    #[test]
    fn test_merge_object_replaced_by_scalar() {
        let mut target = json!({"generic": {"git_settings": {"a": 1}}});
        merge_json_values(
            &mut target,
            &json!({"generic": {"git_settings": null}}),
            ListMerge::Replace,
        );
        assert!(target["generic"]["git_settings"].is_null());
    }

    #[test]
    fn test_merge_preserves_declaration_order() {
        let base = json!({"layers": {"core": {}, "ingest": {}, "store": {}}});
        let overlay = json!({"layers": {"present": {}, "core": {"x": 1}}});
        let merged = merge_all(&base, [&overlay], ListMerge::Replace);
        let keys: Vec<_> = merged["layers"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["core", "ingest", "store", "present"]);
    }
}
