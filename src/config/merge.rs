//! Structural deep-merge of JSON documents

use serde_json::Value;

/// Overlay `overlay` onto `base`
///
/// Objects merge key by key, recursively. Any other value in `overlay`
/// (scalars, arrays, null) replaces the base value wholesale. Keys absent from
/// `overlay` keep their base value.
pub fn deep_merge(base: &Value, overlay: &Value) -> Value {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            let mut merged = base_map.clone();
            for (key, overlay_value) in overlay_map {
                let value = match base_map.get(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value.clone(),
                };
                merged.insert(key.clone(), value);
            }
            Value::Object(merged)
        }
        (_, overlay) => overlay.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn defaults() -> Value {
        json!({
            "corner": "top-right",
            "offset": { "x": 24, "y": 24 },
            "padding": [6, 10],
            "pulse": { "enabled": true, "scale": 1.06, "periodListening": 700 },
        })
    }

    #[test]
    fn test_nested_sections_merge_key_by_key() {
        let user = json!({ "pulse": { "scale": 1.2 }, "offset": { "y": 0 } });
        let merged = deep_merge(&defaults(), &user);
        assert_eq!(merged["pulse"], json!({ "enabled": true, "scale": 1.2, "periodListening": 700 }));
        assert_eq!(merged["offset"], json!({ "x": 24, "y": 0 }));
    }

    #[test]
    fn test_arrays_and_scalars_replace_wholesale() {
        let user = json!({ "padding": [2], "corner": "center" });
        let merged = deep_merge(&defaults(), &user);
        assert_eq!(merged["padding"], json!([2]));
        assert_eq!(merged["corner"], json!("center"));
    }

    #[test]
    fn test_object_replaced_by_scalar_and_back() {
        let merged = deep_merge(&defaults(), &json!({ "pulse": false }));
        assert_eq!(merged["pulse"], json!(false));

        let merged = deep_merge(&json!({ "a": 1 }), &json!({ "a": { "b": 2 } }));
        assert_eq!(merged, json!({ "a": { "b": 2 } }));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let user = json!({ "pulse": { "scale": 1.5 }, "padding": [1, 1], "extra": { "k": [1, 2] } });
        let once = deep_merge(&defaults(), &user);
        let twice = deep_merge(&defaults(), &once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_preserves_unrelated_default_keys() {
        let user = json!({ "pulse": { "enabled": false } });
        let merged = deep_merge(&defaults(), &user);
        assert_eq!(merged["corner"], defaults()["corner"]);
        assert_eq!(merged["offset"], defaults()["offset"]);
        assert_eq!(merged["padding"], defaults()["padding"]);
        assert_eq!(merged["pulse"]["scale"], defaults()["pulse"]["scale"]);
    }

    #[test]
    fn test_non_object_overlay_replaces_root() {
        assert_eq!(deep_merge(&defaults(), &json!([1, 2])), json!([1, 2]));
    }
}
