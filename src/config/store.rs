//! Config file persistence: create-if-absent, load with deep-merge, watch

use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use super::document::Config;
use super::merge::deep_merge;
use super::watcher::{self, WatchHandle};

/// Default config path: `<XDG config dir>/ai-overlay/config.json`
pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(crate::constants::config::APP_DIR);
    path.push(crate::constants::config::FILENAME);
    path
}

/// Create the parent directory and write `defaults` if the file is absent
///
/// Failures are logged; the caller carries on with in-memory defaults.
pub fn ensure_document(path: &Path, defaults: &Value) {
    if let Err(e) = try_ensure_document(path, defaults) {
        error!(path = %path.display(), error = ?e, "Failed to create default config file");
    }
}

fn try_ensure_document(path: &Path, defaults: &Value) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent)
            .context(format!("Failed to create config directory: {}", parent.display()))?;
    }

    if path.exists() {
        return Ok(());
    }

    let contents = serde_json::to_string_pretty(defaults)
        .context("Failed to serialize default config")?;
    fs::write(path, contents + "\n")
        .context(format!("Failed to write default config to {}", path.display()))?;
    info!(path = %path.display(), "Generated config file for user to edit");
    Ok(())
}

/// Read `path`, deep-merge it onto `defaults` and normalize
///
/// Any read or parse failure is logged and yields `defaults` unchanged.
pub fn load(path: &Path, defaults: &Config) -> Config {
    match try_load(path, defaults) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %path.display(), error = ?e, "Failed to load config, using defaults");
            defaults.clone()
        }
    }
}

fn try_load(path: &Path, defaults: &Config) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .context(format!("Failed to read config file {}", path.display()))?;
    let user: Value = serde_json::from_str(&contents)
        .context(format!("Failed to parse config file {}", path.display()))?;
    if !user.is_object() {
        warn!(path = %path.display(), "Config document is not an object, ignoring it");
        return Ok(defaults.clone());
    }

    let base = serde_json::to_value(defaults).context("Failed to serialize defaults")?;
    let merged = deep_merge(&base, &user);
    let mut config: Config = match serde_json::from_value(merged) {
        Ok(config) => config,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file has fields of the wrong type, keeping the rest");
            serde_json::from_value(overlay_valid_leaves(base, &user))
                .context(format!("Config file {} could not be applied", path.display()))?
        }
    };
    config.validate_and_clamp();
    debug!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Every non-object value in `doc` with its key path
fn collect_leaves<'a>(doc: &'a Value, prefix: &mut Vec<String>, leaves: &mut Vec<(Vec<String>, &'a Value)>) {
    match doc {
        Value::Object(map) => {
            for (key, value) in map {
                prefix.push(key.clone());
                collect_leaves(value, prefix, leaves);
                prefix.pop();
            }
        }
        leaf => leaves.push((prefix.clone(), leaf)),
    }
}

/// Set `value` at `key_path`, replacing non-objects on the way with objects
fn set_leaf(doc: &mut Value, key_path: &[String], value: Value) {
    let Some((last, parents)) = key_path.split_last() else {
        *doc = value;
        return;
    };
    let mut node = doc;
    for key in parents {
        if !node.is_object() {
            *node = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = node else { return };
        node = map.entry(key.clone()).or_insert(Value::Null);
    }
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = node {
        map.insert(last.clone(), value);
    }
}

/// Overlay `user` onto `base` one leaf at a time, skipping leaves that would
/// make the document fail to deserialize; those keep their default
fn overlay_valid_leaves(base: Value, user: &Value) -> Value {
    let mut leaves = Vec::new();
    collect_leaves(user, &mut Vec::new(), &mut leaves);

    let mut accepted = base;
    for (key_path, value) in leaves {
        let mut candidate = accepted.clone();
        set_leaf(&mut candidate, &key_path, value.clone());
        match serde_json::from_value::<Config>(candidate.clone()) {
            Ok(_) => accepted = candidate,
            Err(e) => warn!(
                field = %key_path.join("."),
                value = %value,
                error = %e,
                "Config field has the wrong type, using default"
            ),
        }
    }
    accepted
}

/// The config file plus the defaults it overlays
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    defaults: Config,
}

impl ConfigStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            defaults: Config::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn ensure_document(&self) {
        match serde_json::to_value(&self.defaults) {
            Ok(doc) => ensure_document(&self.path, &doc),
            Err(e) => error!(error = ?e, "Failed to serialize default config"),
        }
    }

    pub fn load(&self) -> Config {
        load(&self.path, &self.defaults)
    }

    /// Invoke `on_change` once per debounced burst of edits to the file
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch<F>(&self, on_change: F) -> Result<WatchHandle>
    where
        F: Fn() + Send + 'static,
    {
        watcher::watch(&self.path, on_change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::{Corner, MonitorSelector, Padding};
    use tempfile::TempDir;

    #[test]
    fn test_ensure_document_creates_directory_and_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("nested/dir/config.json");

        ensure_document(&path, &Config::default_document());

        let written: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, Config::default_document());
    }

    #[test]
    fn test_ensure_document_keeps_existing_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"corner": "center"}"#).unwrap();

        ensure_document(&path, &Config::default_document());

        assert_eq!(fs::read_to_string(&path).unwrap(), r#"{"corner": "center"}"#);
    }

    #[test]
    fn test_load_overlays_partial_document() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r#"{"corner": "bottom-left", "monitor": 1, "pulse": {"scale": 1.3}, "padding": 4}"#,
        )
        .unwrap();

        let config = load(&path, &Config::default());

        assert_eq!(config.corner, Corner::BottomLeft);
        assert_eq!(config.monitor, MonitorSelector::Index(1));
        assert_eq!(config.pulse.scale, 1.3);
        assert!(config.pulse.enabled);
        assert_eq!(config.pulse.period_listening, 700);
        assert_eq!(config.padding, Padding { vertical: 4.0, horizontal: 4.0 });
        assert_eq!(config.colors, Config::default().colors);
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = load(&temp_dir.path().join("absent.json"), &Config::default());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_load_malformed_file_returns_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, "{ corner: top-left").unwrap();

        assert_eq!(load(&path, &Config::default()), Config::default());
    }

    #[test]
    fn test_load_wrong_field_type_returns_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"showLabel": "yes please"}"#).unwrap();

        assert_eq!(load(&path, &Config::default()), Config::default());
    }

    #[test]
    fn test_load_wrong_field_type_keeps_other_user_fields() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r##"{"corner": "bottom-left", "showLabel": "yes please", "dotSize": null,
                "pulse": {"enabled": false, "periodThinking": "slow"}, "colors": {"bg": "#000000"}}"##,
        )
        .unwrap();

        let config = load(&path, &Config::default());

        assert_eq!(config.corner, Corner::BottomLeft);
        assert!(config.show_label);
        assert_eq!(config.dot_size, 12.0);
        assert!(!config.pulse.enabled);
        assert_eq!(config.pulse.period_thinking, 1100);
        assert_eq!(config.colors.bg, "#000000");
    }

    #[test]
    fn test_load_rounds_fractional_offset() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(
            &path,
            r##"{"corner": "bottom-left", "offset": {"x": 10.5, "y": 10}, "colors": {"bg": "#000000"}}"##,
        )
        .unwrap();

        let config = load(&path, &Config::default());

        assert_eq!(config.corner, Corner::BottomLeft);
        assert_eq!((config.offset.x, config.offset.y), (11, 10));
        assert_eq!(config.colors.bg, "#000000");
    }

    #[test]
    fn test_overlay_valid_leaves_replaces_scalar_with_object() {
        let base = serde_json::to_value(Config::default()).unwrap();
        let user = serde_json::json!({"offset": 5, "radius": {"nested": 1}, "opacity": 0.5});

        let repaired: Config = serde_json::from_value(overlay_valid_leaves(base, &user)).unwrap();

        assert_eq!(repaired.offset, Config::default().offset);
        assert_eq!(repaired.radius, 14.0);
        assert_eq!(repaired.opacity, 0.5);
    }

    #[test]
    fn test_load_clamps_out_of_range_values() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let path = temp_dir.path().join("config.json");
        fs::write(&path, r#"{"opacity": 4, "pivot": {"x": 2, "y": -1}}"#).unwrap();

        let config = load(&path, &Config::default());
        assert_eq!(config.opacity, 1.0);
        assert_eq!((config.pivot.x, config.pivot.y), (1.0, 0.0));
    }

    #[test]
    fn test_store_round_trip_through_disk() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let store = ConfigStore::new(temp_dir.path().join("ai-overlay/config.json"));

        store.ensure_document();

        assert!(store.path().exists());
        assert_eq!(store.load(), Config::default());
    }
}
