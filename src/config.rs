//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/catpick/catpick.toml`
//! 3. Local config: `<dir>/.catpick.toml` (usually the working directory)
//! 4. Environment variables: `CATPICK_*` prefix

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::ApplicationError;
use crate::domain::{
    PickerConfig, SearchScope, SelectionMode, SelectionPolicy, SortKey,
    DEFAULT_BORDERLINE_MARKER,
};

/// Picker behaviour.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PickerSettings {
    /// `single` or `multiple`
    pub mode: SelectionMode,
    /// `any`, `leaf-only`, `non-root-leaf` or `prefix:<code>`
    pub policy: SelectionPolicy,
    /// Sibling order: `code` or `name`
    pub sort: SortKey,
    /// Fields searched by `tree --filter` and `search`
    pub search_fields: Vec<String>,
    /// Marker separating borderline notes inside excludes text
    pub borderline_marker: String,
    /// Open every parent when the picker starts
    pub expand_all: bool,
}

impl Default for PickerSettings {
    fn default() -> Self {
        Self {
            mode: SelectionMode::Single,
            policy: SelectionPolicy::LeafOnly,
            sort: SortKey::Code,
            search_fields: vec!["code".into(), "name".into()],
            borderline_marker: DEFAULT_BORDERLINE_MARKER.into(),
            expand_all: false,
        }
    }
}

/// Raw picker config for intermediate parsing (arrays are Option to detect "not specified").
///
/// Used during layered config merging to distinguish between:
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty array
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawPickerSettings {
    pub mode: Option<SelectionMode>,
    pub policy: Option<SelectionPolicy>,
    pub sort: Option<SortKey>,
    pub search_fields: Option<Vec<String>>,
    pub borderline_marker: Option<String>,
    pub expand_all: Option<bool>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub source: Option<PathBuf>,
    #[serde(default)]
    pub picker: RawPickerSettings,
}

impl PickerSettings {
    /// Merge arrays with union semantics and negation support.
    ///
    /// - Items from overlay are added to base
    /// - Items prefixed with `!` remove the corresponding item from the result
    /// - Duplicates are de-duplicated
    ///
    /// # Examples
    /// ```ignore
    /// merge_array(&["code", "name"], &["includes"])  // → ["code", "includes", "name"]
    /// merge_array(&["code", "name"], &["!code"])     // → ["name"]
    /// ```
    pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
        let mut result: HashSet<String> = base.iter().cloned().collect();

        for item in overlay {
            if let Some(negated) = item.strip_prefix('!') {
                result.remove(negated);
            } else {
                result.insert(item.clone());
            }
        }

        let mut vec: Vec<String> = result.into_iter().collect();
        vec.sort();
        vec
    }

    /// Merge overlay config onto self (base).
    ///
    /// - Scalar options: overlay wins if Some, otherwise keep base
    /// - Arrays: union merge with negation support (if overlay specified)
    pub fn merge(&self, overlay: &RawPickerSettings) -> Self {
        Self {
            search_fields: overlay
                .search_fields
                .as_ref()
                .map(|o| Self::merge_array(&self.search_fields, o))
                .unwrap_or_else(|| self.search_fields.clone()),
            ..self.apply_scalars(overlay)
        }
    }

    /// Apply global config onto defaults; arrays REPLACE instead of merging.
    pub fn apply_global(&self, global: &RawPickerSettings) -> Self {
        Self {
            search_fields: global
                .search_fields
                .clone()
                .unwrap_or_else(|| self.search_fields.clone()),
            ..self.apply_scalars(global)
        }
    }

    fn apply_scalars(&self, overlay: &RawPickerSettings) -> Self {
        Self {
            mode: overlay.mode.unwrap_or(self.mode),
            policy: overlay
                .policy
                .clone()
                .unwrap_or_else(|| self.policy.clone()),
            sort: overlay.sort.unwrap_or(self.sort),
            search_fields: self.search_fields.clone(),
            borderline_marker: overlay
                .borderline_marker
                .clone()
                .unwrap_or_else(|| self.borderline_marker.clone()),
            expand_all: overlay.expand_all.unwrap_or(self.expand_all),
        }
    }
}

/// Unified configuration for catpick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Settings {
    /// Default category file (JSON)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Picker settings
    pub picker: PickerSettings,
}

/// Get the XDG config directory for catpick.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "catpick").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("catpick.toml"))
}

/// Get the path to the local config file in `dir`.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".catpick.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand `~`, `$VAR` and `${VAR}` in `source`.
    fn expand_paths(&mut self) {
        if let Some(source) = &self.source {
            let raw = source.to_string_lossy();
            let expanded = shellexpand::full(raw.as_ref())
                .map(|s| s.into_owned())
                .unwrap_or_else(|_| raw.to_string());
            self.source = Some(PathBuf::from(expanded));
        }
    }

    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            source: overlay.source.clone().or_else(|| self.source.clone()),
            picker: self.picker.merge(&overlay.picker),
        }
    }

    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            source: global.source.clone().or_else(|| self.source.clone()),
            picker: self.picker.apply_global(&global.picker),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Directory searched for `.catpick.toml`
    ///
    /// # Array Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: UNION with negation support
    /// - Any → Env vars: REPLACE
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        let local = local_dir.map(local_config_path);
        Self::load_from(global.as_deref(), local.as_deref())
    }

    /// [`Self::load`] with explicit file locations. Missing files are skipped.
    pub fn load_from(
        global_path: Option<&Path>,
        local_path: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(path) = global_path.filter(|p| p.exists()) {
            debug!("load: global config {}", path.display());
            current = current.apply_global(&load_raw_settings(path)?);
        }

        if let Some(path) = local_path.filter(|p| p.exists()) {
            debug!("load: local config {}", path.display());
            current = current.merge_with(&load_raw_settings(path)?);
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply CATPICK_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let builder = Config::builder().add_source(
            Environment::with_prefix("CATPICK")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("picker.search_fields"),
        );

        let config = builder.build().map_err(config_err)?;

        if let Ok(val) = config.get_string("source") {
            settings.source = Some(PathBuf::from(val));
        }
        if let Ok(val) = config.get_string("picker.mode") {
            settings.picker.mode = val.parse().map_err(env_err("picker.mode"))?;
        }
        if let Ok(val) = config.get_string("picker.policy") {
            settings.picker.policy = val.parse().map_err(env_err("picker.policy"))?;
        }
        if let Ok(val) = config.get_string("picker.sort") {
            settings.picker.sort = val.parse().map_err(env_err("picker.sort"))?;
        }
        if let Ok(val) = config.get::<Vec<String>>("picker.search_fields") {
            settings.picker.search_fields = val;
        }
        if let Ok(val) = config.get_string("picker.borderline_marker") {
            settings.picker.borderline_marker = val;
        }
        if let Ok(val) = config.get_bool("picker.expand_all") {
            settings.picker.expand_all = val;
        }

        Ok(settings)
    }

    /// Search scope named by `picker.search_fields`.
    pub fn search_scope(&self) -> Result<SearchScope, ApplicationError> {
        if self.picker.search_fields.is_empty() {
            return Err(ApplicationError::Config {
                message: "picker.search_fields must name at least one field".into(),
            });
        }
        SearchScope::from_names(&self.picker.search_fields)
            .map_err(|message| ApplicationError::Config { message })
    }

    /// Picker parameters for a session.
    pub fn to_picker_config(&self) -> Result<PickerConfig, ApplicationError> {
        Ok(PickerConfig {
            mode: self.picker.mode,
            policy: self.picker.policy.clone(),
            scope: self.search_scope()?,
            sort: self.picker.sort,
            borderline_marker: self.picker.borderline_marker.clone(),
            expand_all: self.picker.expand_all,
        })
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# catpick configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/catpick/catpick.toml  (defines your baseline)
#   Local:  ./.catpick.toml                 (project-specific additions)
#   Env:    CATPICK_* environment variables (explicit overrides)
#
# Array Merge Semantics:
#   Global config REPLACES compiled defaults.
#   Local config UNIONS with global.
#   Use "!item" in local config to REMOVE an inherited item:
#     search_fields = ["includes", "!code"]

# Default category snapshot (JSON array, {"results": [...]} page or families/leaves seed)
# source = "~/data/categories.json"

[picker]
# single | multiple
# mode = "single"

# any | leaf-only | non-root-leaf | prefix:<code>
# policy = "leaf-only"

# code | name
# sort = "code"

# Any of: code, name, description, includes, excludes, borderline
# search_fields = ["code", "name"]

# Marker that starts borderline notes inside the excludes text
# borderline_marker = "Пограничное:"

# Open every parent when the picker starts
# expand_all = false
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

fn env_err(key: &'static str) -> impl Fn(String) -> ApplicationError {
    move |message| ApplicationError::Config {
        message: format!("CATPICK_{}: {}", key.to_uppercase().replace('.', "__"), message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn given_no_config_files_when_loading_then_uses_defaults() {
        let settings = Settings::load_from(None, None).expect("load defaults");
        assert_eq!(settings.picker.policy, SelectionPolicy::LeafOnly);
        assert_eq!(settings.picker.search_fields, strings(&["code", "name"]));
    }

    #[test]
    fn given_tilde_in_source_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            source: Some(PathBuf::from("~/categories.json")),
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        let source = settings.source.unwrap();
        assert!(source.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn test_merge_array_negation() {
        let result = PickerSettings::merge_array(
            &strings(&["code", "name"]),
            &strings(&["!code", "includes"]),
        );
        assert_eq!(result, strings(&["includes", "name"]));
    }

    #[test]
    fn test_merge_array_negation_nonexistent() {
        let result = PickerSettings::merge_array(&strings(&["code"]), &strings(&["!borderline"]));
        assert_eq!(result, strings(&["code"]));
    }

    #[test]
    fn test_apply_global_replaces_arrays() {
        let global = RawPickerSettings {
            search_fields: Some(strings(&["description"])),
            mode: Some(SelectionMode::Multiple),
            ..RawPickerSettings::default()
        };
        let result = PickerSettings::default().apply_global(&global);
        assert_eq!(result.search_fields, strings(&["description"]));
        assert_eq!(result.mode, SelectionMode::Multiple);
        assert_eq!(result.sort, SortKey::Code);
    }

    #[test]
    fn given_empty_search_fields_when_building_scope_then_config_error() {
        let mut settings = Settings::default();
        settings.picker.search_fields.clear();
        assert!(matches!(
            settings.search_scope(),
            Err(ApplicationError::Config { .. })
        ));
    }

    #[test]
    fn given_settings_when_serializing_then_round_trips_policy_text() {
        let mut settings = Settings::default();
        settings.picker.policy = SelectionPolicy::CodePrefix("H".into());
        let text = settings.to_toml().unwrap();
        assert!(text.contains("policy = \"prefix:H\""));
        let back: Settings = toml::from_str(&text).unwrap();
        assert_eq!(back, settings);
    }
}
