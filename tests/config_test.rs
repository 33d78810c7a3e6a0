//! Integration tests for Settings config loading with layered merge semantics.
//!
//! Merge Semantics:
//! - Defaults → Global: REPLACE (global defines the real baseline)
//! - Global → Local: UNION with negation support
//! - Any → Env vars: REPLACE (explicit user override)
//!
//! Note: global and local files live in temp directories, so the user's real
//! config never takes part.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use catpick::application::ApplicationError;
use catpick::config::{local_config_path, Settings};
use catpick::domain::{SearchField, SelectionMode, SelectionPolicy, SortKey};

struct Layers {
    _dir: TempDir,
    global: PathBuf,
    local: PathBuf,
}

fn layers(global: Option<&str>, local: Option<&str>) -> Layers {
    let dir = TempDir::new().unwrap();
    let global_path = dir.path().join("global.toml");
    let local_path = local_config_path(dir.path());
    if let Some(content) = global {
        fs::write(&global_path, content).unwrap();
    }
    if let Some(content) = local {
        fs::write(&local_path, content).unwrap();
    }
    Layers {
        _dir: dir,
        global: global_path,
        local: local_path,
    }
}

fn load(layers: &Layers) -> Result<Settings, ApplicationError> {
    Settings::load_from(Some(&layers.global), Some(&layers.local))
}

// ============================================================
// Defaults
// ============================================================

#[test]
fn given_no_config_files_when_load_then_defaults() {
    let layers = layers(None, None);

    let settings = load(&layers).expect("load settings");

    assert_eq!(settings.source, None);
    assert_eq!(settings.picker.mode, SelectionMode::Single);
    assert_eq!(settings.picker.policy, SelectionPolicy::LeafOnly);
    assert_eq!(settings.picker.sort, SortKey::Code);
    assert_eq!(settings.picker.search_fields, vec!["code", "name"]);
    assert!(!settings.picker.expand_all);
}

// ============================================================
// Array merge semantics
// ============================================================

#[test]
fn given_local_search_fields_when_load_then_unions_with_current() {
    let layers = layers(
        None,
        Some(
            r#"
[picker]
search_fields = ["includes"]
"#,
        ),
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(
        settings.picker.search_fields,
        vec!["code", "includes", "name"],
        "local adds to defaults, sorted"
    );
}

#[test]
fn given_local_negation_when_load_then_removes_inherited_field() {
    let layers = layers(
        None,
        Some(
            r#"
[picker]
search_fields = ["description", "!code"]
"#,
        ),
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(settings.picker.search_fields, vec!["description", "name"]);
}

#[test]
fn given_global_search_fields_when_load_then_replaces_defaults() {
    let layers = layers(
        Some(
            r#"
[picker]
search_fields = ["excludes"]
"#,
        ),
        None,
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(settings.picker.search_fields, vec!["excludes"]);
}

#[test]
fn given_global_and_local_when_load_then_local_unions_with_global() {
    let layers = layers(
        Some(
            r#"
[picker]
search_fields = ["name", "includes"]
"#,
        ),
        Some(
            r#"
[picker]
search_fields = ["borderline", "!includes"]
"#,
        ),
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(settings.picker.search_fields, vec!["borderline", "name"]);
    let scope = settings.search_scope().unwrap();
    assert_eq!(scope.fields(), &[SearchField::Name, SearchField::Borderline]);
}

#[test]
fn given_local_negating_every_field_when_building_scope_then_config_error() {
    let layers = layers(
        None,
        Some(
            r#"
[picker]
search_fields = ["!code", "!name"]
"#,
        ),
    );

    let settings = load(&layers).expect("load settings");

    assert!(settings.picker.search_fields.is_empty());
    assert!(matches!(
        settings.search_scope(),
        Err(ApplicationError::Config { .. })
    ));
}

#[test]
fn given_unknown_search_field_when_building_scope_then_config_error() {
    let layers = layers(
        Some(
            r#"
[picker]
search_fields = ["colour"]
"#,
        ),
        None,
    );

    let settings = load(&layers).expect("load settings");

    assert!(matches!(
        settings.to_picker_config(),
        Err(ApplicationError::Config { .. })
    ));
}

// ============================================================
// Scalars
// ============================================================

#[test]
fn given_local_scalars_when_load_then_override_global() {
    let layers = layers(
        Some(
            r#"
source = "/srv/global.json"

[picker]
mode = "multiple"
sort = "name"
"#,
        ),
        Some(
            r#"
source = "/srv/local.json"

[picker]
policy = "prefix:H"
expand_all = true
"#,
        ),
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(settings.source, Some(PathBuf::from("/srv/local.json")));
    assert_eq!(settings.picker.mode, SelectionMode::Multiple);
    assert_eq!(settings.picker.sort, SortKey::Name);
    assert_eq!(
        settings.picker.policy,
        SelectionPolicy::CodePrefix("H".into())
    );
    assert!(settings.picker.expand_all);

    let config = settings.to_picker_config().unwrap();
    assert_eq!(config.mode, SelectionMode::Multiple);
    assert!(config.expand_all);
}

#[test]
fn given_source_with_env_reference_when_load_then_expanded() {
    std::env::set_var("CATPICK_TEST_DATA_ROOT", "/data/catalogs");
    let layers = layers(
        None,
        Some(r#"source = "${CATPICK_TEST_DATA_ROOT}/categories.json""#),
    );

    let settings = load(&layers).expect("load settings");

    assert_eq!(
        settings.source,
        Some(PathBuf::from("/data/catalogs/categories.json"))
    );
    std::env::remove_var("CATPICK_TEST_DATA_ROOT");
}

#[test]
fn given_invalid_policy_when_load_then_config_error() {
    let layers = layers(
        None,
        Some(
            r#"
[picker]
policy = "prefix:"
"#,
        ),
    );

    assert!(matches!(load(&layers), Err(ApplicationError::Config { .. })));
}

#[test]
fn given_malformed_toml_when_load_then_config_error_names_file() {
    let layers = layers(Some("[picker\nmode = "), None);

    match load(&layers) {
        Err(ApplicationError::Config { message }) => {
            assert!(message.contains("global.toml"), "message: {message}")
        }
        other => panic!("expected config error, got {other:?}"),
    }
}

// ============================================================
// Output
// ============================================================

#[test]
fn given_effective_settings_when_serializing_then_toml_reloads_identically() {
    let layers = layers(
        None,
        Some(
            r#"
[picker]
policy = "non-root-leaf"
search_fields = ["description"]
"#,
        ),
    );
    let settings = load(&layers).expect("load settings");

    let rendered = settings.to_toml().unwrap();
    let reloaded: Settings = toml::from_str(&rendered).unwrap();

    assert_eq!(reloaded, settings);
    assert!(rendered.contains("policy = \"non-root-leaf\""));
}

#[test]
fn given_template_when_parsed_then_yields_defaults() {
    let settings: Settings = toml::from_str(&Settings::template()).unwrap();
    assert_eq!(settings, Settings::default());
}
