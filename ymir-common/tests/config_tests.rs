//! Configuration resolution and graceful degradation
//!
//! Tests that touch YMIR_* environment variables are marked #[serial] so they
//! never run in parallel with each other.

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use ymir_common::config::{
    load_config, locate_config_file, ConfigSource, DiagnosticLevel, TomlConfig, CONFIG_ENV_VAR,
    DB_FILE_ENV_VAR, MODELS_DIR_ENV_VAR,
};

fn clear_env() {
    env::remove_var(CONFIG_ENV_VAR);
    env::remove_var(DB_FILE_ENV_VAR);
    env::remove_var(MODELS_DIR_ENV_VAR);
}

#[test]
#[serial]
fn test_explicit_config_file_is_loaded() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ymir.toml");
    std::fs::write(
        &path,
        r#"
[datastore]
db_file = "/data/ymir.db"

[models]
models_dir = "/data/models"

[http]
hostname = "printhost"
port = 9090
"#,
    )
    .unwrap();

    let loaded = load_config(Some(&path));
    assert_eq!(loaded.source, ConfigSource::File(path.clone()));
    assert!(!loaded.has_warnings());

    let config = loaded.config;
    assert_eq!(config.db_file(), PathBuf::from("/data/ymir.db"));
    assert_eq!(config.models_dir(), PathBuf::from("/data/models"));
    assert_eq!(config.server_host(), "printhost:9090");
}

#[test]
#[serial]
fn test_missing_explicit_file_falls_back_to_defaults() {
    clear_env();
    let loaded = load_config(Some(&PathBuf::from("/nonexistent/ymir.toml")));
    assert_eq!(loaded.config, TomlConfig::default());
    assert_eq!(loaded.source, ConfigSource::Defaults);
    assert!(loaded.has_warnings());
}

#[test]
#[serial]
fn test_malformed_file_falls_back_to_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "[http\nport = ").unwrap();

    let loaded = load_config(Some(&path));
    assert_eq!(loaded.config, TomlConfig::default());

    // The rejected file is not reported as the active source
    assert_eq!(loaded.source, ConfigSource::Defaults);
    let warning = loaded
        .diagnostics
        .iter()
        .find(|d| d.level == DiagnosticLevel::Warn)
        .expect("parse failure should be reported");
    assert!(warning.message.contains("broken.toml"));
    assert!(warning.message.contains("Continuing with defaults"));
}

#[test]
#[serial]
fn test_env_var_selects_config_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("from-env.toml");
    std::fs::write(&path, "[logging]\nlevel = \"debug\"\n").unwrap();
    env::set_var(CONFIG_ENV_VAR, &path);

    assert_eq!(locate_config_file(None), Some(path.clone()));
    let loaded = load_config(None);
    assert_eq!(loaded.config.logging.level, "debug");
    assert_eq!(loaded.source, ConfigSource::File(path.clone()));

    clear_env();
}

#[test]
#[serial]
fn test_env_overrides_take_priority_over_file() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("ymir.toml");
    std::fs::write(&path, "[models]\nmodels_dir = \"/from/file\"\n").unwrap();
    env::set_var(MODELS_DIR_ENV_VAR, "/from/env");
    env::set_var(DB_FILE_ENV_VAR, "/from/env/ymir.db");

    let loaded = load_config(Some(&path));
    assert_eq!(loaded.config.models_dir(), PathBuf::from("/from/env"));
    assert_eq!(loaded.config.db_file(), PathBuf::from("/from/env/ymir.db"));
    assert!(loaded
        .diagnostics
        .iter()
        .any(|d| d.message.contains(MODELS_DIR_ENV_VAR)));

    clear_env();
}
