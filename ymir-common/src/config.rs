//! Configuration loading
//!
//! Config file resolution priority:
//! 1. Explicit path (command-line `--config`)
//! 2. `YMIR_CONFIG` environment variable
//! 3. `~/.ymir/ymir.toml`, `./ymir.toml`, `/etc/ymir/ymir.toml`
//! 4. Compiled defaults
//!
//! A missing or malformed file never aborts startup: a warning is recorded in
//! the returned [`LoadedConfig`] and the compiled defaults are used instead. `YMIR_DB_FILE` and
//! `YMIR_MODELS_DIR` override the corresponding file values.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "YMIR_CONFIG";
/// Environment override for `[datastore] db_file`
pub const DB_FILE_ENV_VAR: &str = "YMIR_DB_FILE";
/// Environment override for `[models] models_dir`
pub const MODELS_DIR_ENV_VAR: &str = "YMIR_MODELS_DIR";

const CONFIG_FILE_NAME: &str = "ymir.toml";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub logging: LoggingConfig,
    pub datastore: DatastoreConfig,
    pub models: ModelsConfig,
    pub http: HttpConfig,
}

/// `[logging]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// `[datastore]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    pub db_file: String,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            db_file: "~/.ymir/ymir.db".to_string(),
        }
    }
}

/// `[models]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Canonical models directory
    pub models_dir: String,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            models_dir: "~/.ymir/models".to_string(),
        }
    }
}

/// `[http]` of the ymir server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub hostname: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            hostname: "0.0.0.0".to_string(),
            port: 8081,
        }
    }
}

impl TomlConfig {
    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Path of the embedded store, `~` expanded
    pub fn db_file(&self) -> PathBuf {
        expand_home(&self.datastore.db_file)
    }

    /// Canonical models directory, `~` expanded
    pub fn models_dir(&self) -> PathBuf {
        expand_home(&self.models.models_dir)
    }

    /// `hostname:port` of the ymir server
    pub fn server_host(&self) -> String {
        format!("{}:{}", self.http.hostname, self.http.port)
    }

    fn apply_env_overrides(&mut self, diagnostics: &mut Vec<Diagnostic>) {
        if let Ok(db_file) = std::env::var(DB_FILE_ENV_VAR) {
            if !db_file.trim().is_empty() {
                diagnostics.push(Diagnostic::info(format!(
                    "Datastore file overridden by {}",
                    DB_FILE_ENV_VAR
                )));
                self.datastore.db_file = db_file;
            }
        }
        if let Ok(models_dir) = std::env::var(MODELS_DIR_ENV_VAR) {
            if !models_dir.trim().is_empty() {
                diagnostics.push(Diagnostic::info(format!(
                    "Models directory overridden by {}",
                    MODELS_DIR_ENV_VAR
                )));
                self.models.models_dir = models_dir;
            }
        }
    }
}

/// Where the effective configuration came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Parsed from this file
    File(PathBuf),
    /// Compiled defaults (no file found, or the file was rejected)
    Defaults,
}

/// Severity of a message produced while loading the configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Info,
    Warn,
}

/// Message recorded while loading, emitted later by [`LoadedConfig::log_diagnostics`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    fn info(message: String) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            message,
        }
    }

    fn warn(message: String) -> Self {
        Self {
            level: DiagnosticLevel::Warn,
            message,
        }
    }
}

/// Result of configuration loading
///
/// Loading happens before logging is set up (the log level is itself a config
/// value), so messages are collected here and logged by the caller afterwards.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: TomlConfig,
    pub source: ConfigSource,
    pub diagnostics: Vec<Diagnostic>,
}

impl LoadedConfig {
    pub fn has_warnings(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warn)
    }

    /// Emit the collected messages through `tracing`
    pub fn log_diagnostics(&self) {
        for diagnostic in &self.diagnostics {
            match diagnostic.level {
                DiagnosticLevel::Info => info!("{}", diagnostic.message),
                DiagnosticLevel::Warn => warn!("{}", diagnostic.message),
            }
        }
    }
}

/// Resolve and load the configuration, falling back to defaults
pub fn load_config(cli_path: Option<&Path>) -> LoadedConfig {
    let mut diagnostics = Vec::new();

    let (mut config, source) = match locate(cli_path, &mut diagnostics) {
        Some(path) => match TomlConfig::from_file(&path) {
            Ok(config) => (config, ConfigSource::File(path)),
            Err(e) => {
                diagnostics.push(Diagnostic::warn(format!("{}. Continuing with defaults.", e)));
                (TomlConfig::default(), ConfigSource::Defaults)
            }
        },
        None => (TomlConfig::default(), ConfigSource::Defaults),
    };

    config.apply_env_overrides(&mut diagnostics);

    LoadedConfig {
        config,
        source,
        diagnostics,
    }
}

/// Find the config file following the documented priority order
pub fn locate_config_file(cli_path: Option<&Path>) -> Option<PathBuf> {
    locate(cli_path, &mut Vec::new())
}

fn locate(cli_path: Option<&Path>, diagnostics: &mut Vec<Diagnostic>) -> Option<PathBuf> {
    if let Some(path) = cli_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
        diagnostics.push(Diagnostic::warn(format!(
            "Config file {} not found",
            path.display()
        )));
        return None;
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        let path = expand_home(&path);
        if path.exists() {
            return Some(path);
        }
        diagnostics.push(Diagnostic::warn(format!(
            "Config file {} (from {}) not found",
            path.display(),
            CONFIG_ENV_VAR
        )));
        return None;
    }

    search_paths().into_iter().find(|p| p.exists())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".ymir").join(CONFIG_FILE_NAME));
    }
    paths.push(PathBuf::from(CONFIG_FILE_NAME));
    paths.push(PathBuf::from("/etc/ymir").join(CONFIG_FILE_NAME));
    paths
}

/// Expand a leading `~` to the user's home directory
pub fn expand_home(path: &str) -> PathBuf {
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
