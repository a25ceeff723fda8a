//! Import settings resolution
//!
//! Each setting resolves in priority order: command-line value, then the
//! loaded `TomlConfig` (which already carries the environment overrides).

use std::path::PathBuf;
use tracing::info;
use ymir_common::config::{expand_home, TomlConfig};

/// Command-line values that may override the config file
#[derive(Debug, Clone, Default)]
pub struct ImportOverrides {
    pub models_dir: Option<String>,
    pub ymir_host: Option<String>,
    pub db_file: Option<String>,
}

/// Fully resolved settings of one import run
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    /// Canonical models directory
    pub models_dir: PathBuf,
    /// `hostname:port` or URL of the ymir server
    pub ymir_host: String,
    /// Local store used when the server is unreachable
    pub db_file: PathBuf,
}

impl ImportSettings {
    pub fn resolve(config: &TomlConfig, overrides: &ImportOverrides) -> Self {
        let models_dir = match non_empty(&overrides.models_dir) {
            Some(dir) => {
                info!("Models directory from command line: {}", dir);
                expand_home(dir)
            }
            None => config.models_dir(),
        };

        let ymir_host = match non_empty(&overrides.ymir_host) {
            Some(host) => {
                info!("ymir host from command line: {}", host);
                host.to_string()
            }
            None => config.server_host(),
        };

        let db_file = match non_empty(&overrides.db_file) {
            Some(file) => expand_home(file),
            None => config.db_file(),
        };

        Self {
            models_dir,
            ymir_host,
            db_file,
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
