//! Configuration loading and root folder resolution
//!
//! Bootstrap configuration only: where the root folder lives, which port to
//! bind, and how to log. Engine tuning lives with the engine crate.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable consulted for the root folder
pub const ROOT_FOLDER_ENV: &str = "BRICKMAP_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "brickmap.db";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TomlConfig {
    /// Root folder holding the database (optional)
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP port override (optional)
    #[serde(default)]
    pub port: Option<u16>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Load a TOML bootstrap file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Locate the bootstrap config file for the platform, if one exists
///
/// Linux checks `~/.config/brickmap/config.toml` then `/etc/brickmap/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("brickmap").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/brickmap/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Standard user-agent for outbound catalog requests
pub fn get_user_agent() -> String {
    format!("BrickMap/{} (+https://github.com/brickmap/brickmap)", env!("CARGO_PKG_VERSION"))
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable (`BRICKMAP_ROOT_FOLDER`)
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_config: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_config: None,
        }
    }

    /// Supply the command-line value (highest priority)
    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    /// Supply an already-loaded TOML config instead of searching for one
    pub fn with_toml_config(mut self, config: TomlConfig) -> Self {
        self.toml_config = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            debug!(module = %self.module_name, "Root folder from command line");
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                debug!(module = %self.module_name, "Root folder from {}", ROOT_FOLDER_ENV);
                return PathBuf::from(path);
            }
        }

        let toml_root = match &self.toml_config {
            Some(config) => config.root_folder.clone(),
            None => config_file_path().and_then(|path| match load_toml_config(&path) {
                Ok(config) => config.root_folder,
                Err(e) => {
                    warn!(module = %self.module_name, "Ignoring unreadable config file: {}", e);
                    None
                }
            }),
        };
        if let Some(path) = toml_root {
            debug!(module = %self.module_name, "Root folder from TOML config");
            return path;
        }

        default_root_folder()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/brickmap (or /var/lib/brickmap for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("brickmap"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/brickmap"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("brickmap"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/brickmap"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("brickmap"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\brickmap"))
    } else {
        PathBuf::from("./brickmap_data")
    }
}

/// Creates the root folder and derives file locations inside it
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_defaults() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.level, "info");
        assert!(logging.file.is_none());
    }

    #[test]
    fn test_toml_partial_document() {
        let config: TomlConfig = toml::from_str("port = 6100\n").unwrap();
        assert_eq!(config.port, Some(6100));
        assert!(config.root_folder.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_database_path_inside_root() {
        let init = RootFolderInitializer::new(PathBuf::from("/tmp/brickmap-root"));
        assert_eq!(init.database_path(), PathBuf::from("/tmp/brickmap-root/brickmap.db"));
    }

    #[test]
    fn test_cli_arg_wins() {
        let resolver = RootFolderResolver::new("test")
            .with_cli_arg(Some(PathBuf::from("/from/cli")))
            .with_toml_config(TomlConfig {
                root_folder: Some(PathBuf::from("/from/toml")),
                ..Default::default()
            });
        assert_eq!(resolver.resolve(), PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_user_agent_has_version() {
        assert!(get_user_agent().starts_with("BrickMap/"));
    }
}
