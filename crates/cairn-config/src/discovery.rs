//! Config file discovery.
//!
//! The config lives in a fixed per-user directory, never per project:
//! 1. `$CAIRN_CONFIG_DIR/config.toml` when the variable is set
//! 2. `~/.config/cairn/config.toml` (platform config dir) otherwise

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{CairnConfig, ConfigError, Result};

/// Default config filename within the user config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for directory resolution.
const APP_NAME: &str = "cairn";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "CAIRN_CONFIG_DIR";

/// Environment variable to override the data directory.
const DATA_DIR_ENV: &str = "CAIRN_DATA_DIR";

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The loaded configuration (empty when no file exists).
    pub config: CairnConfig,
    /// Path that was checked.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Load configuration from the per-user config directory.
pub fn load_config() -> Result<LoadedConfig> {
    load_config_with_options(None)
}

/// Load configuration with explicit control over the config directory.
///
/// `config_dir` overrides both `CAIRN_CONFIG_DIR` and the platform default.
/// A missing file yields an empty config; a malformed one is an error, since
/// silently ignoring it would hide the record store setting.
pub fn load_config_with_options(config_dir: Option<&Path>) -> Result<LoadedConfig> {
    let path = match config_dir {
        Some(dir) => dir.join(USER_CONFIG_FILE),
        None => user_config_path().ok_or_else(|| {
            ConfigError::Other(format!(
                "could not determine a config directory; set {CONFIG_DIR_ENV}"
            ))
        })?,
    };

    if !path.is_file() {
        warn!(path = %path.display(), "config file not found");
        return Ok(LoadedConfig {
            config: CairnConfig::new(),
            path,
            loaded: false,
        });
    }

    let config = load_config_file(&path)?;
    debug!(path = %path.display(), "config loaded");
    Ok(LoadedConfig {
        config,
        path,
        loaded: true,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<CairnConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    CairnConfig::from_toml(&contents)
}

/// Save configuration to a file.
///
/// Creates parent directories if they don't exist.
pub fn save_config(config: &CairnConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFile {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    let contents = config.to_toml()?;
    std::fs::write(path, contents).map_err(|e| ConfigError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(())
}

/// Path of the per-user config file.
pub fn user_config_path() -> Option<PathBuf> {
    user_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// The per-user config directory.
///
/// Checks `CAIRN_CONFIG_DIR` first, then falls back to the platform default.
pub fn user_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Directory for embedded backend files (graph, local semantic index).
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .map(|d| d.join(APP_NAME))
        .unwrap_or_else(|| PathBuf::from(".cairn-data"))
}
