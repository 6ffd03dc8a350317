//! Configuration management for Cartridge
//!
//! Handles the catalog configuration document (which game systems exist and
//! where their files live) and the library settings consumed by the catalog
//! core. Both are TOML files; settings may additionally be overridden from
//! the environment.

mod catalogs;
mod settings;

pub use catalogs::{CatalogConfig, HardwareClass, SystemConfig};
pub use settings::{LibrarySettings, SortMode};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Missing required field '{field}' for system '{system}'")]
    MissingField { system: String, field: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
}

/// Standard configuration paths
pub const CONFIG_DIR: &str = "/etc/cartridge";
pub const USER_CONFIG_DIR: &str = ".cartridge";

/// Name of the catalog configuration document
pub const SYSTEMS_FILE: &str = "systems.toml";

/// Name of the settings document
pub const SETTINGS_FILE: &str = "settings.toml";

/// User configuration directory (`~/.cartridge`)
pub fn user_config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(USER_CONFIG_DIR))
}

/// Locate a configuration file, preferring the user directory over the
/// system directory.
pub fn find_config_file(file_name: &str) -> Option<PathBuf> {
    if let Some(user_dir) = user_config_dir() {
        let candidate = user_dir.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let system = Path::new(CONFIG_DIR).join(file_name);
    system.exists().then_some(system)
}

/// Expand a leading `~` to the user's home directory.
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
