//! Catalog configuration document
//!
//! Enumerates the game systems known to the installation. Each `[[system]]`
//! table becomes one catalog rooted at `path`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{ConfigError, expand_home};

/// Hardware class of a system, used for display ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HardwareClass {
    #[default]
    Console,
    Portable,
    Computer,
    Arcade,
    /// Game engines and source ports
    Engine,
    Other,
}

impl HardwareClass {
    /// Sort rank, consoles first
    pub fn rank(self) -> u8 {
        match self {
            HardwareClass::Console => 0,
            HardwareClass::Portable => 1,
            HardwareClass::Computer => 2,
            HardwareClass::Arcade => 3,
            HardwareClass::Engine => 4,
            HardwareClass::Other => 5,
        }
    }

    /// Classes pushed to the end of an alphabetical listing when
    /// `sort_hardware_last` is enabled
    pub fn sorts_last(self) -> bool {
        matches!(self, HardwareClass::Engine | HardwareClass::Other)
    }
}

/// Configuration for a single game system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Short name (e.g., "snes")
    #[serde(default)]
    pub name: String,

    /// Display name (e.g., "Super Nintendo")
    #[serde(default)]
    pub fullname: Option<String>,

    /// Root directory; may start with `~/`
    #[serde(default)]
    pub path: String,

    /// Whitespace-delimited extension list, each with its leading dot
    #[serde(default)]
    pub extension: String,

    /// Launch command template
    #[serde(default)]
    pub command: String,

    /// Platform tags (e.g., "arcade", "snes", "ignore")
    #[serde(default)]
    pub platform: Vec<String>,

    /// Emulators or cores able to run this system
    #[serde(default)]
    pub emulators: Vec<String>,

    /// Group key; systems sharing a key are shown under one entry
    #[serde(default)]
    pub group: Option<String>,

    /// Theme folder override
    #[serde(default)]
    pub theme: Option<String>,

    #[serde(default)]
    pub manufacturer: Option<String>,

    #[serde(default)]
    pub hardware: HardwareClass,

    #[serde(default)]
    pub release_year: Option<u16>,

    /// Extra folder names the scanner must not descend into
    #[serde(default)]
    pub skip_folders: Vec<String>,

    /// Whether this system contributes to automatic collections
    #[serde(default = "default_true")]
    pub auto_collections: bool,
}

fn default_true() -> bool {
    true
}

impl SystemConfig {
    /// Display name, falling back to the short name
    pub fn display_name(&self) -> &str {
        self.fullname.as_deref().unwrap_or(&self.name)
    }

    /// Theme folder, falling back to the short name
    pub fn theme_folder(&self) -> &str {
        self.theme.as_deref().unwrap_or(&self.name)
    }

    /// Parsed, lowercased extension list. Entries lacking the leading dot
    /// are ignored.
    pub fn extensions(&self) -> Vec<String> {
        let mut extensions = Vec::new();
        for ext in self.extension.split_whitespace() {
            if !ext.starts_with('.') || ext.len() < 2 {
                tracing::warn!(
                    "Ignoring extension '{}' for system '{}': missing leading '.'",
                    ext,
                    self.name
                );
                continue;
            }
            let ext = ext.to_lowercase();
            if !extensions.contains(&ext) {
                extensions.push(ext);
            }
        }
        extensions
    }

    /// Root directory with `~` expanded
    pub fn root_path(&self) -> PathBuf {
        expand_home(&self.path)
    }

    /// Whether the platform list carries `tag` (case-insensitive)
    pub fn has_platform(&self, tag: &str) -> bool {
        self.platform.iter().any(|p| p.eq_ignore_ascii_case(tag))
    }

    /// Check required fields and that the root exists. Returns the
    /// resolved root path.
    pub fn validate(&self) -> Result<PathBuf, ConfigError> {
        let system = if self.name.is_empty() {
            "<unnamed>".to_string()
        } else {
            self.name.clone()
        };

        let required: [(&'static str, bool); 4] = [
            ("name", self.name.trim().is_empty()),
            ("path", self.path.trim().is_empty()),
            ("extension", self.extensions().is_empty()),
            ("command", self.command.trim().is_empty()),
        ];
        for (field, missing) in required {
            if missing {
                return Err(ConfigError::MissingField {
                    system: system.clone(),
                    field,
                });
            }
        }

        let root = self.root_path();
        if !root.is_dir() {
            return Err(ConfigError::NotFound(root));
        }
        Ok(root)
    }
}

/// The catalog configuration document (`systems.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default, rename = "system")]
    pub systems: Vec<SystemConfig>,
}

impl CatalogConfig {
    /// Load the document from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        tracing::info!(
            "Loaded {} system definitions from {}",
            config.systems.len(),
            path.display()
        );
        Ok(config)
    }

    /// Load from the default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        match crate::find_config_file(crate::SYSTEMS_FILE) {
            Some(path) => Self::load(&path),
            None => Err(ConfigError::NotFound(
                Path::new(crate::CONFIG_DIR).join(crate::SYSTEMS_FILE),
            )),
        }
    }

    /// Save the document to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Systems that pass validation, paired with their resolved root.
    /// Rejected systems are logged and skipped.
    pub fn valid_systems(&self) -> Vec<(&SystemConfig, PathBuf)> {
        self.systems
            .iter()
            .filter_map(|system| match system.validate() {
                Ok(root) => Some((system, root)),
                Err(e) => {
                    tracing::warn!("Rejecting system '{}': {}", system.name, e);
                    None
                }
            })
            .collect()
    }
}
