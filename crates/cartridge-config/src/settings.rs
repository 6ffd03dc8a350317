//! Library settings
//!
//! Key-value settings read by the catalog core. They are owned by the
//! frontend's settings component; the core only reads them.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::ConfigError;

/// Ordering applied to the displayed list of catalogs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Declaration order
    #[default]
    None,
    Alphabetical,
    Manufacturer,
    Hardware,
    ReleaseDecade,
}

/// Settings consumed by the catalog, persistence and collection layers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibrarySettings {
    /// Enabled automatic collections, by key
    pub auto_collections: Vec<String>,

    /// Enabled custom collections, by name
    pub custom_collections: Vec<String>,

    /// Systems hidden from the displayed list
    pub hidden_systems: Vec<String>,

    pub sort_mode: SortMode,

    /// Push engine/other hardware classes to the end of alphabetical lists
    pub sort_hardware_last: bool,

    /// The custom collections bundle sorts first among collections
    pub bundle_first: bool,

    /// Group un-themed custom collections under one bundle entry
    pub bundle_custom_collections: bool,

    /// Let hidden systems still contribute games to collections
    pub hidden_systems_in_collections: bool,

    /// Scan hidden files and folders
    pub show_hidden_files: bool,

    /// Include games flagged hidden in collections
    pub show_hidden_games: bool,

    /// Trust the persisted gamelist without checking files exist
    pub parse_gamelist_only: bool,

    /// Write recovery fragments off the calling thread
    pub background_saves: bool,

    /// Populate catalogs and collections on a worker pool
    pub parallel_population: bool,

    /// Directory holding custom collection membership files
    pub collections_dir: PathBuf,

    /// Base directory for relative collection membership entries
    pub roms_base: PathBuf,

    /// Store gamelists under `<dir>/<system>/` instead of the system root
    pub gamelists_dir: Option<PathBuf>,
}

fn default_user_dir() -> PathBuf {
    crate::user_config_dir().unwrap_or_else(|| PathBuf::from(crate::USER_CONFIG_DIR))
}

fn default_roms_base() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("roms"))
        .unwrap_or_else(|| PathBuf::from("/roms"))
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            auto_collections: vec![
                "all".to_string(),
                "favorites".to_string(),
                "recent".to_string(),
            ],
            custom_collections: Vec::new(),
            hidden_systems: Vec::new(),
            sort_mode: SortMode::default(),
            sort_hardware_last: false,
            bundle_first: true,
            bundle_custom_collections: true,
            hidden_systems_in_collections: false,
            show_hidden_files: false,
            show_hidden_games: false,
            parse_gamelist_only: false,
            background_saves: true,
            parallel_population: true,
            collections_dir: default_user_dir().join("collections"),
            roms_base: default_roms_base(),
            gamelists_dir: None,
        }
    }
}

impl LibrarySettings {
    /// Load settings from a TOML file, overlaid with `CARTRIDGE_*`
    /// environment variables. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_str = path.to_string_lossy();
        let settings = config::Config::builder()
            .add_source(config::File::new(&path_str, config::FileFormat::Toml).required(false))
            .add_source(
                config::Environment::with_prefix("CARTRIDGE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("auto_collections")
                    .with_list_parse_key("custom_collections")
                    .with_list_parse_key("hidden_systems"),
            )
            .build()?;

        let settings: Self = settings.try_deserialize()?;
        tracing::debug!("Settings loaded from {}", path.display());
        Ok(settings)
    }

    /// Load settings from the default locations
    pub fn load_default() -> Result<Self, ConfigError> {
        match crate::find_config_file(crate::SETTINGS_FILE) {
            Some(path) => Self::load(&path),
            None => {
                tracing::warn!("No settings file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save settings to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        tracing::info!("Settings saved to {}", path.display());
        Ok(())
    }

    pub fn is_system_hidden(&self, name: &str) -> bool {
        self.hidden_systems.iter().any(|s| s == name)
    }

    pub fn is_auto_collection_enabled(&self, key: &str) -> bool {
        self.auto_collections.iter().any(|k| k == key)
    }

    pub fn is_custom_collection_enabled(&self, name: &str) -> bool {
        self.custom_collections.iter().any(|k| k == name)
    }

    /// Gamelist location for a system rooted at `root`
    pub fn gamelist_path(&self, system: &str, root: &Path) -> PathBuf {
        match &self.gamelists_dir {
            Some(dir) => dir.join(system).join("gamelist.xml"),
            None => root.join("gamelist.xml"),
        }
    }
}
