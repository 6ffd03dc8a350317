//! Shared fixtures for the library integration tests
#![allow(dead_code)]

use cartridge_config::{CatalogConfig, LibrarySettings, SystemConfig};
use cartridge_library::{Library, NodeId, NodeRef, TreeId};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A throwaway ROM tree under a canonical temp directory
pub struct TestEnv {
    temp_dir: TempDir,
    pub root: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let root = fs::canonicalize(temp_dir.path()).expect("Failed to resolve temp directory");
        Self { temp_dir, root }
    }

    /// Root directory of a system, created on demand
    pub fn system_dir(&self, system: &str) -> PathBuf {
        let dir = self.root.join("roms").join(system);
        fs::create_dir_all(&dir).expect("Failed to create system directory");
        dir
    }

    /// Create a ROM file at `relative` below the system directory
    pub fn rom(&self, system: &str, relative: &str) -> PathBuf {
        let path = self.system_dir(system).join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create ROM directory");
        }
        fs::write(&path, b"FAKE_ROM_DATA").expect("Failed to create test ROM");
        path
    }

    pub fn system(&self, name: &str) -> SystemConfig {
        SystemConfig {
            name: name.to_string(),
            path: self.system_dir(name).to_string_lossy().to_string(),
            extension: ".rom".to_string(),
            command: "run %ROM%".to_string(),
            platform: vec![name.to_string()],
            auto_collections: true,
            ..Default::default()
        }
    }

    pub fn config(&self, systems: &[&str]) -> CatalogConfig {
        CatalogConfig {
            systems: systems.iter().map(|name| self.system(name)).collect(),
        }
    }

    /// Deterministic settings: inline fragment writes, sequential population
    pub fn settings(&self) -> LibrarySettings {
        LibrarySettings {
            collections_dir: self.root.join("collections"),
            roms_base: self.root.clone(),
            background_saves: false,
            parallel_population: false,
            ..Default::default()
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }
}

/// Reference to the game at `path` in the named system
pub fn game_ref(library: &Library, system: &str, path: &Path) -> NodeRef {
    let (index, catalog) = library.catalog(system).expect("system not loaded");
    let id: NodeId = catalog.tree().find(path).expect("game not scanned");
    NodeRef::new(TreeId::System(index), id)
}

/// Member paths of an automatic collection
pub fn members(library: &Library, key: &str) -> Vec<PathBuf> {
    let collections = library.collections();
    let index = collections.automatic(key).expect("unknown collection");
    collections.instances()[index].member_paths()
}
