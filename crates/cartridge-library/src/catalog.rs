//! A configured game system: its scanned tree plus gamelist store

use crate::LibraryError;
use crate::metadata::{MetaKey, Metadata};
use crate::scanner::{RomScanner, ScanConfig};
use crate::store::{CatalogStore, SaveOutcome};
use crate::tree::{NodeId, Tree};
use cartridge_config::{HardwareClass, LibrarySettings, SystemConfig};
use std::path::Path;
use tracing::{info, warn};

/// Platform tag that keeps a system out of automatic collections
const IGNORE_PLATFORM: &str = "ignore";

pub struct Catalog {
    config: SystemConfig,
    tree: Tree,
    store: CatalogStore,
}

impl Catalog {
    /// Scan `root`, then apply the persisted gamelist and any recovery
    /// fragments
    pub fn open(
        system: &SystemConfig,
        root: &Path,
        settings: &LibrarySettings,
    ) -> Result<Self, LibraryError> {
        let mut tree = if settings.parse_gamelist_only {
            let root = std::fs::canonicalize(root)
                .map_err(|_| LibraryError::PathNotFound(root.to_path_buf()))?;
            Tree::new(root)
        } else {
            let scanner =
                RomScanner::with_config(ScanConfig::for_system(system, settings.show_hidden_files));
            let (tree, result) = scanner.scan(root)?;
            if !result.errors.is_empty() {
                warn!(
                    "{}: {} directories could not be read",
                    system.name,
                    result.errors.len()
                );
            }
            tree
        };

        let document_path = settings.gamelist_path(&system.name, tree.root_path());
        let mut store = CatalogStore::new(
            &system.name,
            document_path,
            settings.parse_gamelist_only,
            settings.background_saves,
        );
        store.load(&mut tree);
        store.merge_recovery(&mut tree);

        let catalog = Self {
            config: system.clone(),
            tree,
            store,
        };
        info!(
            "System {} ready with {} games",
            catalog.name(),
            catalog.game_count()
        );
        Ok(catalog)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn full_name(&self) -> &str {
        self.config.display_name()
    }

    pub fn config(&self) -> &SystemConfig {
        &self.config
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn root_path(&self) -> &Path {
        self.tree.root_path()
    }

    pub fn store(&self) -> &CatalogStore {
        &self.store
    }

    pub fn theme_folder(&self) -> &str {
        self.config.theme_folder()
    }

    pub fn group(&self) -> Option<&str> {
        self.config.group.as_deref()
    }

    pub fn manufacturer(&self) -> &str {
        self.config.manufacturer.as_deref().unwrap_or("")
    }

    pub fn hardware(&self) -> HardwareClass {
        self.config.hardware
    }

    pub fn release_year(&self) -> Option<u16> {
        self.config.release_year
    }

    pub fn has_platform(&self, tag: &str) -> bool {
        self.config.has_platform(tag)
    }

    pub fn is_arcade(&self) -> bool {
        self.has_platform("arcade") || self.has_platform("neogeo")
    }

    /// Whether games of this system appear in automatic collections
    pub fn includes_in_auto_collections(&self) -> bool {
        self.config.auto_collections && !self.has_platform(IGNORE_PLATFORM)
    }

    pub fn game_count(&self) -> usize {
        self.tree.games().len()
    }

    /// Set one field. A change is recorded in a recovery fragment.
    pub fn set_metadata(&mut self, id: NodeId, key: MetaKey, value: &str) -> bool {
        self.update_metadata(id, |metadata| metadata.set(key, value))
    }

    /// Apply an edit; when `edit` reports a change the node is written to
    /// a recovery fragment
    pub fn update_metadata<F>(&mut self, id: NodeId, edit: F) -> bool
    where
        F: FnOnce(&mut Metadata) -> bool,
    {
        let Some(node) = self.tree.get_mut(id) else {
            return false;
        };
        if !edit(node.metadata_mut()) {
            return false;
        }
        if let Err(e) = self.store.write_fragment(&self.tree, id) {
            warn!("{}: cannot record edit: {}", self.config.name, e);
        }
        true
    }

    /// Write dirty metadata to the gamelist
    pub fn save(&mut self) -> SaveOutcome {
        self.store.save(&mut self.tree)
    }
}
