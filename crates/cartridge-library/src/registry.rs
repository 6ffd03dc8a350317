//! The library registry
//!
//! `Library` owns every loaded catalog, the system groups, the collection
//! engine and the displayed list. It is built once with [`Library::init`]
//! and torn down once with [`Library::shutdown`]; dropping it without a
//! shutdown runs the same teardown.

use crate::catalog::Catalog;
use crate::collections::{CollectionEngine, ToggleOutcome};
use crate::events::{CatalogEvent, ChangeKind, EventBus};
use crate::metadata::{MetaKey, Metadata};
use crate::sorting::{DisplayEntry, compose_display};
use crate::store::SaveOutcome;
use crate::tree::{Node, NodeRef, Tree, TreeId};
use crate::{LibraryError, parallelism_enabled};
use cartridge_config::{CatalogConfig, LibrarySettings, SystemConfig};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use tracing::{debug, error, info, warn};

/// Alias chains are at most bundle -> collection -> system
const MAX_ALIAS_HOPS: usize = 4;

/// Answers whether the active theme carries a dedicated view for a folder
pub trait ThemeResolver {
    fn has_theme(&self, folder: &str) -> bool;
}

impl ThemeResolver for HashSet<String> {
    fn has_theme(&self, folder: &str) -> bool {
        self.contains(folder)
    }
}

/// Resolver for hosts without themes
#[derive(Debug, Clone, Copy, Default)]
pub struct NoThemes;

impl ThemeResolver for NoThemes {
    fn has_theme(&self, _folder: &str) -> bool {
        false
    }
}

/// Catalogs sharing a group key, shown as one entry
pub struct SystemGroup {
    name: String,
    tree: Tree,
    members: Vec<usize>,
}

impl SystemGroup {
    fn new(name: &str) -> Self {
        let mut tree = Tree::new_virtual(PathBuf::from(name));
        let root = tree.root();
        tree[root].metadata_mut().set(MetaKey::Name, name);
        Self {
            name: name.to_string(),
            tree,
            members: Vec::new(),
        }
    }

    fn add_member(&mut self, index: usize, catalog: &Catalog) {
        let root = self.tree.root();
        let target = NodeRef::new(TreeId::System(index), catalog.tree().root());
        self.tree
            .add_alias(root, target, catalog.root_path().to_path_buf());
        self.members.push(index);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Member catalog indices, in configuration order
    pub fn members(&self) -> &[usize] {
        &self.members
    }
}

pub struct Library {
    catalogs: Vec<Catalog>,
    groups: Vec<SystemGroup>,
    collections: CollectionEngine,
    display: Vec<DisplayEntry>,
    settings: LibrarySettings,
    events: EventBus,
    shut_down: bool,
}

impl Library {
    /// Load every valid system, then populate the enabled collections.
    /// Fails only when no system has any game.
    pub fn init(
        config: &CatalogConfig,
        settings: &LibrarySettings,
        themes: &dyn ThemeResolver,
    ) -> Result<Self, LibraryError> {
        let systems = config.valid_systems();
        let open = |(system, root): &(&SystemConfig, PathBuf)| open_catalog(system, root, settings);
        let catalogs: Vec<Catalog> = if systems.len() > 1 && parallelism_enabled(settings) {
            debug!("Loading {} systems in parallel", systems.len());
            systems.par_iter().filter_map(open).collect()
        } else {
            systems.iter().filter_map(open).collect()
        };

        if catalogs.is_empty() {
            error!("No systems with games were found");
            return Err(LibraryError::NoCatalogs);
        }

        let mut groups: Vec<SystemGroup> = Vec::new();
        for (i, catalog) in catalogs.iter().enumerate() {
            let Some(name) = catalog.group() else {
                continue;
            };
            let position = match groups.iter().position(|g| g.name == name) {
                Some(position) => position,
                None => {
                    groups.push(SystemGroup::new(name));
                    groups.len() - 1
                }
            };
            groups[position].add_member(i, catalog);
        }

        let mut collections = CollectionEngine::new(settings);
        let populated = collections.add_enabled_to_display(&catalogs, settings, themes);

        let mut library = Self {
            catalogs,
            groups,
            collections,
            display: Vec::new(),
            settings: settings.clone(),
            events: EventBus::new(),
            shut_down: false,
        };
        library.recompose();
        info!(
            "Library ready: {} systems, {} collections populated, {} entries displayed",
            library.catalogs.len(),
            populated,
            library.display.len()
        );
        Ok(library)
    }

    pub fn catalogs(&self) -> &[Catalog] {
        &self.catalogs
    }

    pub fn catalog(&self, name: &str) -> Option<(usize, &Catalog)> {
        self.catalogs
            .iter()
            .enumerate()
            .find(|(_, c)| c.name() == name)
    }

    pub fn groups(&self) -> &[SystemGroup] {
        &self.groups
    }

    pub fn collections(&self) -> &CollectionEngine {
        &self.collections
    }

    pub fn settings(&self) -> &LibrarySettings {
        &self.settings
    }

    /// The displayed list, in order
    pub fn display(&self) -> &[DisplayEntry] {
        &self.display
    }

    pub fn tree(&self, id: TreeId) -> Option<&Tree> {
        match id {
            TreeId::System(i) => self.catalogs.get(i).map(Catalog::tree),
            TreeId::Collection(i) => self.collections.instance(i).map(|c| c.tree()),
            TreeId::Bundle => Some(self.collections.bundle()),
            TreeId::Group(i) => self.groups.get(i).map(SystemGroup::tree),
        }
    }

    pub fn node(&self, target: NodeRef) -> Option<&Node> {
        self.tree(target.tree)?.get(target.node)
    }

    /// Follow aliases to the node that owns the data
    pub fn resolve(&self, target: NodeRef) -> Option<NodeRef> {
        let mut current = target;
        for _ in 0..=MAX_ALIAS_HOPS {
            match self.node(current)?.alias_target() {
                Some(next) => current = next,
                None => return Some(current),
            }
        }
        warn!("Alias chain too deep at {:?}", target);
        None
    }

    /// The resolved node's metadata
    pub fn metadata(&self, target: NodeRef) -> Option<&Metadata> {
        self.node(self.resolve(target)?).map(Node::metadata)
    }

    /// Tree shown for a displayed entry
    pub fn entry_tree(&self, entry: DisplayEntry) -> Option<TreeId> {
        match entry {
            DisplayEntry::System(i) => Some(TreeId::System(i)),
            DisplayEntry::Group(i) => Some(TreeId::Group(i)),
            DisplayEntry::Collection(i) => Some(TreeId::Collection(i)),
            DisplayEntry::Bundle => Some(TreeId::Bundle),
        }
        .filter(|id| self.tree(*id).is_some())
    }

    pub fn display_name(&self, entry: DisplayEntry) -> String {
        match entry {
            DisplayEntry::System(i) => self
                .catalogs
                .get(i)
                .map(|c| c.full_name().to_string())
                .unwrap_or_default(),
            DisplayEntry::Group(i) => self
                .groups
                .get(i)
                .map(|g| g.name.clone())
                .unwrap_or_default(),
            DisplayEntry::Collection(i) => self
                .collections
                .instance(i)
                .map(|c| c.decl().display_name.clone())
                .unwrap_or_default(),
            DisplayEntry::Bundle => self.collections.bundle_decl().display_name.clone(),
        }
    }

    /// Register a receiver for change notifications
    pub fn subscribe(&mut self) -> Receiver<CatalogEvent> {
        self.events.subscribe()
    }

    /// A game in a system tree, reached through any alias
    fn system_game(&self, target: NodeRef) -> Option<NodeRef> {
        let resolved = self.resolve(target)?;
        match resolved.tree {
            TreeId::System(_) if self.node(resolved)?.is_game() => Some(resolved),
            _ => None,
        }
    }

    /// Edit one field of a game. Returns whether anything changed.
    pub fn set_metadata(&mut self, target: NodeRef, key: MetaKey, value: &str) -> bool {
        self.edit(target, |metadata| metadata.set(key, value))
    }

    /// Record a launch: bump the play count and stamp the time
    pub fn mark_played(&mut self, target: NodeRef) -> bool {
        let now = chrono::Local::now().naive_local();
        self.edit(target, |metadata| {
            let count = metadata.play_count().saturating_add(1);
            metadata.set(MetaKey::PlayCount, count.to_string());
            metadata.set_last_played(now);
            true
        })
    }

    fn edit<F>(&mut self, target: NodeRef, edit: F) -> bool
    where
        F: FnOnce(&mut Metadata) -> bool,
    {
        let Some(game) = self.system_game(target) else {
            debug!("Ignoring edit of {:?}: not a game", target);
            return false;
        };
        let TreeId::System(system) = game.tree else {
            return false;
        };
        if !self.catalogs[system].update_metadata(game.node, edit) {
            return false;
        }

        let mut events = vec![CatalogEvent::new(game, ChangeKind::MetadataChanged)];
        events.extend(
            self.collections
                .refresh_after_edit(game, &self.catalogs, &self.settings),
        );
        self.events.publish_all(events);
        self.recompose();
        true
    }

    /// Toggle a game in the collection being edited, or its favorite flag
    /// when no custom collection is being edited
    pub fn toggle_membership(&mut self, target: NodeRef) -> Option<ToggleOutcome> {
        let game = self.system_game(target)?;

        if let Some(name) = self.collections.editing() {
            let index = self.collections.custom(name)?;
            let (outcome, events) =
                self.collections
                    .toggle_custom(index, game, &self.catalogs, &self.settings)?;
            self.events.publish_all(events);
            self.recompose();
            return Some(outcome);
        }

        let favorite = !self.node(game)?.metadata().favorite();
        self.set_metadata(game, MetaKey::Favorite, &favorite.to_string());
        Some(if favorite {
            ToggleOutcome::Added
        } else {
            ToggleOutcome::Removed
        })
    }

    /// Select the custom collection that membership toggles target
    pub fn set_editing(&mut self, name: Option<&str>) -> Result<(), LibraryError> {
        self.collections.set_editing(name)
    }

    pub fn create_custom(
        &mut self,
        name: &str,
        themes: &dyn ThemeResolver,
    ) -> Result<usize, LibraryError> {
        let index = self.collections.create_custom(name, &self.settings, themes)?;
        self.recompose();
        Ok(index)
    }

    pub fn delete_custom(&mut self, name: &str) -> Result<(), LibraryError> {
        self.collections.delete_custom(name, &self.settings)?;
        self.recompose();
        Ok(())
    }

    /// Show or hide a collection, populating it when first shown
    pub fn set_collection_enabled(
        &mut self,
        index: usize,
        enabled: bool,
        themes: &dyn ThemeResolver,
    ) -> bool {
        let changed = self.collections.set_enabled(
            index,
            enabled,
            &self.catalogs,
            &self.settings,
            themes,
        );
        if changed {
            self.recompose();
        }
        changed
    }

    /// Change the hidden system list. Automatic collections are rebuilt
    /// unless hidden systems keep contributing to them.
    pub fn set_hidden_systems(&mut self, hidden: Vec<String>) {
        self.settings.hidden_systems = hidden;
        if !self.settings.hidden_systems_in_collections {
            let events = self
                .collections
                .reload_automatic(&self.catalogs, &self.settings);
            self.events.publish_all(events);
        }
        self.recompose();
    }

    fn recompose(&mut self) {
        self.display = compose_display(
            &self.catalogs,
            &self.groups,
            &self.collections,
            &self.settings,
        );
    }

    /// Persist custom collections and every catalog's dirty metadata.
    /// Returns the number of documents written.
    pub fn save_all(&mut self) -> usize {
        let mut written = self.collections.save_custom_collections(&self.settings);
        for catalog in &mut self.catalogs {
            match catalog.save() {
                SaveOutcome::Written { .. } => written += 1,
                SaveOutcome::Failed => warn!("{}: gamelist not saved", catalog.name()),
                SaveOutcome::Clean | SaveOutcome::Unchanged => {}
            }
        }
        written
    }

    /// Save everything and release the catalogs
    pub fn shutdown(mut self) -> usize {
        self.teardown()
    }

    fn teardown(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;
        let written = self.save_all();
        info!("Library shut down, {} documents written", written);
        written
    }
}

impl Drop for Library {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn open_catalog(
    system: &SystemConfig,
    root: &std::path::Path,
    settings: &LibrarySettings,
) -> Option<Catalog> {
    match Catalog::open(system, root, settings) {
        Ok(catalog) if catalog.game_count() > 0 => Some(catalog),
        Ok(catalog) => {
            info!("System {} has no games, skipping", catalog.name());
            None
        }
        Err(e) => {
            warn!("Failed to load system {}: {}", system.name, e);
            None
        }
    }
}
