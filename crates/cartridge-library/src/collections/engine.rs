//! Collection orchestration
//!
//! Owns every collection instance plus the bundle that groups un-themed
//! custom collections. Instance positions are the `TreeId::Collection`
//! indices handed out in node references; automatic collections come first
//! in declaration order, custom ones follow sorted by name.

use super::custom::{self, SharedPathIndex};
use super::declarations::{BUNDLE_KEY, CollectionDecl, CollectionKind, SortOrder, declare_builtins};
use super::filter_index::FilterIndex;
use super::instance::{CollectionInstance, PopulateContext, includes, leaf, system_contributes};
use crate::catalog::Catalog;
use crate::events::{CatalogEvent, ChangeKind};
use crate::metadata::MetaKey;
use crate::registry::ThemeResolver;
use crate::tree::{NodeRef, Tree, TreeId};
use crate::{LibraryError, parallelism_enabled};
use cartridge_config::LibrarySettings;
use rayon::prelude::*;
use std::io;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Result of a membership toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
}

pub struct CollectionEngine {
    instances: Vec<CollectionInstance>,
    bundle_decl: CollectionDecl,
    bundle: Tree,
    bundle_filter: FilterIndex,
    bundled: Vec<usize>,
    editing: Option<String>,
    collections_dir: PathBuf,
}

impl CollectionEngine {
    /// Declare the built-in collections and discover custom ones. Nothing
    /// is populated yet.
    pub fn new(settings: &LibrarySettings) -> Self {
        let collections_dir = settings.collections_dir.clone();
        let mut instances = Vec::new();
        for decl in declare_builtins() {
            if decl.key == BUNDLE_KEY {
                continue;
            }
            let enabled = settings.is_auto_collection_enabled(&decl.key);
            let root = collections_dir.join(&decl.key);
            instances.push(CollectionInstance::new(decl, root, enabled));
        }

        let mut names = custom::discover(&collections_dir);
        for name in &settings.custom_collections {
            if !names.contains(name) {
                names.push(name.clone());
            }
        }
        names.sort();
        for name in &names {
            let enabled = settings.is_custom_collection_enabled(name);
            instances.push(CollectionInstance::custom(name, &collections_dir, enabled));
        }

        let bundle_decl = CollectionDecl::bundle();
        let mut bundle = Tree::new_virtual(collections_dir.join(BUNDLE_KEY));
        let root = bundle.root();
        bundle[root]
            .metadata_mut()
            .set(MetaKey::Name, bundle_decl.display_name.as_str());

        debug!(
            "Declared {} collections ({} custom)",
            instances.len(),
            names.len()
        );
        Self {
            instances,
            bundle_decl,
            bundle,
            bundle_filter: FilterIndex::new(),
            bundled: Vec::new(),
            editing: None,
            collections_dir,
        }
    }

    pub fn instances(&self) -> &[CollectionInstance] {
        &self.instances
    }

    pub fn instance(&self, index: usize) -> Option<&CollectionInstance> {
        self.instances.get(index)
    }

    /// Position of an automatic collection by key
    pub fn automatic(&self, key: &str) -> Option<usize> {
        self.instances
            .iter()
            .position(|i| !i.is_custom() && i.key() == key)
    }

    /// Position of a custom collection by name
    pub fn custom(&self, name: &str) -> Option<usize> {
        self.instances
            .iter()
            .position(|i| i.is_custom() && i.key() == name)
    }

    pub fn bundle(&self) -> &Tree {
        &self.bundle
    }

    pub fn bundle_decl(&self) -> &CollectionDecl {
        &self.bundle_decl
    }

    pub fn bundle_filter(&self) -> &FilterIndex {
        &self.bundle_filter
    }

    /// Custom collections shown inside the bundle
    pub fn bundled(&self) -> &[usize] {
        &self.bundled
    }

    /// Whether the bundle appears in the displayed list
    pub fn shows_bundle(&self) -> bool {
        !self.bundle.is_empty() || self.bundle_decl.display_if_empty
    }

    /// Collections displayed as their own entries
    pub fn top_level(&self) -> Vec<usize> {
        self.instances
            .iter()
            .enumerate()
            .filter(|(i, inst)| {
                inst.is_enabled()
                    && inst.is_populated()
                    && !self.bundled.contains(i)
                    && (!inst.is_empty() || inst.decl().display_if_empty)
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn editing(&self) -> Option<&str> {
        self.editing.as_deref()
    }

    /// Select the custom collection membership toggles apply to
    pub fn set_editing(&mut self, name: Option<&str>) -> Result<(), LibraryError> {
        match name {
            Some(name) => {
                if self.custom(name).is_none() {
                    return Err(LibraryError::CollectionNotFound(name.to_string()));
                }
                info!("Editing collection {}", name);
                self.editing = Some(name.to_string());
            }
            None => self.editing = None,
        }
        Ok(())
    }

    /// Populate every enabled collection that is not populated yet, then
    /// lay out the bundle. Returns how many collections were populated.
    pub fn add_enabled_to_display(
        &mut self,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
        themes: &dyn ThemeResolver,
    ) -> usize {
        let needs_paths = self
            .instances
            .iter()
            .any(|i| i.is_custom() && i.is_enabled() && !i.is_populated());
        let paths = if needs_paths {
            self.shared_path_index(catalogs, settings)
        } else {
            SharedPathIndex::default()
        };

        let ctx = PopulateContext {
            catalogs,
            settings,
            paths: &paths,
        };
        let mut pending: Vec<&mut CollectionInstance> = self
            .instances
            .iter_mut()
            .filter(|i| i.is_enabled() && !i.is_populated())
            .collect();
        let count = pending.len();

        if count > 1 && parallelism_enabled(settings) {
            debug!("Populating {} collections in parallel", count);
            pending.par_iter_mut().for_each(|instance| {
                instance.ensure_populated(&ctx);
            });
        } else {
            for instance in pending.iter_mut() {
                instance.ensure_populated(&ctx);
            }
        }

        for instance in self.instances.iter_mut().filter(|i| i.is_custom()) {
            let themed = themes.has_theme(&instance.decl().theme_folder);
            instance.set_themed(themed);
        }
        self.rebuild_bundle(settings);
        count
    }

    /// Enable or disable a collection. A newly enabled collection is
    /// populated on the spot. Returns whether the state changed.
    pub fn set_enabled(
        &mut self,
        index: usize,
        enabled: bool,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
        themes: &dyn ThemeResolver,
    ) -> bool {
        let Some(instance) = self.instances.get_mut(index) else {
            return false;
        };
        if instance.is_enabled() == enabled {
            return false;
        }
        instance.set_enabled(enabled);
        info!(
            "Collection {} {}",
            instance.key(),
            if enabled { "enabled" } else { "disabled" }
        );
        self.add_enabled_to_display(catalogs, settings, themes);
        true
    }

    /// Path index over the "all games" collection, populating it first if
    /// needed even when it is not displayed
    fn shared_path_index(
        &mut self,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
    ) -> SharedPathIndex {
        let Some(all) = self
            .instances
            .iter()
            .position(|i| i.decl().kind == CollectionKind::All)
        else {
            return SharedPathIndex::default();
        };
        let empty = SharedPathIndex::default();
        let ctx = PopulateContext {
            catalogs,
            settings,
            paths: &empty,
        };
        self.instances[all].ensure_populated(&ctx);
        SharedPathIndex::from_collection(&self.instances[all])
    }

    /// Lay out the bundle: one alias per bundled custom collection root
    pub fn rebuild_bundle(&mut self, settings: &LibrarySettings) {
        self.bundle.clear();
        self.bundle_filter.clear();
        self.bundled.clear();
        if !settings.bundle_custom_collections {
            return;
        }

        let root = self.bundle.root();
        for (i, instance) in self.instances.iter().enumerate() {
            if !instance.is_custom()
                || !instance.is_enabled()
                || !instance.is_populated()
                || instance.is_themed()
            {
                continue;
            }
            let tree = instance.tree();
            self.bundle.add_alias(
                root,
                NodeRef::new(TreeId::Collection(i), tree.root()),
                tree.root_path().to_path_buf(),
            );
            self.bundle_filter.import(instance.filter());
            self.bundled.push(i);
        }
    }

    fn rebuild_bundle_filter(&mut self) {
        self.bundle_filter.clear();
        for i in &self.bundled {
            if let Some(instance) = self.instances.get(*i) {
                self.bundle_filter.import(instance.filter());
            }
        }
    }

    /// Re-evaluate every populated collection for one edited game
    pub fn refresh_after_edit(
        &mut self,
        target: NodeRef,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
    ) -> Vec<CatalogEvent> {
        let mut events = Vec::new();
        let TreeId::System(system) = target.tree else {
            return events;
        };
        let (Some(catalog), Some(node)) = (catalogs.get(system), leaf(catalogs, target)) else {
            return events;
        };
        let contributes = system_contributes(catalog, settings);
        let mut bundle_touched = false;

        for (i, instance) in self.instances.iter_mut().enumerate() {
            if !instance.is_populated() {
                continue;
            }
            let tree_id = TreeId::Collection(i);
            let root = instance.tree().root();
            let present = instance.member(node.path());

            if instance.is_custom() {
                if let Some(alias) = present {
                    instance.refresh_member(node);
                    instance.update_derived_metadata(catalogs);
                    events.push(CatalogEvent::new(
                        NodeRef::new(tree_id, alias),
                        ChangeKind::MetadataChanged,
                    ));
                    bundle_touched = true;
                }
                continue;
            }

            let wanted = contributes && includes(instance.decl().kind, catalog, node, settings);
            match (present, wanted) {
                (Some(alias), true) => {
                    instance.refresh_member(node);
                    events.push(CatalogEvent::new(
                        NodeRef::new(tree_id, alias),
                        ChangeKind::MetadataChanged,
                    ));
                    if instance.decl().default_sort == SortOrder::LastPlayedDescending {
                        instance.sort_members(catalogs);
                        events.push(CatalogEvent::new(
                            NodeRef::new(tree_id, root),
                            ChangeKind::Sorted,
                        ));
                    }
                }
                (Some(alias), false) => {
                    instance.remove_member(node.path());
                    events.push(CatalogEvent::new(
                        NodeRef::new(tree_id, alias),
                        ChangeKind::Removed,
                    ));
                    let refilled = instance.backfill(catalogs, settings);
                    if !refilled.is_empty() {
                        events.extend(refilled.into_iter().map(|id| {
                            CatalogEvent::new(NodeRef::new(tree_id, id), ChangeKind::Added)
                        }));
                        events.push(CatalogEvent::new(
                            NodeRef::new(tree_id, root),
                            ChangeKind::Sorted,
                        ));
                    }
                }
                (None, true) => {
                    let Some(added) = instance.add_member(target, node) else {
                        continue;
                    };
                    instance.sort_members(catalogs);
                    let trimmed = instance.enforce_cap();
                    for id in trimmed.iter().filter(|id| **id != added) {
                        events.push(CatalogEvent::new(
                            NodeRef::new(tree_id, *id),
                            ChangeKind::Removed,
                        ));
                    }
                    if !trimmed.contains(&added) {
                        events.push(CatalogEvent::new(
                            NodeRef::new(tree_id, added),
                            ChangeKind::Added,
                        ));
                        events.push(CatalogEvent::new(
                            NodeRef::new(tree_id, root),
                            ChangeKind::Sorted,
                        ));
                    }
                }
                (None, false) => {}
            }
        }

        if bundle_touched {
            self.rebuild_bundle_filter();
        }
        events
    }

    /// Add or remove a game in one custom collection. A collection that was
    /// never populated reads its membership file first so the next save
    /// keeps the existing members.
    pub fn toggle_custom(
        &mut self,
        index: usize,
        target: NodeRef,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
    ) -> Option<(ToggleOutcome, Vec<CatalogEvent>)> {
        let node = leaf(catalogs, target)?;
        if !self.instances.get(index)?.is_custom() {
            return None;
        }
        if !self.instances[index].is_populated() {
            let paths = self.shared_path_index(catalogs, settings);
            let ctx = PopulateContext {
                catalogs,
                settings,
                paths: &paths,
            };
            self.instances[index].ensure_populated(&ctx);
        }
        let instance = &mut self.instances[index];
        let tree_id = TreeId::Collection(index);

        let (outcome, event) = match instance.remove_member(node.path()) {
            Some(alias) => (
                ToggleOutcome::Removed,
                CatalogEvent::new(NodeRef::new(tree_id, alias), ChangeKind::Removed),
            ),
            None => {
                let alias = instance.add_member(target, node)?;
                instance.sort_members(catalogs);
                (
                    ToggleOutcome::Added,
                    CatalogEvent::new(NodeRef::new(tree_id, alias), ChangeKind::Added),
                )
            }
        };
        instance.set_needs_save();
        instance.update_derived_metadata(catalogs);
        let root = instance.tree().root();

        if self.bundled.contains(&index) {
            self.rebuild_bundle_filter();
        }
        Some((
            outcome,
            vec![
                event,
                CatalogEvent::new(NodeRef::new(tree_id, root), ChangeKind::MetadataChanged),
            ],
        ))
    }

    /// Create an empty, enabled custom collection. Returns its position.
    pub fn create_custom(
        &mut self,
        name: &str,
        settings: &LibrarySettings,
        themes: &dyn ThemeResolver,
    ) -> Result<usize, LibraryError> {
        let name = name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(LibraryError::InvalidCollectionName(name.to_string()));
        }
        if self.custom(name).is_some() {
            return Err(LibraryError::CollectionExists(name.to_string()));
        }

        let mut instance = CollectionInstance::custom(name, &self.collections_dir, true);
        instance.mark_created();
        instance.set_themed(themes.has_theme(&instance.decl().theme_folder));

        let position = self
            .instances
            .iter()
            .position(|i| i.is_custom() && i.key() > name)
            .unwrap_or(self.instances.len());
        self.instances.insert(position, instance);
        self.rebuild_bundle(settings);
        info!("Created custom collection {}", name);
        Ok(position)
    }

    /// Remove a custom collection and its membership file
    pub fn delete_custom(
        &mut self,
        name: &str,
        settings: &LibrarySettings,
    ) -> Result<(), LibraryError> {
        let index = self
            .custom(name)
            .ok_or_else(|| LibraryError::CollectionNotFound(name.to_string()))?;
        let instance = self.instances.remove(index);
        if let Some(file) = instance.membership_file() {
            match std::fs::remove_file(file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!("Cannot remove {}: {}", file.display(), e),
            }
        }
        if self.editing.as_deref() == Some(name) {
            self.editing = None;
        }
        self.rebuild_bundle(settings);
        info!("Deleted custom collection {}", name);
        Ok(())
    }

    /// Repopulate every populated automatic collection, reporting the
    /// membership difference
    pub fn reload_automatic(
        &mut self,
        catalogs: &[Catalog],
        settings: &LibrarySettings,
    ) -> Vec<CatalogEvent> {
        let empty = SharedPathIndex::default();
        let ctx = PopulateContext {
            catalogs,
            settings,
            paths: &empty,
        };
        let mut events = Vec::new();

        for (i, instance) in self.instances.iter_mut().enumerate() {
            if instance.is_custom() || !instance.is_populated() {
                continue;
            }
            let tree_id = TreeId::Collection(i);
            let before = instance.member_ids();
            instance.populate(&ctx);
            let after = instance.member_ids();

            for (path, id) in &before {
                if !after.contains_key(path) {
                    events.push(CatalogEvent::new(NodeRef::new(tree_id, *id), ChangeKind::Removed));
                }
            }
            for (path, id) in &after {
                if !before.contains_key(path) {
                    events.push(CatalogEvent::new(NodeRef::new(tree_id, *id), ChangeKind::Added));
                }
            }
            let root = instance.tree().root();
            events.push(CatalogEvent::new(NodeRef::new(tree_id, root), ChangeKind::Sorted));
        }
        events
    }

    /// Write every custom collection whose membership changed. Returns the
    /// number written.
    pub fn save_custom_collections(&mut self, settings: &LibrarySettings) -> usize {
        let mut written = 0;
        for instance in self.instances.iter_mut().filter(|i| i.needs_save()) {
            let Some(file) = instance.membership_file().map(|f| f.to_path_buf()) else {
                continue;
            };
            let members = instance.member_paths();
            match custom::write_membership(&file, instance.key(), &members, &settings.roms_base) {
                Ok(()) => {
                    instance.clear_needs_save();
                    written += 1;
                    info!(
                        "Saved collection {} ({} games) to {}",
                        instance.key(),
                        members.len(),
                        file.display()
                    );
                }
                Err(e) => error!("Failed to save collection {}: {}", instance.key(), e),
            }
        }
        written
    }
}
