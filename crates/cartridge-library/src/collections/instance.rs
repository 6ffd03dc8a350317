//! Collection instances and their population

use super::custom::{self, SharedPathIndex};
use super::declarations::{CollectionDecl, CollectionKind, RECENT_CAP, SortOrder};
use super::filter_index::FilterIndex;
use crate::arcade;
use crate::catalog::Catalog;
use crate::metadata::{MetaKey, Metadata, TIME_FORMAT};
use crate::paths::resolve_entry_path;
use crate::tree::{Node, NodeId, NodeRef, Tree, TreeId};
use cartridge_config::LibrarySettings;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulationState {
    NotPopulated,
    Populating,
    Populated,
}

/// Read-only inputs shared by every population task of one batch
pub struct PopulateContext<'a> {
    pub catalogs: &'a [Catalog],
    pub settings: &'a LibrarySettings,
    pub paths: &'a SharedPathIndex,
}

/// The game a system-tree reference points at
pub fn leaf(catalogs: &[Catalog], target: NodeRef) -> Option<&Node> {
    match target.tree {
        TreeId::System(i) => catalogs.get(i)?.tree().get(target.node),
        _ => None,
    }
}

/// Whether a system's games may appear in collections at all
pub fn system_contributes(catalog: &Catalog, settings: &LibrarySettings) -> bool {
    settings.hidden_systems_in_collections || !settings.is_system_hidden(catalog.name())
}

/// Inclusion predicate of an automatic collection
pub fn includes(
    kind: CollectionKind,
    catalog: &Catalog,
    node: &Node,
    settings: &LibrarySettings,
) -> bool {
    if !node.is_game() {
        return false;
    }
    let metadata = node.metadata();
    if metadata.hidden() && !settings.show_hidden_games {
        return false;
    }
    if kind == CollectionKind::Favorites {
        return metadata.favorite();
    }
    if !catalog.includes_in_auto_collections() {
        return false;
    }

    match kind {
        CollectionKind::All => true,
        CollectionKind::Recent => metadata.play_count() > 0,
        CollectionKind::NeverPlayed => metadata.play_count() == 0,
        CollectionKind::TwoPlayers => supports_players(metadata, 2),
        CollectionKind::FourPlayers => supports_players(metadata, 4),
        CollectionKind::Arcade => catalog.is_arcade(),
        CollectionKind::Manufacturer(key) => {
            catalog.is_arcade()
                && metadata
                    .get(MetaKey::ArcadeSystemName)
                    .trim()
                    .eq_ignore_ascii_case(key)
        }
        CollectionKind::VerticalArcade => {
            catalog.is_arcade()
                && node
                    .path()
                    .file_stem()
                    .is_some_and(|stem| arcade::is_vertical(&stem.to_string_lossy()))
        }
        CollectionKind::Favorites | CollectionKind::Custom => false,
    }
}

fn supports_players(metadata: &Metadata, players: u32) -> bool {
    super::declarations::PlayerRange::parse(metadata.get(MetaKey::Players))
        .is_some_and(|range| range.contains(players))
}

/// One collection: a virtual tree of aliases into system trees
pub struct CollectionInstance {
    decl: CollectionDecl,
    tree: Tree,
    filter: FilterIndex,
    enabled: bool,
    state: PopulationState,
    needs_save: bool,
    membership_file: Option<PathBuf>,
    themed: bool,
}

impl CollectionInstance {
    pub fn new(decl: CollectionDecl, root: PathBuf, enabled: bool) -> Self {
        let mut tree = Tree::new_virtual(root);
        let top = tree.root();
        tree[top]
            .metadata_mut()
            .set(MetaKey::Name, decl.display_name.as_str());
        Self {
            decl,
            tree,
            filter: FilterIndex::new(),
            enabled,
            state: PopulationState::NotPopulated,
            needs_save: false,
            membership_file: None,
            themed: false,
        }
    }

    /// A user-defined collection backed by `custom-<name>.cfg` in
    /// `collections_dir`
    pub fn custom(name: &str, collections_dir: &Path, enabled: bool) -> Self {
        let root = collections_dir.join(format!("{}{}", custom::MEMBERSHIP_PREFIX, name));
        let mut instance = Self::new(CollectionDecl::custom(name), root, enabled);
        instance.membership_file = Some(custom::membership_file(collections_dir, name));
        instance
    }

    pub fn decl(&self) -> &CollectionDecl {
        &self.decl
    }

    pub fn key(&self) -> &str {
        &self.decl.key
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn filter(&self) -> &FilterIndex {
        &self.filter
    }

    pub fn is_custom(&self) -> bool {
        self.decl.is_custom
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn state(&self) -> PopulationState {
        self.state
    }

    pub fn is_populated(&self) -> bool {
        self.state == PopulationState::Populated
    }

    pub fn needs_save(&self) -> bool {
        self.needs_save
    }

    pub fn membership_file(&self) -> Option<&Path> {
        self.membership_file.as_deref()
    }

    /// Has its own themed view instead of sitting in the bundle
    pub fn is_themed(&self) -> bool {
        self.themed
    }

    pub fn set_themed(&mut self, themed: bool) {
        self.themed = themed;
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.tree[self.tree.root()].children().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Alias registered for a game path
    pub fn member(&self, path: &Path) -> Option<NodeId> {
        self.tree.find(path)
    }

    /// Member paths in display order
    pub fn member_paths(&self) -> Vec<PathBuf> {
        let root = self.tree.root();
        self.tree[root]
            .children()
            .iter()
            .map(|id| self.tree[*id].path().to_path_buf())
            .collect()
    }

    pub(crate) fn member_ids(&self) -> HashMap<PathBuf, NodeId> {
        let root = self.tree.root();
        self.tree[root]
            .children()
            .iter()
            .map(|id| (self.tree[*id].path().to_path_buf(), *id))
            .collect()
    }

    /// Populate once; later calls are no-ops. Returns whether this call
    /// did the work.
    pub fn ensure_populated(&mut self, ctx: &PopulateContext<'_>) -> bool {
        if self.state != PopulationState::NotPopulated {
            return false;
        }
        self.populate(ctx);
        true
    }

    /// Rebuild the member list from scratch
    pub fn populate(&mut self, ctx: &PopulateContext<'_>) {
        self.state = PopulationState::Populating;
        self.tree.clear();
        self.filter.clear();

        if self.decl.is_custom {
            self.populate_custom(ctx);
        } else {
            self.populate_automatic(ctx);
        }

        self.state = PopulationState::Populated;
        debug!(
            "Populated collection {} with {} games",
            self.decl.key,
            self.len()
        );
    }

    fn populate_automatic(&mut self, ctx: &PopulateContext<'_>) {
        for (i, catalog) in ctx.catalogs.iter().enumerate() {
            if !system_contributes(catalog, ctx.settings) {
                continue;
            }
            let tree = catalog.tree();
            for id in tree.games() {
                let node = &tree[id];
                if includes(self.decl.kind, catalog, node, ctx.settings) {
                    self.add_member(NodeRef::new(TreeId::System(i), id), node);
                }
            }
        }
        self.sort_members(ctx.catalogs);
        self.enforce_cap();
    }

    fn populate_custom(&mut self, ctx: &PopulateContext<'_>) {
        if let Some(file) = self.membership_file.clone() {
            for line in custom::read_membership(&file) {
                let path = resolve_entry_path(&line, &ctx.settings.roms_base);
                let found = ctx
                    .paths
                    .get(&path)
                    .and_then(|target| leaf(ctx.catalogs, target).map(|node| (target, node)));
                match found {
                    Some((target, node)) => {
                        self.add_member(target, node);
                    }
                    None => warn!(
                        "Collection {}: {} not found, skipping",
                        self.decl.key, line
                    ),
                }
            }
        }
        self.sort_members(ctx.catalogs);
        self.update_derived_metadata(ctx.catalogs);
        self.needs_save = false;
    }

    /// Mark an empty, freshly created collection as populated
    pub(crate) fn mark_created(&mut self) {
        self.state = PopulationState::Populated;
        self.needs_save = true;
        self.update_derived_metadata(&[]);
    }

    pub(crate) fn set_needs_save(&mut self) {
        self.needs_save = true;
    }

    pub(crate) fn clear_needs_save(&mut self) {
        self.needs_save = false;
    }

    /// Alias `leaf` into this collection, keyed by its path
    pub fn add_member(&mut self, target: NodeRef, leaf: &Node) -> Option<NodeId> {
        if self.tree.find(leaf.path()).is_some() {
            return None;
        }
        let root = self.tree.root();
        let id = self
            .tree
            .add_alias(root, target, leaf.path().to_path_buf());
        self.filter.add(leaf.path(), leaf.metadata());
        Some(id)
    }

    pub fn remove_member(&mut self, path: &Path) -> Option<NodeId> {
        let id = self.tree.find(path)?;
        self.tree.remove(id);
        self.filter.remove(path);
        Some(id)
    }

    /// Re-index a member whose metadata changed
    pub fn refresh_member(&mut self, leaf: &Node) {
        if self.tree.find(leaf.path()).is_some() {
            self.filter.add(leaf.path(), leaf.metadata());
        }
    }

    /// Order members by the declaration's default sort
    pub fn sort_members(&mut self, catalogs: &[Catalog]) {
        let order = self.decl.default_sort;
        let root = self.tree.root();
        self.tree
            .sort_children_by(root, |a, b| compare_members(catalogs, order, a, b));
    }

    /// Trim the recently played collection to its cap. Returns the removed
    /// aliases.
    pub fn enforce_cap(&mut self) -> Vec<NodeId> {
        if self.decl.kind != CollectionKind::Recent {
            return Vec::new();
        }
        let root = self.tree.root();
        let excess: Vec<PathBuf> = self.tree[root]
            .children()
            .iter()
            .skip(RECENT_CAP)
            .map(|id| self.tree[*id].path().to_path_buf())
            .collect();
        for path in &excess {
            self.filter.remove(path);
        }
        self.tree.truncate_children(root, RECENT_CAP)
    }

    /// Refill the recently played collection after members left it, taking
    /// the next eligible games by last played. Returns the added aliases.
    pub fn backfill(&mut self, catalogs: &[Catalog], settings: &LibrarySettings) -> Vec<NodeId> {
        if self.decl.kind != CollectionKind::Recent || self.len() >= RECENT_CAP {
            return Vec::new();
        }
        let mut candidates: Vec<(NodeRef, &Node)> = Vec::new();
        for (i, catalog) in catalogs.iter().enumerate() {
            if !system_contributes(catalog, settings) {
                continue;
            }
            let tree = catalog.tree();
            for id in tree.games() {
                let node = &tree[id];
                if self.tree.find(node.path()).is_none()
                    && includes(self.decl.kind, catalog, node, settings)
                {
                    candidates.push((NodeRef::new(TreeId::System(i), id), node));
                }
            }
        }
        candidates.sort_by(|(_, a), (_, b)| {
            b.metadata()
                .last_played()
                .cmp(&a.metadata().last_played())
                .then_with(|| a.path().cmp(b.path()))
        });

        let room = RECENT_CAP - self.len();
        let added: Vec<NodeId> = candidates
            .into_iter()
            .take(room)
            .filter_map(|(target, node)| self.add_member(target, node))
            .collect();
        if !added.is_empty() {
            self.sort_members(catalogs);
        }
        added
    }

    /// Recompute the collection's own display metadata from its members
    pub fn update_derived_metadata(&mut self, catalogs: &[Catalog]) {
        let root = self.tree.root();
        let leaves: Vec<&Node> = self.tree[root]
            .children()
            .iter()
            .filter_map(|id| self.tree[*id].alias_target())
            .filter_map(|target| leaf(catalogs, target))
            .collect();

        let mut metadata = Metadata::with_name(self.decl.display_name.as_str());
        metadata.set(MetaKey::Desc, describe(&leaves));
        metadata.set(MetaKey::Genre, agreed_value(&leaves, MetaKey::Genre));
        metadata.set(MetaKey::Developer, agreed_value(&leaves, MetaKey::Developer));

        let rating = leaves
            .iter()
            .map(|node| node.metadata().rating())
            .fold(0.0_f32, f32::max);
        if rating > 0.0 {
            metadata.set(MetaKey::Rating, rating.to_string());
        }
        if let Some(earliest) = leaves
            .iter()
            .filter_map(|node| node.metadata().release_date())
            .min()
        {
            metadata.set(MetaKey::ReleaseDate, earliest.format(TIME_FORMAT).to_string());
        }
        if let Some(pick) = leaves.choose(&mut rand::thread_rng()) {
            for key in MetaKey::ALL.into_iter().filter(|key| key.is_media()) {
                metadata.set(key, pick.metadata().get(key));
            }
        }

        metadata.clear_dirty();
        *self.tree[root].metadata_mut() = metadata;
    }
}

fn compare_members(catalogs: &[Catalog], order: SortOrder, a: &Node, b: &Node) -> Ordering {
    let left = a.alias_target().and_then(|t| leaf(catalogs, t));
    let right = b.alias_target().and_then(|t| leaf(catalogs, t));
    let by_key = match order {
        SortOrder::LastPlayedDescending => {
            let l = left.and_then(|n| n.metadata().last_played());
            let r = right.and_then(|n| n.metadata().last_played());
            r.cmp(&l)
        }
        SortOrder::NameAscending => {
            let l = left.map(|n| n.display_name().to_lowercase());
            let r = right.map(|n| n.display_name().to_lowercase());
            l.cmp(&r)
        }
    };
    by_key.then_with(|| a.path().cmp(b.path()))
}

/// "This collection contains 4 games, including A, B and C"
fn describe(leaves: &[&Node]) -> String {
    if leaves.is_empty() {
        return "This collection is empty".to_string();
    }
    let names: Vec<String> = leaves.iter().take(3).map(|n| n.display_name()).collect();
    let listed = match names.split_last() {
        Some((last, [])) => last.clone(),
        Some((last, rest)) => format!("{} and {}", rest.join(", "), last),
        None => String::new(),
    };
    let noun = if leaves.len() == 1 { "game" } else { "games" };
    format!(
        "This collection contains {} {}, including {}",
        leaves.len(),
        noun,
        listed
    )
}

/// The shared value of a field, or "Various" when members disagree
fn agreed_value(leaves: &[&Node], key: MetaKey) -> String {
    let mut values = leaves
        .iter()
        .map(|node| node.metadata().get(key).trim())
        .filter(|value| !value.is_empty());
    let Some(first) = values.next() else {
        return String::new();
    };
    if values.all(|value| value == first) {
        first.to_string()
    } else {
        "Various".to_string()
    }
}
