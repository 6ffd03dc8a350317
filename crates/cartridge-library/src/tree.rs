//! Arena-backed node trees
//!
//! Every catalog and every collection owns one [`Tree`]. Nodes are addressed
//! by [`NodeId`] inside their tree and by [`NodeRef`] across trees. Parent
//! links are plain ids, never ownership edges.
//!
//! A folder either owns its children (real catalog folders: removing the
//! folder removes the subtree) or merely lists aliases (collection folders:
//! removing the folder drops the alias entries and never touches what they
//! point at, which lives in another tree anyway).

use crate::metadata::{Metadata, default_name};
use std::collections::HashMap;
use std::ops::Index;
use std::path::{Path, PathBuf};

/// Slot of a node inside its tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Which tree a [`NodeRef`] points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeId {
    /// A real catalog, by position in the library
    System(usize),
    /// A collection instance, by position in the collection engine
    Collection(usize),
    /// The custom collections bundle
    Bundle,
    /// A virtual group of catalogs
    Group(usize),
}

/// Cross-tree node reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub tree: TreeId,
    pub node: NodeId,
}

impl NodeRef {
    pub fn new(tree: TreeId, node: NodeId) -> Self {
        Self { tree, node }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A playable game
    Game,
    /// A container
    Folder,
    /// A collection entry referencing a node it does not own
    Alias(NodeRef),
}

/// A node in a tree
#[derive(Debug, Clone)]
pub struct Node {
    kind: NodeKind,
    /// Canonical path; for aliases a copy of the target's path used as
    /// the membership key
    path: PathBuf,
    metadata: Metadata,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    owns_children: bool,
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn owns_children(&self) -> bool {
        self.owns_children
    }

    pub fn is_game(&self) -> bool {
        self.kind == NodeKind::Game
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    /// Target of an alias node
    pub fn alias_target(&self) -> Option<NodeRef> {
        match self.kind {
            NodeKind::Alias(target) => Some(target),
            _ => None,
        }
    }

    /// Name derived from the path, used when no explicit name is stored
    pub fn default_name(&self) -> String {
        default_name(&self.path, self.is_game())
    }

    /// Explicit name, or the derived one
    pub fn display_name(&self) -> String {
        match self.metadata.name() {
            "" => self.default_name(),
            name => name.to_string(),
        }
    }
}

/// What a path index entry refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indexed {
    Node(NodeId),
    /// A file seen by the scanner but excluded from the tree
    Asset,
}

/// A rooted tree of nodes with a path index
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<Option<Node>>,
    free: Vec<usize>,
    root: NodeId,
    index: HashMap<PathBuf, Indexed>,
}

impl Tree {
    /// A tree whose root folder owns its children (a real catalog)
    pub fn new(root_path: impl Into<PathBuf>) -> Self {
        Self::with_root(root_path.into(), true)
    }

    /// A tree whose root folder only lists aliases (a collection)
    pub fn new_virtual(root_path: impl Into<PathBuf>) -> Self {
        Self::with_root(root_path.into(), false)
    }

    fn with_root(path: PathBuf, owns_children: bool) -> Self {
        let name = default_name(&path, false);
        let root = Node {
            kind: NodeKind::Folder,
            path,
            metadata: Metadata::with_name(name),
            parent: None,
            children: Vec::new(),
            owns_children,
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            root: NodeId(0),
            index: HashMap::new(),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_path(&self) -> &Path {
        &self[self.root].path
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes, root included
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self[self.root].children.is_empty()
    }

    /// Path index (canonical path -> node or excluded asset)
    pub fn path_index(&self) -> &HashMap<PathBuf, Indexed> {
        &self.index
    }

    /// Node registered under `path`
    pub fn find(&self, path: &Path) -> Option<NodeId> {
        match self.index.get(path) {
            Some(Indexed::Node(id)) => Some(*id),
            _ => None,
        }
    }

    /// Whether `path` has been seen, as a node or as an excluded asset
    pub fn is_indexed(&self, path: &Path) -> bool {
        self.index.contains_key(path)
    }

    /// Record a path that was classified out of the tree
    pub fn register_asset(&mut self, path: impl Into<PathBuf>) {
        self.index.insert(path.into(), Indexed::Asset);
    }

    /// Add a game or folder under an owning folder
    pub fn add_child(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        path: impl Into<PathBuf>,
        metadata: Metadata,
    ) -> NodeId {
        let path = path.into();
        debug_assert!(
            !matches!(kind, NodeKind::Alias(_)),
            "aliases are added with add_alias"
        );
        debug_assert!(self[parent].owns_children, "parent must own its children");
        let owns_children = kind == NodeKind::Folder;
        self.insert(parent, kind, path, metadata, owns_children)
    }

    /// Add an alias under a non-owning folder. The alias is keyed by the
    /// target's path.
    pub fn add_alias(&mut self, parent: NodeId, target: NodeRef, path: impl Into<PathBuf>) -> NodeId {
        debug_assert!(!self[parent].owns_children, "aliases live in virtual folders");
        self.insert(parent, NodeKind::Alias(target), path.into(), Metadata::new(), false)
    }

    fn insert(
        &mut self,
        parent: NodeId,
        kind: NodeKind,
        path: PathBuf,
        metadata: Metadata,
        owns_children: bool,
    ) -> NodeId {
        let node = Node {
            kind,
            path: path.clone(),
            metadata,
            parent: Some(parent),
            children: Vec::new(),
            owns_children,
        };
        let id = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                NodeId(slot)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        };
        if let Some(parent) = self.get_mut(parent) {
            parent.children.push(id);
        }
        self.index.insert(path, Indexed::Node(id));
        id
    }

    /// Remove a node. An owning folder takes its whole subtree with it; a
    /// non-owning folder only drops its alias entries. Returns the number
    /// of nodes removed.
    pub fn remove(&mut self, id: NodeId) -> usize {
        if id == self.root || !self.contains(id) {
            return 0;
        }
        if let Some(parent) = self[id].parent {
            if let Some(parent) = self.get_mut(parent) {
                parent.children.retain(|child| *child != id);
            }
        }
        self.release(id)
    }

    fn release(&mut self, id: NodeId) -> usize {
        let Some(node) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return 0;
        };
        self.free.push(id.0);
        if self.index.get(&node.path) == Some(&Indexed::Node(id)) {
            self.index.remove(&node.path);
        }

        let mut removed = 1;
        for child in node.children {
            if node.owns_children {
                removed += self.release(child);
            } else if matches!(self.get(child).map(Node::kind), Some(NodeKind::Alias(_))) {
                removed += self.release(child);
            } else if let Some(child) = self.get_mut(child) {
                child.parent = None;
            }
        }
        removed
    }

    /// Drop every child of the root
    pub fn clear(&mut self) {
        let children = self[self.root].children.clone();
        for child in children {
            self.remove(child);
        }
    }

    /// Depth-first pre-order walk from `start`
    pub fn walk(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(id) = stack.pop() {
            let Some(node) = self.get(id) else { continue };
            out.push(id);
            stack.extend(node.children.iter().rev().copied());
        }
        out
    }

    /// Every game node, in tree order
    pub fn games(&self) -> Vec<NodeId> {
        self.walk(self.root)
            .into_iter()
            .filter(|id| self[*id].is_game())
            .collect()
    }

    /// Every alias node, in tree order
    pub fn aliases(&self) -> Vec<NodeId> {
        self.walk(self.root)
            .into_iter()
            .filter(|id| self[*id].alias_target().is_some())
            .collect()
    }

    /// Reorder the children of `parent`
    pub fn sort_children_by<F>(&mut self, parent: NodeId, mut compare: F)
    where
        F: FnMut(&Node, &Node) -> std::cmp::Ordering,
    {
        let mut children = self[parent].children.clone();
        children.sort_by(|a, b| compare(&self[*a], &self[*b]));
        if let Some(node) = self.get_mut(parent) {
            node.children = children;
        }
    }

    /// Remove children of `parent` past `len`; returns the removed ids
    pub fn truncate_children(&mut self, parent: NodeId, len: usize) -> Vec<NodeId> {
        let excess: Vec<NodeId> = self[parent].children.iter().skip(len).copied().collect();
        for id in &excess {
            self.remove(*id);
        }
        excess
    }

    /// Path of `id` relative to the root, in gamelist form
    pub fn relative_path(&self, id: NodeId) -> Option<String> {
        crate::paths::relative_entry_path(&self.get(id)?.path, self.root_path())
    }
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale node id {:?}", id),
        }
    }
}

impl std::ops::IndexMut<NodeId> for Tree {
    fn index_mut(&mut self, id: NodeId) -> &mut Node {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale node id {:?}", id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId) {
        let mut tree = Tree::new("/roms/nes");
        let root = tree.root();
        let sub = tree.add_child(root, NodeKind::Folder, "/roms/nes/sub", Metadata::new());
        let game = tree.add_child(sub, NodeKind::Game, "/roms/nes/sub/c.rom", Metadata::new());
        tree.add_child(root, NodeKind::Game, "/roms/nes/a.rom", Metadata::new());
        (tree, sub, game)
    }

    #[test]
    fn test_add_and_find() {
        let (tree, sub, game) = sample();
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.find(Path::new("/roms/nes/sub/c.rom")), Some(game));
        assert_eq!(tree[game].parent(), Some(sub));
        assert_eq!(tree.games().len(), 2);
        assert_eq!(tree.relative_path(game), Some("./sub/c.rom".to_string()));
    }

    #[test]
    fn test_remove_owning_folder_removes_subtree() {
        let (mut tree, sub, game) = sample();
        assert_eq!(tree.remove(sub), 2);
        assert!(!tree.contains(game));
        assert!(tree.find(Path::new("/roms/nes/sub/c.rom")).is_none());
        assert_eq!(tree.len(), 2);

        // freed slots are reused
        let again = tree.add_child(tree.root(), NodeKind::Game, "/roms/nes/b.rom", Metadata::new());
        assert!(again.index() <= 2);
        assert_eq!(tree.len(), 3);
    }

    #[test]
    fn test_virtual_tree_removal_only_drops_aliases() {
        let (catalog, _, game) = sample();
        let mut collection = Tree::new_virtual("/collections/favorites");
        let root = collection.root();
        let target = NodeRef::new(TreeId::System(0), game);
        let alias = collection.add_alias(root, target, catalog[game].path().to_path_buf());

        assert_eq!(collection[alias].alias_target(), Some(target));
        assert!(collection.find(Path::new("/roms/nes/sub/c.rom")).is_some());

        collection.clear();
        assert!(collection.is_empty());
        assert!(collection.find(Path::new("/roms/nes/sub/c.rom")).is_none());
        // the catalog is untouched
        assert!(catalog.contains(game));
    }

    #[test]
    fn test_sort_and_truncate() {
        let mut tree = Tree::new_virtual("/collections/recent");
        let root = tree.root();
        for name in ["c", "a", "b"] {
            let target = NodeRef::new(TreeId::System(0), NodeId(1));
            tree.add_alias(root, target, format!("/roms/{}.rom", name));
        }
        tree.sort_children_by(root, |a, b| a.path().cmp(b.path()));
        let order: Vec<_> = tree[root]
            .children()
            .iter()
            .map(|id| tree[*id].path().to_path_buf())
            .collect();
        assert_eq!(order[0], PathBuf::from("/roms/a.rom"));

        let removed = tree.truncate_children(root, 2);
        assert_eq!(removed.len(), 1);
        assert_eq!(tree[root].children().len(), 2);
        assert!(tree.find(Path::new("/roms/c.rom")).is_none());
    }

    #[test]
    fn test_assets_are_indexed_but_not_nodes() {
        let mut tree = Tree::new("/roms/arcade");
        tree.register_asset("/roms/arcade/neogeo.zip");
        assert!(tree.is_indexed(Path::new("/roms/arcade/neogeo.zip")));
        assert!(tree.find(Path::new("/roms/arcade/neogeo.zip")).is_none());
        assert!(tree.is_empty());
    }

    #[test]
    fn test_display_name_falls_back_to_path() {
        let (tree, sub, game) = sample();
        assert_eq!(tree[game].display_name(), "c");
        assert_eq!(tree[sub].display_name(), "sub");
    }
}
