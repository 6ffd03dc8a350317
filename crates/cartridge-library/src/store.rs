//! Crash-safe gamelist persistence
//!
//! A [`CatalogStore`] keeps one system's `gamelist.xml` in step with the
//! in-memory tree:
//!
//! 1. [`load`](CatalogStore::load) applies the document to the scanned tree
//!    and remembers the SHA-256 of the bytes it read.
//! 2. [`merge_recovery`](CatalogStore::merge_recovery) replays recovery
//!    fragments written against that same hash.
//! 3. [`write_fragment`](CatalogStore::write_fragment) records a single
//!    edited node in the recovery directory.
//! 4. [`save`](CatalogStore::save) rewrites the main document from dirty
//!    nodes and clears the recovery directory.

use crate::LibraryError;
use crate::gamelist::{DocumentEntry, EntryKind, GamelistDocument};
use crate::metadata::{MetaKey, Metadata, default_name};
use crate::paths::{content_hash, relative_entry_path, replace_file, resolve_entry_path};
use crate::tree::{NodeId, NodeKind, Tree};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

const RECOVERY_DIR: &str = ".recovery";
const FRAGMENT_NAME_LEN: usize = 16;

/// What a full save did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// No node was dirty
    Clean,
    /// Dirty nodes produced no document change
    Unchanged,
    Written { added: usize, removed: usize },
    /// The document could not be written; dirty bits are kept
    Failed,
}

/// Gamelist persistence for one system
pub struct CatalogStore {
    document_path: PathBuf,
    recovery_dir: PathBuf,
    trust_document: bool,
    background_writes: bool,
    loaded_hash: String,
    pending: Vec<JoinHandle<()>>,
}

impl CatalogStore {
    pub fn new(
        system: &str,
        document_path: PathBuf,
        trust_document: bool,
        background_writes: bool,
    ) -> Self {
        let recovery_dir = document_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(RECOVERY_DIR)
            .join(system);
        Self {
            document_path,
            recovery_dir,
            trust_document,
            background_writes,
            loaded_hash: String::new(),
            pending: Vec::new(),
        }
    }

    pub fn document_path(&self) -> &Path {
        &self.document_path
    }

    pub fn recovery_dir(&self) -> &Path {
        &self.recovery_dir
    }

    /// Hash of the document as last read or written; empty when there was
    /// no document
    pub fn loaded_hash(&self) -> &str {
        &self.loaded_hash
    }

    /// Apply the on-disk document to `tree`. Returns the number of entries
    /// applied. A missing or malformed document applies nothing.
    pub fn load(&mut self, tree: &mut Tree) -> usize {
        let bytes = match fs::read(&self.document_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                self.loaded_hash.clear();
                debug!("No gamelist at {}", self.document_path.display());
                return 0;
            }
            Err(e) => {
                self.loaded_hash.clear();
                warn!("Cannot read {}: {}", self.document_path.display(), e);
                return 0;
            }
        };
        self.loaded_hash = content_hash(&bytes);

        let document = match GamelistDocument::parse(&String::from_utf8_lossy(&bytes)) {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    "Ignoring malformed gamelist {}: {}",
                    self.document_path.display(),
                    e
                );
                return 0;
            }
        };

        let mut applied = 0;
        let mut stale = 0;
        for entry in &document.entries {
            let Some(id) = self.resolve(tree, entry) else {
                stale += 1;
                continue;
            };
            let metadata = tree[id].metadata_mut();
            entry.apply_to(metadata);
            metadata.clear_dirty();
            applied += 1;
        }

        if stale > 0 {
            warn!(
                "Skipped {} stale entries in {}",
                stale,
                self.document_path.display()
            );
        }
        info!(
            "Loaded {} entries from {}",
            applied,
            self.document_path.display()
        );
        applied
    }

    /// Replay recovery fragments written against the loaded document.
    /// Fragments from another generation are deleted. Returns the number of
    /// nodes restored; each is left dirty.
    pub fn merge_recovery(&mut self, tree: &mut Tree) -> usize {
        let entries = match fs::read_dir(&self.recovery_dir) {
            Ok(entries) => entries,
            Err(_) => return 0,
        };

        let mut fragments: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "xml"))
            .collect();
        fragments.sort();

        let mut restored = 0;
        for fragment in fragments {
            let document = match fs::read_to_string(&fragment)
                .map_err(LibraryError::from)
                .and_then(|text| GamelistDocument::parse(&text))
            {
                Ok(document) => document,
                Err(e) => {
                    warn!("Dropping unreadable fragment {}: {}", fragment.display(), e);
                    let _ = fs::remove_file(&fragment);
                    continue;
                }
            };

            if document.parent_hash.as_deref() != Some(self.loaded_hash.as_str()) {
                info!("Discarding stale recovery fragment {}", fragment.display());
                let _ = fs::remove_file(&fragment);
                continue;
            }

            for entry in &document.entries {
                let Some(id) = self.resolve(tree, entry) else {
                    warn!("Recovery entry {} no longer exists", entry.path);
                    continue;
                };
                let node = &mut tree[id];
                let mut metadata = Metadata::new();
                entry.apply_to(&mut metadata);
                if metadata.name().is_empty() {
                    metadata.set(MetaKey::Name, node.default_name());
                }
                metadata.mark_dirty();
                *node.metadata_mut() = metadata;
                restored += 1;
            }
        }

        if restored > 0 {
            info!(
                "Recovered {} unsaved edits for {}",
                restored,
                self.document_path.display()
            );
        }
        self.remove_recovery_dir_if_empty();
        restored
    }

    /// Record the current state of one node in the recovery directory.
    /// Later writes for the same node replace earlier ones.
    pub fn write_fragment(&mut self, tree: &Tree, id: NodeId) -> Result<(), LibraryError> {
        let Some(relative) = tree.relative_path(id) else {
            return Ok(());
        };
        let document = GamelistDocument {
            parent_hash: Some(self.loaded_hash.clone()),
            entries: vec![DocumentEntry::from_node(&tree[id], relative.clone())],
        };
        let bytes = document.to_bytes()?;
        let path = self.fragment_path(&relative);

        // at most one write in flight keeps same-node writes ordered
        self.flush();

        if self.background_writes {
            let (target, contents) = (path.clone(), bytes.clone());
            let spawned = thread::Builder::new()
                .name("fragment-writer".to_string())
                .spawn(move || {
                    if let Err(e) = write_fragment_file(&target, &contents) {
                        warn!("Failed to write fragment {}: {}", target.display(), e);
                    }
                });
            match spawned {
                Ok(handle) => {
                    self.pending.push(handle);
                    return Ok(());
                }
                Err(e) => warn!("Cannot spawn fragment writer, writing inline: {}", e),
            }
        }

        write_fragment_file(&path, &bytes)?;
        Ok(())
    }

    /// Wait for in-flight fragment writes
    pub fn flush(&mut self) {
        for handle in self.pending.drain(..) {
            if handle.join().is_err() {
                error!("Fragment writer panicked");
            }
        }
    }

    /// Rewrite the main document from the dirty nodes of `tree`
    pub fn save(&mut self, tree: &mut Tree) -> SaveOutcome {
        self.flush();

        let root = tree.root();
        let dirty: Vec<NodeId> = tree
            .walk(root)
            .into_iter()
            .filter(|id| *id != root && tree[*id].metadata().is_dirty())
            .collect();

        if dirty.is_empty() {
            self.clear_recovery();
            return SaveOutcome::Clean;
        }

        // re-read so external edits to untouched entries survive
        let mut document = match fs::read(&self.document_path) {
            Ok(bytes) => match GamelistDocument::parse(&String::from_utf8_lossy(&bytes)) {
                Ok(document) => document,
                Err(e) => {
                    warn!(
                        "Rewriting malformed gamelist {}: {}",
                        self.document_path.display(),
                        e
                    );
                    GamelistDocument::default()
                }
            },
            Err(e) if e.kind() == io::ErrorKind::NotFound => GamelistDocument::default(),
            Err(e) => {
                error!("Cannot read {}: {}", self.document_path.display(), e);
                return SaveOutcome::Failed;
            }
        };
        document.parent_hash = None;

        let root_path = tree.root_path().to_path_buf();
        let mut positions: HashMap<PathBuf, Vec<usize>> = HashMap::new();
        for (i, entry) in document.entries.iter().enumerate() {
            positions
                .entry(resolve_entry_path(&entry.path, &root_path))
                .or_default()
                .push(i);
        }

        let mut replaced = vec![false; document.entries.len()];
        let mut appended = Vec::new();
        let mut removed = 0;
        for id in &dirty {
            let node = &tree[*id];
            if let Some(found) = positions.remove(node.path()) {
                for i in found {
                    replaced[i] = true;
                    removed += 1;
                }
            }
            if node.metadata().is_default_except_name(&node.default_name()) {
                continue;
            }
            if let Some(relative) = relative_entry_path(node.path(), &root_path) {
                appended.push(DocumentEntry::from_node(node, relative));
            }
        }

        if removed == 0 && appended.is_empty() {
            clear_dirty(tree, &dirty);
            self.clear_recovery();
            return SaveOutcome::Unchanged;
        }

        let added = appended.len();
        let mut kept: Vec<DocumentEntry> = document
            .entries
            .into_iter()
            .zip(replaced)
            .filter_map(|(entry, dropped)| (!dropped).then_some(entry))
            .collect();
        kept.extend(appended);
        document.entries = kept;

        let bytes = match document.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Cannot serialize {}: {}", self.document_path.display(), e);
                return SaveOutcome::Failed;
            }
        };

        if let Err(e) = replace_file(&self.document_path, &bytes, true) {
            error!("Failed to save {}: {}", self.document_path.display(), e);
            return SaveOutcome::Failed;
        }

        self.loaded_hash = content_hash(&bytes);
        clear_dirty(tree, &dirty);
        self.clear_recovery();
        info!(
            "Saved {} entries to {} ({} replaced)",
            added,
            self.document_path.display(),
            removed
        );
        SaveOutcome::Written { added, removed }
    }

    /// Node an entry refers to. In trusted mode missing nodes are created.
    fn resolve(&self, tree: &mut Tree, entry: &DocumentEntry) -> Option<NodeId> {
        let root = tree.root_path().to_path_buf();
        let path = resolve_entry_path(&entry.path, &root);
        if let Some(id) = tree.find(&path) {
            return Some(id);
        }
        if !self.trust_document {
            debug!("Stale gamelist entry {}", entry.path);
            return None;
        }
        ensure_path(tree, &root, &path, entry.kind)
    }

    fn fragment_path(&self, relative: &str) -> PathBuf {
        let hash = content_hash(relative.as_bytes());
        self.recovery_dir
            .join(format!("{}.xml", &hash[..FRAGMENT_NAME_LEN]))
    }

    fn clear_recovery(&mut self) {
        self.flush();
        if self.recovery_dir.exists() {
            if let Err(e) = fs::remove_dir_all(&self.recovery_dir) {
                warn!(
                    "Cannot remove recovery directory {}: {}",
                    self.recovery_dir.display(),
                    e
                );
            }
        }
        if let Some(parent) = self.recovery_dir.parent() {
            // only succeeds when no other system has fragments
            let _ = fs::remove_dir(parent);
        }
    }

    fn remove_recovery_dir_if_empty(&self) {
        let empty = fs::read_dir(&self.recovery_dir)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if empty {
            let _ = fs::remove_dir(&self.recovery_dir);
            if let Some(parent) = self.recovery_dir.parent() {
                let _ = fs::remove_dir(parent);
            }
        }
    }
}

impl Drop for CatalogStore {
    fn drop(&mut self) {
        self.flush();
    }
}

fn write_fragment_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)
}

fn clear_dirty(tree: &mut Tree, ids: &[NodeId]) {
    for id in ids {
        if let Some(node) = tree.get_mut(*id) {
            node.metadata_mut().clear_dirty();
        }
    }
}

/// Create `path` and any missing folders between it and the root
fn ensure_path(tree: &mut Tree, root: &Path, path: &Path, kind: EntryKind) -> Option<NodeId> {
    let relative = path.strip_prefix(root).ok()?;
    let components: Vec<_> = relative.components().collect();
    if components.is_empty() {
        return None;
    }

    let mut parent = tree.root();
    let mut current = root.to_path_buf();
    for (i, component) in components.iter().enumerate() {
        current.push(component.as_os_str());
        let last = i + 1 == components.len();
        if let Some(existing) = tree.find(&current) {
            if last {
                return Some(existing);
            }
            if !tree[existing].owns_children() {
                return None;
            }
            parent = existing;
            continue;
        }
        let node_kind = if last && kind == EntryKind::Game {
            NodeKind::Game
        } else {
            NodeKind::Folder
        };
        let metadata = Metadata::with_name(default_name(&current, node_kind == NodeKind::Game));
        parent = tree.add_child(parent, node_kind, current.clone(), metadata);
    }
    Some(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_tree(root: &Path) -> Tree {
        let mut tree = Tree::new(root);
        let top = tree.root();
        tree.add_child(top, NodeKind::Game, root.join("a.rom"), Metadata::with_name("a"));
        let sub = tree.add_child(top, NodeKind::Folder, root.join("sub"), Metadata::with_name("sub"));
        tree.add_child(sub, NodeKind::Game, root.join("sub/c.rom"), Metadata::with_name("c"));
        tree
    }

    fn store_for(root: &Path, background: bool) -> CatalogStore {
        CatalogStore::new("nes", root.join("gamelist.xml"), false, background)
    }

    #[test]
    fn test_recovery_dir_layout() {
        let store = CatalogStore::new("nes", PathBuf::from("/roms/nes/gamelist.xml"), false, false);
        assert_eq!(store.recovery_dir(), Path::new("/roms/nes/.recovery/nes"));
        let fragment = store.fragment_path("./a.rom");
        assert_eq!(fragment.file_name().unwrap().len(), FRAGMENT_NAME_LEN + 4);
    }

    #[test]
    fn test_clean_tree_saves_nothing() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), false);
        assert_eq!(store.save(&mut tree), SaveOutcome::Clean);
        assert!(!store.document_path().exists());
    }

    #[test]
    fn test_default_only_nodes_compact_away() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let a = tree.find(&dir.path().join("a.rom")).unwrap();
        tree[a].metadata_mut().mark_dirty();

        let mut store = store_for(dir.path(), false);
        assert_eq!(store.save(&mut tree), SaveOutcome::Unchanged);
        assert!(!store.document_path().exists());
        assert!(!tree[a].metadata().is_dirty());
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let c = tree.find(&dir.path().join("sub/c.rom")).unwrap();
        tree[c].metadata_mut().set(MetaKey::Genre, "Shooter");
        tree[c].metadata_mut().set(MetaKey::PlayCount, "3");
        tree[c].metadata_mut().set_extra("scraper", "ss");

        let mut store = store_for(dir.path(), false);
        assert_eq!(
            store.save(&mut tree),
            SaveOutcome::Written { added: 1, removed: 0 }
        );
        assert!(!store.loaded_hash().is_empty());

        let mut fresh = sample_tree(dir.path());
        let mut reloaded = store_for(dir.path(), false);
        assert_eq!(reloaded.load(&mut fresh), 1);
        let c2 = fresh.find(&dir.path().join("sub/c.rom")).unwrap();
        assert_eq!(fresh[c2].metadata().iter().collect::<Vec<_>>(), tree[c].metadata().iter().collect::<Vec<_>>());
        assert_eq!(fresh[c2].metadata().extras(), tree[c].metadata().extras());
        assert!(!fresh[c2].metadata().is_dirty());
        assert_eq!(reloaded.loaded_hash(), store.loaded_hash());
    }

    #[test]
    fn test_save_keeps_unrelated_entries_and_backup() {
        let dir = TempDir::new().unwrap();
        let doc = dir.path().join("gamelist.xml");
        fs::write(
            &doc,
            "<gameList><game><path>./gone.rom</path><name>Gone</name></game>\
             <game><path>./a.rom</path><name>Old</name></game></gameList>",
        )
        .unwrap();

        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), false);
        assert_eq!(store.load(&mut tree), 1);

        let a = tree.find(&dir.path().join("a.rom")).unwrap();
        tree[a].metadata_mut().set(MetaKey::Name, "New");
        assert_eq!(
            store.save(&mut tree),
            SaveOutcome::Written { added: 1, removed: 1 }
        );

        let text = fs::read_to_string(&doc).unwrap();
        assert!(text.contains("./gone.rom"));
        assert!(text.contains("New"));
        assert!(!text.contains("Old"));
        assert!(dir.path().join("gamelist.xml.old").exists());
    }

    #[test]
    fn test_malformed_document_loads_as_empty() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("gamelist.xml"), "<gameList><game>").unwrap();
        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), false);
        assert_eq!(store.load(&mut tree), 0);
        assert_eq!(tree.games().len(), 2);
    }

    #[test]
    fn test_trusted_document_creates_missing_nodes() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("gamelist.xml"),
            "<gameList><game><path>./deep/er/x.rom</path><name>X</name></game></gameList>",
        )
        .unwrap();
        let mut tree = Tree::new(dir.path());
        let mut store = CatalogStore::new("nes", dir.path().join("gamelist.xml"), true, false);
        assert_eq!(store.load(&mut tree), 1);

        let x = tree.find(&dir.path().join("deep/er/x.rom")).unwrap();
        assert!(tree[x].is_game());
        assert_eq!(tree[x].metadata().name(), "X");
        assert!(tree[tree.find(&dir.path().join("deep")).unwrap()].is_folder());
    }

    #[test]
    fn test_fragment_written_in_background_is_replayed() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), true);
        store.load(&mut tree);

        let a = tree.find(&dir.path().join("a.rom")).unwrap();
        tree[a].metadata_mut().set(MetaKey::Favorite, "true");
        store.write_fragment(&tree, a).unwrap();
        tree[a].metadata_mut().set(MetaKey::Rating, "0.5");
        store.write_fragment(&tree, a).unwrap();
        store.flush();
        assert_eq!(fs::read_dir(store.recovery_dir()).unwrap().count(), 1);

        let mut fresh = sample_tree(dir.path());
        let mut reloaded = store_for(dir.path(), false);
        reloaded.load(&mut fresh);
        assert_eq!(reloaded.merge_recovery(&mut fresh), 1);

        let a2 = fresh.find(&dir.path().join("a.rom")).unwrap();
        assert!(fresh[a2].metadata().favorite());
        assert!((fresh[a2].metadata().rating() - 0.5).abs() < f32::EPSILON);
        assert!(fresh[a2].metadata().is_dirty());
    }

    #[test]
    fn test_stale_fragment_is_discarded() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), false);
        store.load(&mut tree);

        let a = tree.find(&dir.path().join("a.rom")).unwrap();
        tree[a].metadata_mut().set(MetaKey::Favorite, "true");
        store.write_fragment(&tree, a).unwrap();

        // the main document changes generation behind the fragment's back
        fs::write(
            dir.path().join("gamelist.xml"),
            "<gameList><game><path>./a.rom</path><name>a</name><genre>RPG</genre></game></gameList>",
        )
        .unwrap();

        let mut fresh = sample_tree(dir.path());
        let mut reloaded = store_for(dir.path(), false);
        reloaded.load(&mut fresh);
        assert_eq!(reloaded.merge_recovery(&mut fresh), 0);

        let a2 = fresh.find(&dir.path().join("a.rom")).unwrap();
        assert!(!fresh[a2].metadata().favorite());
        assert!(!reloaded.recovery_dir().exists());
    }

    #[test]
    fn test_save_clears_recovery_dir() {
        let dir = TempDir::new().unwrap();
        let mut tree = sample_tree(dir.path());
        let mut store = store_for(dir.path(), false);
        store.load(&mut tree);

        let c = tree.find(&dir.path().join("sub/c.rom")).unwrap();
        tree[c].metadata_mut().set(MetaKey::Favorite, "true");
        store.write_fragment(&tree, c).unwrap();
        assert!(store.recovery_dir().exists());

        assert!(matches!(store.save(&mut tree), SaveOutcome::Written { .. }));
        assert!(!store.recovery_dir().exists());
        assert!(!dir.path().join(RECOVERY_DIR).exists());
        assert_eq!(store.save(&mut tree), SaveOutcome::Clean);
    }
}
