//! ROM scanning functionality
//!
//! Walks a system root depth-first and builds its [`Tree`]. Every created
//! node is registered in the tree's path index, so a second pass over the
//! same tree finds existing entries instead of duplicating them.

use crate::LibraryError;
use crate::arcade;
use crate::metadata::{Metadata, default_name};
use crate::paths::{extension_of, is_hidden};
use crate::tree::{NodeId, NodeKind, Tree};
use cartridge_config::SystemConfig;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, warn};

/// Media and cache folders that never hold games
const SKIP_FOLDERS: &[&str] = &["images", "videos", "manuals", "media", "assets"];

const SKIP_PREFIXES: &[&str] = &["downloaded_"];

/// Extra folders skipped for specific systems
const SYSTEM_SKIP_FOLDERS: &[(&str, &[&str])] = &[("pico8", &["carts", "bbs"])];

/// Result of a ROM scan
#[derive(Debug, Default)]
pub struct ScanResult {
    pub games_found: usize,
    pub folders_found: usize,
    pub assets_skipped: usize,
    pub errors: Vec<String>,
    pub duration_ms: u64,
}

/// ROM scanner configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Allowed extensions, lowercased with their leading dot
    pub extensions: HashSet<String>,

    /// Folder names (lowercased) skipped without descending
    pub skip_dirs: HashSet<String>,

    /// Include hidden files/directories
    pub show_hidden: bool,

    /// Drop arcade BIOS/device archives
    pub arcade_assets: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let mut extensions = HashSet::new();
        // Common ROM extensions
        for ext in &[
            "nes", "fds", "smc", "sfc", "n64", "z64", "v64", "gb", "gbc", "gba", "nds", "sms",
            "gg", "md", "gen", "bin", "32x", "pce", "sgx", "iso", "cso", "chd", "pbp", "cue",
            "a26", "a78", "lnx", "ngp", "ngc", "ws", "wsc", "zip", "7z",
        ] {
            extensions.insert(format!(".{}", ext));
        }

        let skip_dirs = SKIP_FOLDERS.iter().map(|s| s.to_string()).collect();

        Self {
            extensions,
            skip_dirs,
            show_hidden: false,
            arcade_assets: false,
        }
    }
}

impl ScanConfig {
    /// Scan configuration for a configured system
    pub fn for_system(system: &SystemConfig, show_hidden: bool) -> Self {
        let mut skip_dirs: HashSet<String> = SKIP_FOLDERS.iter().map(|s| s.to_string()).collect();
        for (name, folders) in SYSTEM_SKIP_FOLDERS {
            if system.name == *name {
                skip_dirs.extend(folders.iter().map(|s| s.to_string()));
            }
        }
        skip_dirs.extend(system.skip_folders.iter().map(|s| s.to_lowercase()));

        Self {
            extensions: system.extensions().into_iter().collect(),
            skip_dirs,
            show_hidden,
            arcade_assets: system.has_platform("arcade") || system.has_platform("neogeo"),
        }
    }

    /// Only the given extensions, default skip list
    pub fn with_extensions<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            extensions: extensions
                .into_iter()
                .map(|e| e.as_ref().to_lowercase())
                .collect(),
            ..Self::default()
        }
    }

    fn skips_folder(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.skip_dirs.contains(&lower) || SKIP_PREFIXES.iter().any(|p| lower.starts_with(p))
    }
}

/// ROM scanner
pub struct RomScanner {
    config: ScanConfig,
}

impl Default for RomScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl RomScanner {
    /// Create a new scanner with default config
    pub fn new() -> Self {
        Self {
            config: ScanConfig::default(),
        }
    }

    /// Create with custom config
    pub fn with_config(config: ScanConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan a root directory into a fresh tree
    pub fn scan(&self, root: &Path) -> Result<(Tree, ScanResult), LibraryError> {
        let root = fs::canonicalize(root).map_err(|_| LibraryError::PathNotFound(root.to_path_buf()))?;
        if !root.is_dir() {
            return Err(LibraryError::PathNotFound(root));
        }

        let mut tree = Tree::new(root);
        let result = self.scan_into(&mut tree);
        Ok((tree, result))
    }

    /// Scan the filesystem under an existing tree's root, adding only what
    /// the tree's index does not already hold
    pub fn scan_into(&self, tree: &mut Tree) -> ScanResult {
        let start = Instant::now();
        let mut result = ScanResult::default();

        let root_path = tree.root_path().to_path_buf();
        let walk_path = fs::canonicalize(&root_path).unwrap_or_else(|_| root_path.clone());
        let root = tree.root();
        self.scan_dir(tree, root, &root_path, &walk_path, &mut result);

        result.duration_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Scanned {}: {} games, {} folders in {}ms",
            root_path.display(),
            result.games_found,
            result.folders_found,
            result.duration_ms
        );
        result
    }

    /// Recursively scan a directory. Returns the number of games at or
    /// below it.
    fn scan_dir(
        &self,
        tree: &mut Tree,
        dir: NodeId,
        path: &Path,
        walk_path: &Path,
        result: &mut ScanResult,
    ) -> usize {
        let entries = match fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", path.display(), e);
                result.errors.push(format!("{}: {}", path.display(), e));
                return 0;
            }
        };

        let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
        entries.sort_by_key(|entry| entry.file_name());

        let mut found = 0;
        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();

            // Skip hidden files/directories
            if !self.config.show_hidden && is_hidden(&name) {
                continue;
            }

            let entry_path = path.join(&name);
            let Ok(file_type) = entry.file_type() else {
                continue;
            };

            let mut next_walk = walk_path.join(&name);
            if file_type.is_symlink() {
                match fs::canonicalize(&entry_path) {
                    Ok(target) => {
                        if walk_path.starts_with(&target) {
                            debug!("Skipping recursive symlink {}", entry_path.display());
                            continue;
                        }
                        next_walk = target;
                    }
                    Err(_) => {
                        debug!("Skipping dangling symlink {}", entry_path.display());
                        continue;
                    }
                }
            }

            let Ok(meta) = fs::metadata(&entry_path) else {
                continue;
            };

            let extension = extension_of(&name);
            let matches = extension
                .as_ref()
                .is_some_and(|ext| self.config.extensions.contains(ext));

            if matches {
                if tree.is_indexed(&entry_path) {
                    if tree.find(&entry_path).is_some() {
                        found += 1;
                    }
                    continue;
                }

                if meta.is_file() && self.is_arcade_asset(&entry_path, extension.as_deref()) {
                    tree.register_asset(entry_path);
                    result.assets_skipped += 1;
                    continue;
                }

                let metadata = Metadata::with_name(default_name(&entry_path, true));
                tree.add_child(dir, NodeKind::Game, entry_path, metadata);
                result.games_found += 1;
                found += 1;
                continue;
            }

            if !meta.is_dir() || self.config.skips_folder(&name) {
                continue;
            }

            let (folder, created) = match tree.find(&entry_path) {
                Some(existing) => (existing, false),
                None => {
                    let metadata = Metadata::with_name(default_name(&entry_path, false));
                    (tree.add_child(dir, NodeKind::Folder, entry_path.clone(), metadata), true)
                }
            };

            let below = self.scan_dir(tree, folder, &entry_path, &next_walk, result);
            if below == 0 && created {
                tree.remove(folder);
            } else {
                if created {
                    result.folders_found += 1;
                }
                found += below;
            }
        }

        found
    }

    fn is_arcade_asset(&self, path: &Path, extension: Option<&str>) -> bool {
        if !self.config.arcade_assets {
            return false;
        }
        let (Some(stem), Some(extension)) = (path.file_stem(), extension) else {
            return false;
        };
        arcade::is_asset(&stem.to_string_lossy(), extension)
    }
}
