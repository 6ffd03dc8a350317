//! Custom collection membership files
//!
//! One plain-text file per collection, `custom-<name>.cfg`, holding one game
//! path per line. Lines may be absolute, `~/`-relative or relative to the
//! ROM base directory. Blank lines and `#` comments are ignored.

use super::instance::CollectionInstance;
use crate::paths::{normalize, replace_file};
use crate::tree::NodeRef;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const MEMBERSHIP_PREFIX: &str = "custom-";
const MEMBERSHIP_EXTENSION: &str = "cfg";
const COMMENT: char = '#';

/// Canonical game path -> system node, built once from the "all games"
/// collection and shared read-only by every custom population in a batch
#[derive(Debug, Default)]
pub struct SharedPathIndex {
    paths: HashMap<PathBuf, NodeRef>,
}

impl SharedPathIndex {
    pub fn from_collection(all: &CollectionInstance) -> Self {
        let tree = all.tree();
        let paths = tree
            .aliases()
            .into_iter()
            .filter_map(|id| {
                let node = &tree[id];
                node.alias_target()
                    .map(|target| (node.path().to_path_buf(), target))
            })
            .collect();
        Self { paths }
    }

    pub fn get(&self, path: &Path) -> Option<NodeRef> {
        self.paths.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

pub fn membership_file(collections_dir: &Path, name: &str) -> PathBuf {
    collections_dir.join(format!(
        "{}{}.{}",
        MEMBERSHIP_PREFIX, name, MEMBERSHIP_EXTENSION
    ))
}

/// Names of the custom collections with a membership file in `dir`
pub fn discover(collections_dir: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(collections_dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| {
            let file_name = entry.file_name().to_string_lossy().to_string();
            let name = file_name
                .strip_prefix(MEMBERSHIP_PREFIX)?
                .strip_suffix(MEMBERSHIP_EXTENSION)?
                .strip_suffix('.')?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect();
    names.sort();
    names
}

/// Meaningful lines of a membership file. A missing file has none.
pub fn read_membership(file: &Path) -> Vec<String> {
    let contents = match fs::read_to_string(file) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Vec::new(),
        Err(e) => {
            warn!("Cannot read collection file {}: {}", file.display(), e);
            return Vec::new();
        }
    };
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(COMMENT))
        .map(str::to_string)
        .collect()
}

/// How a member path is written: relative to the ROM base when below it,
/// `~/`-relative when below home, absolute otherwise
pub fn membership_line(path: &Path, roms_base: &Path, home: Option<&Path>) -> String {
    let path = normalize(path);
    if let Ok(relative) = path.strip_prefix(normalize(roms_base)) {
        return slash_joined(relative);
    }
    if let Some(home) = home {
        if let Ok(relative) = path.strip_prefix(home) {
            return format!("~/{}", slash_joined(relative));
        }
    }
    path.to_string_lossy().to_string()
}

fn slash_joined(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Replace a membership file with the given members
pub fn write_membership(
    file: &Path,
    name: &str,
    members: &[PathBuf],
    roms_base: &Path,
) -> io::Result<()> {
    let home = dirs::home_dir();
    let mut contents = format!("{} {}\n", COMMENT, name);
    for member in members {
        contents.push_str(&membership_line(member, roms_base, home.as_deref()));
        contents.push('\n');
    }
    replace_file(file, contents.as_bytes(), false)
}
