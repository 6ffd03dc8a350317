//! Path helpers shared by the scanner, gamelist store and collections

use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path: drop `.` components and fold `..` into
/// their parent. Does not touch the filesystem, so paths that no longer
/// exist normalize the same way as live ones.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Resolve a path as written in a gamelist or membership file.
/// `./x` and bare relative paths are taken relative to `base`, `~/x`
/// relative to the home directory, absolute paths as-is.
pub fn resolve_entry_path(raw: &str, base: &Path) -> PathBuf {
    let raw = raw.trim();
    if raw.starts_with('~') {
        return normalize(&cartridge_config::expand_home(raw));
    }
    let path = Path::new(raw);
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}

/// Format `path` relative to `root` the way gamelists store it:
/// `./` prefix, `/` separators. `None` when `path` is outside `root`.
pub fn relative_entry_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    if parts.is_empty() {
        return Some(".".to_string());
    }
    Some(format!("./{}", parts.join("/")))
}

/// Dotfiles are hidden
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.') && name != "." && name != ".."
}

/// Lowercased extension of a file name including the leading dot
pub fn extension_of(name: &str) -> Option<String> {
    let dot = name.rfind('.')?;
    if dot == 0 || dot + 1 == name.len() {
        return None;
    }
    Some(name[dot..].to_lowercase())
}

/// Hex SHA-256 of a byte slice
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write `bytes` next to `path` as a temporary file, then move it into
/// place. When `backup` is set the previous file is first rotated to
/// `<path>.old`, replacing any earlier backup. An empty temporary file is
/// never promoted.
pub fn replace_file(path: &Path, bytes: &[u8], backup: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = sibling_with_suffix(path, "tmp");
    fs::write(&tmp, bytes)?;

    if fs::metadata(&tmp)?.len() == 0 {
        let _ = fs::remove_file(&tmp);
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("refusing to replace {} with an empty file", path.display()),
        ));
    }

    promote(&tmp, path, backup, |from, to| fs::rename(from, to))
}

/// Move `tmp` over `path`, rotating the previous file to `.old` first when
/// `backup` is set. If the final move fails the backup is moved back, so
/// the previous file stays in place.
fn promote(
    tmp: &Path,
    path: &Path,
    backup: bool,
    rename: impl Fn(&Path, &Path) -> io::Result<()>,
) -> io::Result<()> {
    let mut rotated = None;
    if backup && path.exists() {
        let old = sibling_with_suffix(path, "old");
        if old.exists() {
            fs::remove_file(&old)?;
        }
        rename(path, &old)?;
        rotated = Some(old);
    }

    if let Err(e) = rename(tmp, path) {
        if let Some(old) = rotated {
            rename(&old, path)?;
        }
        let _ = fs::remove_file(tmp);
        return Err(e);
    }
    Ok(())
}

/// `/a/b/gamelist.xml` + `old` -> `/a/b/gamelist.xml.old`
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".");
    name.push(suffix);
    path.with_file_name(name)
}
