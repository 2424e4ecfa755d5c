//! Generic filesystem abstraction.
//!
//! Template repositories are read through the [`Filesystem`] trait so that
//! consumers do not care whether the content lives in a snapshot directory
//! on disk ([`LocalFs`]) or was copied into memory ([`MemoryFs`]).
//!
//! All paths are relative, `/` separated and rooted at the filesystem base.
//! An empty string (or `.`) is the root itself. Paths escaping the root
//! with `..` are rejected.
//!
//! Symbolic links are entries of their own ([`EntryKind::Symlink`]). They are
//! copied as links and never followed, so content outside the root cannot
//! show up through a link.

mod copy;
mod local;
mod memory;

pub use copy::copy_fs;
pub use local::LocalFs;
pub use memory::MemoryFs;

use std::fmt;
use std::path::Path;

use crate::error::{CoreError, Result};

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
}

/// A single entry returned by [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }

    pub fn is_symlink(&self) -> bool {
        self.kind == EntryKind::Symlink
    }
}

/// Operations the template layer needs from a filesystem.
pub trait Filesystem: Send + Sync + fmt::Debug {
    /// Absolute base directory on disk, `None` for in-memory filesystems.
    fn base_path(&self) -> Option<&Path>;

    fn exists(&self, path: &str) -> bool;

    fn is_dir(&self, path: &str) -> bool;

    fn is_file(&self, path: &str) -> bool;

    fn is_symlink(&self, path: &str) -> bool;

    /// Creates the directory and all missing parents.
    fn mkdir_all(&self, path: &str) -> Result<()>;

    fn read_file(&self, path: &str) -> Result<Vec<u8>>;

    /// Writes the file, creating missing parent directories.
    fn write_file(&self, path: &str, content: &[u8]) -> Result<()>;

    /// Returns the target of a symbolic link, as stored in the link.
    fn read_link(&self, path: &str) -> Result<String>;

    /// Creates a symbolic link, replacing an existing file or link.
    fn write_link(&self, path: &str, target: &str) -> Result<()>;

    /// Lists direct children of a directory, sorted by name.
    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// Removes a file or a whole directory tree. Missing paths are ignored.
    fn remove_all(&self, path: &str) -> Result<()>;

    fn read_to_string(&self, path: &str) -> Result<String> {
        let bytes = self.read_file(path)?;
        String::from_utf8(bytes).map_err(|e| CoreError::decode(path, e.to_string()))
    }

    /// Returns relative paths of all files and symbolic links under `path`, sorted.
    fn walk_files(&self, path: &str) -> Result<Vec<String>> {
        let root = normalize(path)?;
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(dir) = stack.pop() {
            let mut entries = self.read_dir(&dir)?;
            entries.reverse();
            for entry in entries {
                let child = join(&dir, &entry.name);
                match entry.kind {
                    EntryKind::Dir => stack.push(child),
                    EntryKind::File | EntryKind::Symlink => out.push(child),
                }
            }
        }
        out.sort();
        Ok(out)
    }
}

/// Normalizes a relative path: drops empty and `.` segments, rejects `..`.
pub fn normalize(path: &str) -> Result<String> {
    let mut parts = Vec::new();
    for part in path.split(['/', '\\']) {
        match part {
            "" | "." => {},
            ".." => return Err(CoreError::OutsideRoot { path: path.into() }),
            other => parts.push(other),
        }
    }
    Ok(parts.join("/"))
}

/// Joins two relative paths with `/`.
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{name}"),
    }
}

/// Returns the parent of a normalized relative path, `None` for the root.
pub fn parent(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rfind('/').map(|i| &path[..i]).unwrap_or(""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("").unwrap(), "");
        assert_eq!(normalize(".").unwrap(), "");
        assert_eq!(normalize("/a//b/./c/").unwrap(), "a/b/c");
        assert!(normalize("a/../../etc").is_err());
    }

    #[test]
    fn test_join() {
        assert_eq!(join("", "a"), "a");
        assert_eq!(join("a/", "/b"), "a/b");
        assert_eq!(join("a", ""), "a");
    }

    #[test]
    fn test_parent() {
        assert_eq!(parent(""), None);
        assert_eq!(parent("a"), Some(""));
        assert_eq!(parent("a/b/c"), Some("a/b"));
    }
}
