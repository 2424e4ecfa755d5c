//! Filesystem rooted at a directory on disk.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::{DirEntry, EntryKind, Filesystem, normalize, parent};
use crate::error::{CoreError, Result};

/// A [`Filesystem`] backed by a real directory.
#[derive(Debug, Clone)]
pub struct LocalFs {
    base: PathBuf,
}

impl LocalFs {
    /// Opens an existing directory.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self> {
        let base = base.into();
        let meta = fs::metadata(&base).map_err(|e| CoreError::io(&base, e))?;
        if !meta.is_dir() {
            return Err(CoreError::not_a_dir(base.display().to_string()));
        }
        Ok(Self { base })
    }

    /// Absolute base directory.
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Resolves a relative path to an absolute one.
    ///
    /// Fails when a parent component of the path is a symbolic link. The
    /// last component may be a link, callers inspect it with
    /// [`fs::symlink_metadata`].
    pub fn abs_path(&self, path: &str) -> Result<PathBuf> {
        let rel = normalize(path)?;
        let mut abs = self.base.clone();
        let mut parts = rel.split('/').filter(|p| !p.is_empty()).peekable();
        while let Some(part) = parts.next() {
            abs.push(part);
            if parts.peek().is_none() {
                break;
            }
            match fs::symlink_metadata(&abs) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    let link = abs.strip_prefix(&self.base).unwrap_or(abs.as_path());
                    return Err(CoreError::SymlinkInPath {
                        path: rel.clone(),
                        link: link.to_string_lossy().into_owned(),
                    });
                },
                Ok(_) => {},
                // Missing parents are reported by the operation itself
                Err(_) => break,
            }
        }
        for part in parts {
            abs.push(part);
        }
        Ok(abs)
    }

    fn metadata(&self, path: &str) -> Option<fs::Metadata> {
        let abs = self.abs_path(path).ok()?;
        if abs == self.base {
            // The base itself may be reached through a link
            return fs::metadata(abs).ok();
        }
        fs::symlink_metadata(abs).ok()
    }
}

impl Filesystem for LocalFs {
    fn base_path(&self) -> Option<&Path> {
        Some(&self.base)
    }

    fn exists(&self, path: &str) -> bool {
        self.metadata(path).is_some()
    }

    fn is_dir(&self, path: &str) -> bool {
        self.metadata(path).is_some_and(|m| m.is_dir())
    }

    fn is_file(&self, path: &str) -> bool {
        self.metadata(path).is_some_and(|m| m.is_file())
    }

    fn is_symlink(&self, path: &str) -> bool {
        self.metadata(path).is_some_and(|m| m.file_type().is_symlink())
    }

    fn mkdir_all(&self, path: &str) -> Result<()> {
        let abs = self.abs_path(path)?;
        if self.is_symlink(path) {
            return Err(CoreError::not_a_dir(path));
        }
        fs::create_dir_all(&abs).map_err(|e| CoreError::io(abs, e))
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let abs = self.abs_path(path)?;
        if self.is_symlink(path) {
            return Err(CoreError::not_a_file(path));
        }
        fs::read(&abs).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::not_found(path),
            _ if abs.is_dir() => CoreError::not_a_file(path),
            _ => CoreError::io(abs, e),
        })
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let rel = normalize(path)?;
        if let Some(dir) = parent(&rel) {
            self.mkdir_all(dir)?;
        }
        let abs = self.abs_path(&rel)?;
        // Writing through an existing link would modify its target
        if self.is_symlink(&rel) {
            fs::remove_file(&abs).map_err(|e| CoreError::io(&abs, e))?;
        }
        fs::write(&abs, content).map_err(|e| CoreError::io(abs, e))
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let abs = self.abs_path(path)?;
        match fs::symlink_metadata(&abs) {
            Ok(meta) if meta.file_type().is_symlink() => {},
            Ok(_) => return Err(CoreError::not_a_symlink(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(CoreError::not_found(path)),
            Err(e) => return Err(CoreError::io(abs, e)),
        }
        let target = fs::read_link(&abs).map_err(|e| CoreError::io(&abs, e))?;
        Ok(target.to_string_lossy().into_owned())
    }

    fn write_link(&self, path: &str, target: &str) -> Result<()> {
        let rel = normalize(path)?;
        if rel.is_empty() {
            return Err(CoreError::not_a_symlink(rel));
        }
        if let Some(dir) = parent(&rel) {
            self.mkdir_all(dir)?;
        }
        let abs = self.abs_path(&rel)?;
        match fs::symlink_metadata(&abs) {
            Ok(meta) if meta.is_dir() => return Err(CoreError::not_a_symlink(rel)),
            Ok(_) => fs::remove_file(&abs).map_err(|e| CoreError::io(&abs, e))?,
            Err(_) => {},
        }
        create_symlink(target, &abs).map_err(|e| CoreError::io(abs, e))
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let abs = self.abs_path(path)?;
        if self.is_symlink(path) {
            return Err(CoreError::not_a_dir(path));
        }
        let iter = fs::read_dir(&abs).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => CoreError::not_found(path),
            _ if abs.is_file() => CoreError::not_a_dir(path),
            _ => CoreError::io(&abs, e),
        })?;

        let mut entries = Vec::new();
        for entry in iter {
            let entry = entry.map_err(|e| CoreError::io(&abs, e))?;
            // The entry's own type, links are not followed
            let file_type = entry.file_type().map_err(|e| CoreError::io(entry.path(), e))?;
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Dir
            } else {
                EntryKind::File
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind,
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let abs = self.abs_path(path)?;
        let meta = if abs == self.base {
            fs::metadata(&abs)
        } else {
            fs::symlink_metadata(&abs)
        };
        let result = match meta {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(&abs),
            Ok(_) => fs::remove_file(&abs),
            Err(e) => Err(e),
        };
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(CoreError::io(abs, e)),
            _ => Ok(()),
        }
    }
}

#[cfg(unix)]
fn create_symlink(target: &str, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_symlink(_target: &str, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symbolic links are only supported on unix",
    ))
}
