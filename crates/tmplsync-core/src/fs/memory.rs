//! In-memory filesystem.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::RwLock;

use super::{DirEntry, EntryKind, Filesystem, normalize, parent};
use crate::error::{CoreError, Result};

#[derive(Debug, Clone)]
enum Node {
    Dir,
    File(Vec<u8>),
    /// Target text of a symbolic link
    Link(String),
}

/// A [`Filesystem`] kept entirely in memory.
///
/// Used to hand a resolved template to downstream code without keeping a
/// repository snapshot locked.
#[derive(Debug, Default)]
pub struct MemoryFs {
    // The root ("") is implicit and never stored
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored files.
    pub fn file_count(&self) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|n| matches!(n, Node::File(_)))
            .count()
    }

    fn insert_dirs(nodes: &mut BTreeMap<String, Node>, path: &str) -> Result<()> {
        let mut current = String::new();
        for part in path.split('/').filter(|p| !p.is_empty()) {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(part);
            match nodes.get(&current) {
                Some(Node::Dir) => {},
                Some(Node::File(_) | Node::Link(_)) => return Err(CoreError::not_a_dir(current)),
                None => {
                    nodes.insert(current.clone(), Node::Dir);
                },
            }
        }
        Ok(())
    }
}

impl Filesystem for MemoryFs {
    fn base_path(&self) -> Option<&Path> {
        None
    }

    fn exists(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) if p.is_empty() => true,
            Ok(p) => self.nodes.read().contains_key(&p),
            Err(_) => false,
        }
    }

    fn is_dir(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) if p.is_empty() => true,
            Ok(p) => matches!(self.nodes.read().get(&p), Some(Node::Dir)),
            Err(_) => false,
        }
    }

    fn is_file(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) => matches!(self.nodes.read().get(&p), Some(Node::File(_))),
            Err(_) => false,
        }
    }

    fn is_symlink(&self, path: &str) -> bool {
        match normalize(path) {
            Ok(p) => matches!(self.nodes.read().get(&p), Some(Node::Link(_))),
            Err(_) => false,
        }
    }

    fn mkdir_all(&self, path: &str) -> Result<()> {
        let p = normalize(path)?;
        Self::insert_dirs(&mut self.nodes.write(), &p)
    }

    fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let p = normalize(path)?;
        match self.nodes.read().get(&p) {
            Some(Node::File(content)) => Ok(content.clone()),
            Some(Node::Dir | Node::Link(_)) => Err(CoreError::not_a_file(p)),
            None if p.is_empty() => Err(CoreError::not_a_file(p)),
            None => Err(CoreError::not_found(p)),
        }
    }

    fn write_file(&self, path: &str, content: &[u8]) -> Result<()> {
        let p = normalize(path)?;
        if p.is_empty() {
            return Err(CoreError::not_a_file(p));
        }
        let mut nodes = self.nodes.write();
        if let Some(dir) = parent(&p) {
            Self::insert_dirs(&mut nodes, dir)?;
        }
        if let Some(Node::Dir) = nodes.get(&p) {
            return Err(CoreError::not_a_file(p));
        }
        nodes.insert(p, Node::File(content.to_vec()));
        Ok(())
    }

    fn read_link(&self, path: &str) -> Result<String> {
        let p = normalize(path)?;
        match self.nodes.read().get(&p) {
            Some(Node::Link(target)) => Ok(target.clone()),
            Some(_) => Err(CoreError::not_a_symlink(p)),
            None if p.is_empty() => Err(CoreError::not_a_symlink(p)),
            None => Err(CoreError::not_found(p)),
        }
    }

    fn write_link(&self, path: &str, target: &str) -> Result<()> {
        let p = normalize(path)?;
        if p.is_empty() {
            return Err(CoreError::not_a_symlink(p));
        }
        let mut nodes = self.nodes.write();
        if let Some(dir) = parent(&p) {
            Self::insert_dirs(&mut nodes, dir)?;
        }
        if let Some(Node::Dir) = nodes.get(&p) {
            return Err(CoreError::not_a_symlink(p));
        }
        nodes.insert(p, Node::Link(target.to_string()));
        Ok(())
    }

    fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let p = normalize(path)?;
        let nodes = self.nodes.read();
        if !p.is_empty() {
            match nodes.get(&p) {
                Some(Node::Dir) => {},
                Some(Node::File(_) | Node::Link(_)) => return Err(CoreError::not_a_dir(p)),
                None => return Err(CoreError::not_found(p)),
            }
        }

        let prefix = if p.is_empty() { String::new() } else { format!("{p}/") };
        let entries = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter_map(|(key, node)| {
                let name = &key[prefix.len()..];
                if name.is_empty() || name.contains('/') {
                    return None;
                }
                let kind = match node {
                    Node::Dir => EntryKind::Dir,
                    Node::File(_) => EntryKind::File,
                    Node::Link(_) => EntryKind::Symlink,
                };
                Some(DirEntry {
                    name: name.to_string(),
                    kind,
                })
            })
            .collect();
        Ok(entries)
    }

    fn remove_all(&self, path: &str) -> Result<()> {
        let p = normalize(path)?;
        let mut nodes = self.nodes.write();
        if p.is_empty() {
            nodes.clear();
            return Ok(());
        }
        let prefix = format!("{p}/");
        nodes.retain(|key, _| key != &p && !key.starts_with(&prefix));
        Ok(())
    }
}
