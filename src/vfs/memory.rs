//! In-memory filesystem, one instance per execution context.

use std::collections::BTreeMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::path::VfsPath;
use super::{FileSystem, VfsError, VfsResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Directory,
    File(String),
}

/// Path-to-content mapping standing in for disk storage.
#[derive(Debug)]
pub struct MemoryFileSystem {
    nodes: DashMap<VfsPath, Node>,
}

impl MemoryFileSystem {
    /// An empty filesystem holding only the root directory.
    pub fn new() -> Self {
        let nodes = DashMap::new();
        nodes.insert(VfsPath::root(), Node::Directory);
        Self { nodes }
    }

    fn require_directory(&self, path: &VfsPath) -> VfsResult<()> {
        match self.nodes.get(path).map(|node| node.value().clone()) {
            Some(Node::Directory) => Ok(()),
            Some(Node::File(_)) => Err(VfsError::NotADirectory(path.clone())),
            None => Err(VfsError::NotFound(path.clone())),
        }
    }

    /// Every file and its content, ordered by path.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.nodes
            .iter()
            .filter_map(|entry| match entry.value() {
                Node::File(content) => Some((entry.key().to_string(), content.clone())),
                Node::Directory => None,
            })
            .collect()
    }

    /// Every directory, ordered by path.
    pub fn directories(&self) -> Vec<String> {
        let mut dirs: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| *entry.value() == Node::Directory)
            .map(|entry| entry.key().to_string())
            .collect();
        dirs.sort();
        dirs
    }
}

impl Default for MemoryFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &VfsPath) -> bool {
        self.nodes.contains_key(path)
    }

    fn is_file(&self, path: &VfsPath) -> bool {
        matches!(self.nodes.get(path).as_deref(), Some(Node::File(_)))
    }

    fn mkdir(&self, path: &VfsPath, recursive: bool) -> VfsResult<()> {
        if recursive {
            for dir in path.ancestors().iter().chain(std::iter::once(path)) {
                match self.nodes.entry(dir.clone()) {
                    Entry::Occupied(entry) => {
                        if *entry.get() != Node::Directory {
                            return Err(VfsError::NotADirectory(dir.clone()));
                        }
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(Node::Directory);
                    }
                }
            }
            return Ok(());
        }

        let parent = path.parent().ok_or_else(|| VfsError::AlreadyExists(path.clone()))?;
        self.require_directory(&parent)?;
        match self.nodes.entry(path.clone()) {
            Entry::Occupied(_) => Err(VfsError::AlreadyExists(path.clone())),
            Entry::Vacant(entry) => {
                entry.insert(Node::Directory);
                Ok(())
            }
        }
    }

    fn write_file(&self, path: &VfsPath, content: &str) -> VfsResult<()> {
        let parent = path.parent().ok_or_else(|| VfsError::IsADirectory(path.clone()))?;
        self.require_directory(&parent)?;
        match self.nodes.entry(path.clone()) {
            Entry::Occupied(mut entry) => {
                if *entry.get() == Node::Directory {
                    return Err(VfsError::IsADirectory(path.clone()));
                }
                entry.insert(Node::File(content.to_string()));
            }
            Entry::Vacant(entry) => {
                entry.insert(Node::File(content.to_string()));
            }
        }
        Ok(())
    }

    fn read_file(&self, path: &VfsPath) -> VfsResult<String> {
        match self.nodes.get(path).map(|node| node.value().clone()) {
            Some(Node::File(content)) => Ok(content),
            Some(Node::Directory) => Err(VfsError::IsADirectory(path.clone())),
            None => Err(VfsError::NotFound(path.clone())),
        }
    }

    fn unlink(&self, path: &VfsPath) -> VfsResult<()> {
        match self.nodes.entry(path.clone()) {
            Entry::Occupied(entry) => {
                if *entry.get() == Node::Directory {
                    return Err(VfsError::IsADirectory(path.clone()));
                }
                entry.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(VfsError::NotFound(path.clone())),
        }
    }
}
