//! This module provides the native filesystem capability implemented over a memory storage.

use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::FsBackend;
use crate::vfs::{DocumentStat, EntryType};

/// A filesystem capability that keeps files and directories in memory using a hierarchical map
/// structure.
///
/// `MapFS` behaves like a small POSIX directory tree: writing a file requires its parent
/// directory, removing a non-empty directory fails, and timestamps advance on every write.
/// It lets the document store be exercised without touching the host filesystem.
///
/// ### Invariants
///
/// 1. **Root existence**: The path `/` is always present and has type `Directory`.
/// 2. **Path normalization**: All keys are absolute and normalized (no `.`, `..` or `//`).
/// 3. **Parent consistency**: For any node at `/a/b/c`, there is a `Directory` node at `/a/b`.
///
/// ### Thread Safety
///
/// The map is guarded by a `parking_lot::Mutex`; the lock is never held across an `.await`.
pub struct MapFS {
    nodes: Mutex<BTreeMap<PathBuf, Node>>,
}

#[derive(Debug, Clone)]
struct Node {
    entry_type: EntryType,
    content: Vec<u8>,
    created_ms: u64,
    modified_ms: u64,
    accessed_ms: u64,
}

impl Node {
    fn new(entry_type: EntryType) -> Self {
        let now = now_ms();
        Self {
            entry_type,
            content: Vec::new(),
            created_ms: now,
            modified_ms: now,
            accessed_ms: now,
        }
    }

    fn stat(&self) -> DocumentStat {
        DocumentStat {
            exists: true,
            entry_type: Some(self.entry_type),
            size: self.content.len() as u64,
            atime_ms: Some(self.accessed_ms),
            mtime_ms: Some(self.modified_ms),
            ctime_ms: Some(self.modified_ms),
            birthtime_ms: Some(self.created_ms),
            nlink: Some(1),
            ..Default::default()
        }
    }

    fn touch(&mut self) {
        let now = now_ms();
        self.modified_ms = now.max(self.modified_ms);
        self.accessed_ms = self.modified_ms;
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("No such file or directory: {}", path.display()),
    )
}

fn is_a_directory(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::IsADirectory,
        format!("{} is a directory", path.display()),
    )
}

/// Absolute, normalized key for `path`.
fn key(path: &Path) -> PathBuf {
    let mut result = PathBuf::from("/");
    for component in path.components() {
        match component {
            Component::Normal(name) => result.push(name),
            Component::ParentDir => {
                result.pop();
            }
            _ => {}
        }
    }
    result
}

impl Default for MapFS {
    fn default() -> Self {
        Self::new()
    }
}

impl MapFS {
    /// Creates new MapFS instance containing only the root directory `/`.
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(PathBuf::from("/"), Node::new(EntryType::Directory));
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    fn parent_is_dir(nodes: &BTreeMap<PathBuf, Node>, path: &Path) -> io::Result<()> {
        let parent = path.parent().ok_or_else(|| not_found(path))?;
        match nodes.get(parent) {
            Some(node) if node.entry_type == EntryType::Directory => Ok(()),
            Some(_) => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", parent.display()),
            )),
            None => Err(not_found(parent)),
        }
    }

    fn put(&self, path: &Path, content: &[u8], append: bool) -> io::Result<()> {
        let path = key(path);
        let mut nodes = self.nodes.lock();
        Self::parent_is_dir(&nodes, &path)?;
        match nodes.get_mut(&path) {
            Some(node) if node.entry_type == EntryType::Directory => Err(is_a_directory(&path)),
            Some(node) => {
                if !append {
                    node.content.clear();
                }
                node.content.extend_from_slice(content);
                node.touch();
                Ok(())
            }
            None => {
                let mut node = Node::new(EntryType::File);
                node.content.extend_from_slice(content);
                nodes.insert(path, node);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl FsBackend for MapFS {
    async fn exists(&self, path: &Path) -> bool {
        self.nodes.lock().contains_key(&key(path))
    }

    async fn stat(&self, path: &Path) -> io::Result<DocumentStat> {
        let path = key(path);
        self.nodes
            .lock()
            .get(&path)
            .map(Node::stat)
            .ok_or_else(|| not_found(&path))
    }

    async fn mkdir_all(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let path = key(path);
        let mut nodes = self.nodes.lock();
        let mut created = Vec::new();
        let mut built = PathBuf::from("/");
        for component in path.components().skip(1) {
            built.push(component);
            match nodes.get(&built) {
                Some(node) if node.entry_type == EntryType::Directory => {}
                Some(_) => {
                    return Err(io::Error::new(
                        io::ErrorKind::AlreadyExists,
                        format!("{} exists and is not a directory", built.display()),
                    ));
                }
                None => {
                    nodes.insert(built.clone(), Node::new(EntryType::Directory));
                    created.push(built.clone());
                }
            }
        }
        Ok(created)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<(String, EntryType)>> {
        let path = key(path);
        let nodes = self.nodes.lock();
        match nodes.get(&path) {
            Some(node) if node.entry_type == EntryType::Directory => {}
            Some(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::NotADirectory,
                    format!("{} is not a directory", path.display()),
                ));
            }
            None => return Err(not_found(&path)),
        }
        Ok(nodes
            .iter()
            .filter(|(p, _)| p.parent() == Some(path.as_path()))
            .filter_map(|(p, node)| {
                let name = p.file_name()?.to_string_lossy().into_owned();
                Some((name, node.entry_type))
            })
            .collect())
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        let path = key(path);
        let mut nodes = self.nodes.lock();
        match nodes.get_mut(&path) {
            Some(node) if node.entry_type == EntryType::Directory => Err(is_a_directory(&path)),
            Some(node) => {
                node.accessed_ms = now_ms();
                Ok(node.content.clone())
            }
            None => Err(not_found(&path)),
        }
    }

    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        self.put(path, content, false)
    }

    async fn append(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        self.put(path, content, true)
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        let path = key(path);
        let mut nodes = self.nodes.lock();
        match nodes.get(&path) {
            Some(node) if node.entry_type == EntryType::Directory => Err(is_a_directory(&path)),
            Some(_) => {
                nodes.remove(&path);
                Ok(())
            }
            None => Err(not_found(&path)),
        }
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        let path = key(path);
        if path == Path::new("/") {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "the root cannot be removed",
            ));
        }
        let mut nodes = self.nodes.lock();
        match nodes.get(&path) {
            Some(node) if node.entry_type != EntryType::Directory => Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", path.display()),
            )),
            Some(_) => {
                if nodes.keys().any(|p| p.parent() == Some(path.as_path())) {
                    return Err(io::Error::new(
                        io::ErrorKind::DirectoryNotEmpty,
                        format!("{} is not empty", path.display()),
                    ));
                }
                nodes.remove(&path);
                Ok(())
            }
            None => Err(not_found(&path)),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let path = key(path);
        let mut nodes = self.nodes.lock();
        if !nodes.contains_key(&path) {
            return Err(not_found(&path));
        }
        nodes.retain(|p, _| !p.starts_with(&path) || p == Path::new("/"));
        Ok(())
    }
}
