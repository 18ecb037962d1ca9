use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::vfs::{DocumentStat, EntryType};

pub mod error;
pub mod utils;

pub use error::StoreError;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Permission level requested from an [`crate::AccessGuard`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AccessLevel {
    Read,
    Write,
    Delete,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "r",
            AccessLevel::Write => "w",
            AccessLevel::Delete => "d",
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Native filesystem capability consumed by the document store.
///
/// All paths are host paths produced by [`crate::DocumentStore::location`].
/// Implementations report absence through `io::ErrorKind::NotFound`; the store
/// turns that into non-throwing sentinels.
#[async_trait]
pub trait FsBackend: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    /// Metadata of `path` without following a trailing symbolic link.
    async fn stat(&self, path: &Path) -> io::Result<DocumentStat>;

    /// Creates `path` and all missing parents.
    /// Returns the directories that were actually created, outermost first.
    async fn mkdir_all(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// Lists immediate children as `(name, type)` pairs in native order.
    async fn read_dir(&self, path: &Path) -> io::Result<Vec<(String, EntryType)>>;

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// Creates or truncates the file.
    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    /// Appends to the file, creating it when missing.
    async fn append(&self, path: &Path, content: &[u8]) -> io::Result<()>;

    async fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Removes an empty directory.
    async fn remove_dir(&self, path: &Path) -> io::Result<()>;

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}
