//! This module provides the native filesystem capability backed by a real directory tree on the
//! host system. Every call goes straight to `tokio::fs`; nothing is cached here.
//!
//! ### Key Features:
//! - **No state**: the document store owns caching, `DirFS` only performs I/O.
//! - **Symlink aware**: `stat()` does not follow a trailing symbolic link, so listings can tell
//!   links apart from their targets.
//! - **Recursive mkdir**: `mkdir_all()` reports exactly which directories it created, so a caller
//!   can later remove only its own artifacts.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::core::FsBackend;
use crate::vfs::{DocumentStat, EntryType};

/// Native filesystem capability over the host directory tree.
///
/// ### Usage notes:
/// - Paths are host paths; confinement to a virtual root is the store's job.
/// - `append()` creates a missing file, `write()` truncates an existing one.
/// - Errors are plain `std::io::Error`s so callers can match on `ErrorKind::NotFound`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirFS;

impl DirFS {
    pub fn new() -> Self {
        Self
    }
}

fn millis(time: io::Result<SystemTime>) -> Option<u64> {
    let time = time.ok()?;
    let elapsed = time.duration_since(UNIX_EPOCH).ok()?;
    u64::try_from(elapsed.as_millis()).ok()
}

fn entry_type(file_type: std::fs::FileType) -> EntryType {
    if file_type.is_symlink() {
        return EntryType::Symlink;
    }
    if file_type.is_dir() {
        return EntryType::Directory;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::FileTypeExt;
        if file_type.is_block_device() {
            return EntryType::BlockDevice;
        }
        if file_type.is_char_device() {
            return EntryType::CharDevice;
        }
        if file_type.is_fifo() {
            return EntryType::Fifo;
        }
        if file_type.is_socket() {
            return EntryType::Socket;
        }
    }
    EntryType::File
}

fn stat_from_metadata(meta: &std::fs::Metadata) -> DocumentStat {
    let mut stat = DocumentStat {
        exists: true,
        entry_type: Some(entry_type(meta.file_type())),
        size: meta.len(),
        atime_ms: millis(meta.accessed()),
        mtime_ms: millis(meta.modified()),
        birthtime_ms: millis(meta.created()),
        ..Default::default()
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        let ctime = meta.ctime().max(0) as u64 * 1000 + meta.ctime_nsec().max(0) as u64 / 1_000_000;
        stat.ctime_ms = Some(ctime);
        stat.dev = Some(meta.dev());
        stat.ino = Some(meta.ino());
        stat.mode = Some(meta.mode());
        stat.nlink = Some(meta.nlink());
        stat.uid = Some(meta.uid());
        stat.gid = Some(meta.gid());
    }

    stat
}

#[async_trait]
impl FsBackend for DirFS {
    async fn exists(&self, path: &Path) -> bool {
        fs::symlink_metadata(path).await.is_ok()
    }

    async fn stat(&self, path: &Path) -> io::Result<DocumentStat> {
        let meta = fs::symlink_metadata(path).await?;
        Ok(stat_from_metadata(&meta))
    }

    async fn mkdir_all(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        // Looking for the first existing parent
        let mut existed_part = path.to_path_buf();
        while !fs::try_exists(&existed_part).await? {
            match existed_part.parent() {
                Some(parent) => existed_part = parent.to_path_buf(),
                None => break,
            }
        }
        if existed_part == path {
            if !fs::metadata(path).await?.is_dir() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{} exists and is not a directory", path.display()),
                ));
            }
            return Ok(Vec::new());
        }

        // Create from the closest existing parent to the target path
        let need_to_create: Vec<_> = path
            .strip_prefix(&existed_part)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?
            .components()
            .collect();

        let mut created = Vec::new();
        let mut built = existed_part;
        for component in need_to_create {
            built.push(component);
            match fs::create_dir(&built).await {
                Ok(()) => created.push(built.clone()),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e),
            }
        }

        Ok(created)
    }

    async fn read_dir(&self, path: &Path) -> io::Result<Vec<(String, EntryType)>> {
        let mut reader = fs::read_dir(path).await?;
        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = entry_type(entry.file_type().await?);
            entries.push((name, kind));
        }
        Ok(entries)
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn write(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        fs::write(path, content).await
    }

    async fn append(&self, path: &Path, content: &[u8]) -> io::Result<()> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(content).await?;
        file.flush().await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }

    async fn remove_dir(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir(path).await
    }

    async fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path).await
    }
}
