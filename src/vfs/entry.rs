use serde::Serialize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    File,
    Directory,
    Symlink,
    BlockDevice,
    CharDevice,
    Fifo,
    Socket,
}

/// Metadata snapshot of a document.
///
/// Timestamps are milliseconds since the Unix epoch. A stat with
/// `exists == false` carries no meaningful size or timestamps; `error` then
/// holds the captured reason (e.g. "not found").
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DocumentStat {
    pub exists: bool,
    pub entry_type: Option<EntryType>,
    pub size: u64,
    pub atime_ms: Option<u64>,
    pub mtime_ms: Option<u64>,
    pub ctime_ms: Option<u64>,
    pub birthtime_ms: Option<u64>,
    pub dev: Option<u64>,
    pub ino: Option<u64>,
    pub mode: Option<u32>,
    pub nlink: Option<u64>,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub error: Option<String>,
}

impl DocumentStat {
    /// A stat for an entry known only by its type (e.g. from a directory listing).
    pub fn of_type(entry_type: EntryType) -> Self {
        Self {
            exists: true,
            entry_type: Some(entry_type),
            ..Default::default()
        }
    }

    pub fn missing(error: impl Into<String>) -> Self {
        Self {
            exists: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == Some(EntryType::File)
    }

    pub fn is_dir(&self) -> bool {
        self.entry_type == Some(EntryType::Directory)
    }

    pub fn is_symlink(&self) -> bool {
        self.entry_type == Some(EntryType::Symlink)
    }

    pub fn is_block_device(&self) -> bool {
        self.entry_type == Some(EntryType::BlockDevice)
    }

    pub fn is_fifo(&self) -> bool {
        self.entry_type == Some(EntryType::Fifo)
    }

    pub fn is_socket(&self) -> bool {
        self.entry_type == Some(EntryType::Socket)
    }
}

/// A directory-listing record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentEntry {
    /// Basename; directories end with `/`.
    pub name: String,
    /// URI relative to the store root.
    pub path: String,
    /// Nesting level relative to the scan start.
    pub depth: usize,
    pub stat: DocumentStat,
}

impl DocumentEntry {
    pub fn is_dir(&self) -> bool {
        self.stat.is_dir() || self.name.ends_with('/')
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir()
    }
}

/// Item produced by [`crate::DocumentStore::find_stream`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoundEntry {
    pub file: DocumentEntry,
}
