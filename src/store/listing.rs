//! Directory enumeration: one-level listings, the lazy recursive walk and sorted search.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use tracing::{trace, warn};

use super::DocumentStore;
use crate::core::utils;
use crate::core::{AccessLevel, Result};
use crate::vfs::{DocumentEntry, DocumentStat, EntryType, FoundEntry};

/// Predicate deciding which entries a walk yields.
pub type EntryFilter = Arc<dyn Fn(&DocumentEntry) -> bool + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Nesting level recorded in the returned entries.
    pub depth: usize,
    /// Use the directory-entry type only, without a stat per entry.
    pub skip_stat: bool,
}

#[derive(Clone, Default)]
pub struct ReadDirOptions {
    /// How many directory levels below the start to descend.
    pub depth: usize,
    pub skip_stat: bool,
    /// Also yield directories that are descended into.
    pub include_dirs: bool,
    pub filter: Option<EntryFilter>,
}

impl fmt::Debug for ReadDirOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadDirOptions")
            .field("depth", &self.depth)
            .field("skip_stat", &self.skip_stat)
            .field("include_dirs", &self.include_dirs)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortKey {
    #[default]
    Name,
    Mtime,
    Size,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone)]
pub struct FindOptions {
    /// Maximum number of results; `None` is unbounded.
    pub limit: Option<usize>,
    pub sort: SortKey,
    pub order: SortOrder,
    pub skip_stat: bool,
    pub skip_symbolic_link: bool,
    pub depth: usize,
    pub filter: Option<EntryFilter>,
}

impl Default for FindOptions {
    fn default() -> Self {
        Self {
            limit: None,
            sort: SortKey::Name,
            order: SortOrder::Asc,
            skip_stat: false,
            skip_symbolic_link: true,
            depth: 0,
            filter: None,
        }
    }
}

impl fmt::Debug for FindOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FindOptions")
            .field("limit", &self.limit)
            .field("sort", &self.sort)
            .field("order", &self.order)
            .field("skip_stat", &self.skip_stat)
            .field("skip_symbolic_link", &self.skip_symbolic_link)
            .field("depth", &self.depth)
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

/// One pending directory level of a walk.
struct Frame {
    entries: VecDeque<DocumentEntry>,
    depth_left: usize,
    /// Entries carry only their directory-entry type until popped.
    stat_on_pop: bool,
}

impl Frame {
    fn new(level: Level, depth_left: usize) -> Self {
        Self {
            entries: level.entries.into(),
            depth_left,
            stat_on_pop: level.stat_on_pop,
        }
    }
}

/// Entries of one walk level, and whether they still need a native stat.
struct Level {
    entries: Vec<DocumentEntry>,
    stat_on_pop: bool,
}

/// State of a depth-first walk, advanced one entry per poll.
struct Walk<'a> {
    store: &'a DocumentStore,
    start: Option<String>,
    stack: Vec<Frame>,
    options: ReadDirOptions,
}

impl Walk<'_> {
    fn accepts(&self, entry: &DocumentEntry) -> bool {
        self.options.filter.as_ref().is_none_or(|filter| filter(entry))
    }

    async fn next_entry(&mut self) -> Option<DocumentEntry> {
        if let Some(uri) = self.start.take() {
            let depth_left = self.options.depth;
            let level = self
                .store
                .level(&uri, 0, depth_left, self.options.skip_stat)
                .await;
            self.stack.push(Frame::new(level, depth_left));
        }

        loop {
            let frame = self.stack.last_mut()?;
            let Some(mut entry) = frame.entries.pop_front() else {
                self.stack.pop();
                continue;
            };
            let depth_left = frame.depth_left;
            if frame.stat_on_pop {
                self.store.stat_entry(&mut entry).await;
            }

            if entry.is_dir() && depth_left > 0 {
                let level = self
                    .store
                    .level(&entry.path, entry.depth + 1, depth_left - 1, self.options.skip_stat)
                    .await;
                self.stack.push(Frame::new(level, depth_left - 1));
                if self.options.include_dirs && self.accepts(&entry) {
                    return Some(entry);
                }
                continue;
            }

            if self.accepts(&entry) {
                return Some(entry);
            }
        }
    }
}

fn dirs_first(entries: &mut [DocumentEntry]) {
    entries.sort_by_key(|entry| !entry.is_dir());
}

fn compare(a: &DocumentEntry, b: &DocumentEntry, key: SortKey) -> Ordering {
    let primary = match key {
        SortKey::Name => a.name.cmp(&b.name),
        SortKey::Mtime => a.stat.mtime_ms.unwrap_or(0).cmp(&b.stat.mtime_ms.unwrap_or(0)),
        SortKey::Size => a.stat.size.cmp(&b.stat.size),
    };
    primary.then_with(|| b.is_dir().cmp(&a.is_dir()))
}

impl DocumentStore {
    /// Immediate children of `uri`, directories first.
    /// A missing directory gives an empty list.
    pub async fn list_dir(&self, uri: &str, options: ListOptions) -> Result<Vec<DocumentEntry>> {
        self.guard.ensure_access(uri, AccessLevel::Read)?;
        match self.scan_dir(uri, options.depth, options.skip_stat).await {
            Ok(entries) => Ok(entries),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn scan_dir(
        &self,
        uri: &str,
        depth: usize,
        skip_stat: bool,
    ) -> io::Result<Vec<DocumentEntry>> {
        let mut entries = self.typed_children(uri, depth).await?;
        if !skip_stat {
            for entry in &mut entries {
                self.stat_entry(entry).await;
            }
        }
        Ok(entries)
    }

    /// Children of `uri` known only by their directory-entry type, directories first.
    async fn typed_children(&self, uri: &str, depth: usize) -> io::Result<Vec<DocumentEntry>> {
        let dir = utils::normalize(uri);
        let listed = self.backend.read_dir(&self.location(&[dir.as_str()])).await?;

        let mut entries: Vec<_> = listed
            .into_iter()
            .map(|(name, kind)| {
                let name = if kind == EntryType::Directory {
                    format!("{name}/")
                } else {
                    name
                };
                DocumentEntry {
                    path: utils::join(&dir, &name),
                    name,
                    depth,
                    stat: DocumentStat::of_type(kind),
                }
            })
            .collect();
        dirs_first(&mut entries);
        Ok(entries)
    }

    /// Replaces the type-only stat of `entry` with native metadata.
    /// A failing stat keeps the type and records the error.
    async fn stat_entry(&self, entry: &mut DocumentEntry) {
        let host = self.location(&[entry.path.as_str()]);
        match self.backend.stat(&host).await {
            Ok(stat) => entry.stat = stat,
            Err(e) => entry.stat.error = Some(e.to_string()),
        }
    }

    /// Entries of one walk level: the index shortcut at the last level, a native scan otherwise.
    async fn level(
        &self,
        uri: &str,
        depth: usize,
        depth_left: usize,
        skip_stat: bool,
    ) -> Level {
        if depth_left == 0 {
            if let Some(mut entries) = self.index_entries(uri, depth).await {
                trace!(uri, count = entries.len(), "listing from index");
                dirs_first(&mut entries);
                return Level {
                    entries,
                    stat_on_pop: false,
                };
            }
        }
        let entries = match self.typed_children(uri, depth).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(uri, error = %e, "skipping unreadable directory");
                Vec::new()
            }
        };
        Level {
            entries,
            stat_on_pop: !skip_stat,
        }
    }

    /// Lazy depth-first walk below `uri`.
    ///
    /// Each level lists directories before files, and a directory's contents are yielded
    /// before its later siblings. Directory entries appear when `include_dirs` is set or when
    /// the depth budget ends at them. Nothing is read until the stream is polled, and each
    /// entry is stat'ed only when the walk reaches it.
    pub fn read_dir(
        &self,
        uri: &str,
        options: ReadDirOptions,
    ) -> Result<BoxStream<'_, DocumentEntry>> {
        self.guard.ensure_access(uri, AccessLevel::Read)?;
        let walk = Walk {
            store: self,
            start: Some(utils::normalize(uri)),
            stack: Vec::new(),
            options,
        };
        Ok(stream::unfold(walk, |mut walk| async move {
            let entry = walk.next_entry().await?;
            Some((entry, walk))
        })
        .boxed())
    }

    /// Walks `uri`, then yields the matches sorted and truncated to `limit`.
    ///
    /// Sorting needs every candidate, so the walk runs to completion on the first poll.
    pub fn find_stream(&self, uri: &str, options: FindOptions) -> Result<BoxStream<'_, FoundEntry>> {
        let FindOptions {
            limit,
            sort,
            order,
            skip_stat,
            skip_symbolic_link,
            depth,
            filter,
        } = options;
        let entries = self.read_dir(
            uri,
            ReadDirOptions {
                depth,
                skip_stat,
                include_dirs: false,
                filter,
            },
        )?;

        let sorted = async move {
            let mut found: Vec<DocumentEntry> = entries
                .filter(|entry| {
                    let keep = !(skip_symbolic_link && entry.stat.is_symlink());
                    futures::future::ready(keep)
                })
                .collect()
                .await;
            found.sort_by(|a, b| match order {
                SortOrder::Asc => compare(a, b, sort),
                SortOrder::Desc => compare(b, a, sort),
            });
            if let Some(limit) = limit {
                found.truncate(limit);
            }
            stream::iter(found.into_iter().map(|file| FoundEntry { file }))
        };
        Ok(stream::once(sorted).flatten().boxed())
    }
}
