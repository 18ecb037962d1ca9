//! Per-directory index files.
//!
//! `index.txt` holds one line per child: `name mtime size`, numbers in base 36, a trailing `/`
//! on the name marks a directory. Names may contain spaces since the numbers are parsed from
//! the right.
//!
//! `index.txtl` starts with a header naming the columns (`name`, `mtime`, `size`, any order);
//! every following line holds the values in header order. Header and rows are both split on
//! single spaces, so runs of spaces inside a name survive.

use std::io;

use tracing::{debug, trace};

use super::DocumentStore;
use crate::core::utils::{self, Strip};
use crate::core::{AccessLevel, Result, StoreError};
use crate::vfs::{DocumentEntry, DocumentStat, EntryType};

const COLUMNAR_EXT: &str = ".txtl";

/// Parsed content of an index file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentIndex {
    pub entries: Vec<(String, DocumentStat)>,
}

fn indexed_stat(name: &str, mtime: u64, size: u64) -> DocumentStat {
    let entry_type = if name.ends_with('/') {
        EntryType::Directory
    } else {
        EntryType::File
    };
    DocumentStat {
        mtime_ms: Some(mtime),
        size,
        ..DocumentStat::of_type(entry_type)
    }
}

fn parse_plain(text: &str) -> Vec<(String, DocumentStat)> {
    let mut entries = Vec::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.rsplitn(3, ' ');
        let (Some(size), Some(mtime), Some(name)) = (parts.next(), parts.next(), parts.next())
        else {
            trace!(line, "skipping malformed index line");
            continue;
        };
        match (utils::from_base36(mtime), utils::from_base36(size)) {
            (Some(mtime), Some(size)) if !name.is_empty() => {
                entries.push((name.to_string(), indexed_stat(name, mtime, size)));
            }
            _ => trace!(line, "skipping malformed index line"),
        }
    }
    entries
}

fn parse_columnar(text: &str) -> Option<Vec<(String, DocumentStat)>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next()?.trim_end().split(' ').collect();
    let column = |wanted: &str| header.iter().position(|c| *c == wanted);
    let name_at = column("name")?;
    let mtime_at = column("mtime");
    let size_at = column("size");

    let mut entries = Vec::new();
    for line in lines {
        let cells: Vec<&str> = line.split(' ').collect();
        if cells.len() < header.len() {
            trace!(line, "skipping malformed index row");
            continue;
        }
        // the name column absorbs any extra cells, so names may contain spaces
        let extra = cells.len() - header.len();
        let cell = |at: usize| {
            if at < name_at {
                cells[at]
            } else {
                cells[at + extra]
            }
        };
        let name = cells[name_at..=name_at + extra].join(" ");
        let number = |at: Option<usize>| match at {
            Some(at) => utils::from_base36(cell(at)),
            None => Some(0),
        };
        match (number(mtime_at), number(size_at)) {
            (Some(mtime), Some(size)) if !name.is_empty() => {
                let stat = indexed_stat(&name, mtime, size);
                entries.push((name, stat));
            }
            _ => trace!(line, "skipping malformed index row"),
        }
    }
    Some(entries)
}

fn parse(file_name: &str, text: &str) -> Option<Vec<(String, DocumentStat)>> {
    if utils::extname(file_name) == COLUMNAR_EXT {
        parse_columnar(text)
    } else {
        Some(parse_plain(text))
    }
}

fn render(file_name: &str, entries: &[(String, DocumentStat)]) -> String {
    let columnar = utils::extname(file_name) == COLUMNAR_EXT;
    let mut out = String::new();
    if columnar {
        out.push_str("name mtime size\n");
    }
    for (name, stat) in entries {
        out.push_str(&format!(
            "{} {} {}\n",
            name,
            utils::to_base36(stat.mtime_ms.unwrap_or(0)),
            utils::to_base36(stat.size)
        ));
    }
    out
}

impl DocumentStore {
    /// First readable index file of `dir`, with its name.
    async fn find_index(&self, dir: &str) -> Option<(String, String)> {
        for file_name in &self.config.index_files {
            let path = self.location(&[dir, file_name.as_str()]);
            match self.backend.read(&path).await {
                Ok(bytes) => match String::from_utf8(bytes) {
                    Ok(text) => return Some((file_name.clone(), text)),
                    Err(_) => trace!(dir, file_name = %file_name, "index is not utf-8"),
                },
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => trace!(dir, file_name = %file_name, error = %e, "index unreadable"),
            }
        }
        None
    }

    /// Entries synthesized from the index of `uri`, if it has a usable one.
    pub(super) async fn index_entries(&self, uri: &str, depth: usize) -> Option<Vec<DocumentEntry>> {
        let dir = utils::normalize(uri);
        let (file_name, text) = self.find_index(&dir).await?;
        let parsed = parse(&file_name, &text)?;
        Some(
            parsed
                .into_iter()
                .map(|(name, stat)| DocumentEntry {
                    path: utils::join(&dir, &name),
                    name,
                    depth,
                    stat,
                })
                .collect(),
        )
    }

    /// Reads the index of directory `uri`. Without an index the result is empty.
    pub async fn load_index(&self, uri: &str) -> Result<DocumentIndex> {
        self.guard.ensure_access(uri, AccessLevel::Read)?;
        let dir = utils::normalize(uri);
        let Some((file_name, text)) = self.find_index(&dir).await else {
            return Ok(DocumentIndex::default());
        };
        let entries = parse(&file_name, &text).ok_or_else(|| StoreError::Parse {
            uri: utils::join(&dir, &file_name),
            source: anyhow::anyhow!("index header has no 'name' column"),
        })?;
        Ok(DocumentIndex { entries })
    }

    /// Cached children of `dir`, index files excluded, sorted by name.
    fn cached_listing(&self, dir: &str) -> Vec<(String, DocumentStat)> {
        let parent = if dir == "." {
            "/".to_string()
        } else {
            format!("{}/", dir.trim_end_matches('/'))
        };
        let mut entries: Vec<_> = self
            .meta
            .lock()
            .iter()
            .filter(|(key, _)| key.as_str() != "." && utils::dirname(key) == parent)
            .map(|(key, stat)| {
                let mut name = utils::basename(key, Strip::Nothing);
                if stat.is_dir() {
                    name.push('/');
                }
                (name, stat.clone())
            })
            .filter(|(name, _)| !self.config.index_files.contains(name))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Writes the index of directory `uri` under the first configured index name.
    /// Without explicit `entries` the cached metadata of the directory's children is used.
    pub async fn save_index(
        &self,
        uri: &str,
        entries: Option<&[(String, DocumentStat)]>,
    ) -> Result<bool> {
        self.guard.ensure_access(uri, AccessLevel::Write)?;
        let Some(file_name) = self.config.index_files.first() else {
            return Err(StoreError::Config("no index file name configured".into()));
        };
        let dir = utils::normalize(uri);
        let cached;
        let entries = match entries {
            Some(entries) => entries,
            None => {
                cached = self.cached_listing(&dir);
                &cached[..]
            }
        };

        let index_uri = utils::join(&dir, file_name);
        let path = self.location(&[index_uri.as_str()]);
        if let Some(parent) = path.parent() {
            self.backend
                .mkdir_all(parent)
                .await
                .map_err(|e| StoreError::write(&index_uri, e))?;
        }
        self.backend
            .write(&path, render(file_name, entries).as_bytes())
            .await
            .map_err(|e| StoreError::write(&index_uri, e))?;
        debug!(uri = %index_uri, entries = entries.len(), "index saved");
        Ok(true)
    }
}
