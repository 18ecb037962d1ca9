//! A filesystem-backed document store for Rust.
//! Loads and saves structured documents by file extension, keeps every access inside a
//! virtual root and lists directories lazily, with optional index files.
//!
//! ### Overview
//!
//! `docstore-kit` addresses documents by slash-separated URIs relative to a root directory.
//! The document format is picked from the extension (`.json`, `.jsonl`, `.yaml`, `.csv`, `.tsv`,
//! anything else as plain text), and values are `serde_json::Value`.
//!
//! **Key ideas**:
//! - **Confinement**: URIs that climb above the root are rejected by an [`AccessGuard`] before
//!   any native call; path utilities saturate `..` at the root.
//! - **Pluggable storage**: the store talks to an async [`FsBackend`]. [`DirFS`] maps to a host
//!   directory, [`MapFS`] keeps everything in memory.
//! - **Extensible formats**: register extra loaders and savers in a [`FormatRegistry`].
//! - **Lazy listings**: [`DocumentStore::read_dir`] and [`DocumentStore::find_stream`] return
//!   streams and can use a per-directory index file instead of a native scan.

mod core;
mod store;
mod vfs;

pub use crate::core::{AccessLevel, FsBackend, Result, StoreError, utils};
pub use crate::core::utils::Strip;
pub use store::{
    AccessGuard, AllowAll, DEFAULT_INDEX_FILES, DocumentIndex, DocumentStore, EntryFilter,
    FindOptions, FormatRegistry, ListOptions, LoadOptions, Loader, Matcher, ReadDirOptions,
    RootGuard, Saver, SortKey, SortOrder, StoreConfig,
};
pub use vfs::{DirFS, DocumentEntry, DocumentStat, EntryType, FoundEntry, MapFS};
